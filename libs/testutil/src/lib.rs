//! Test harness for the BookVerse operations crates: an in-process mock of
//! the JFrog Platform and GitHub endpoints plus fixture helpers.

use std::path::{Path, PathBuf};

mod server;
mod state;

pub use server::MockPlatform;
pub use state::{BUILT_IN_ROLES, MappingApi, PlatformState, RecordedRequest};

/// Workspace root, two levels above this crate's manifest (libs/testutil).
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Path of a file under the shared `fixtures/` directory.
pub fn fixture_path(name: &str) -> PathBuf {
    workspace_root().join("fixtures").join(name)
}

/// Reads a shared fixture, panicking with the path on failure.
pub fn fixture(name: &str) -> String {
    let path = fixture_path(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {err}", path.display()))
}

/// Seeds `state` with a project that looks like a fully provisioned
/// BookVerse installation with one application version per service.
pub fn seed_provisioned(state: &mut PlatformState, project: &str) {
    state
        .add_project(project)
        .add_stage(project, &format!("{project}-DEV"))
        .add_stage(project, &format!("{project}-QA"))
        .add_stage(project, &format!("{project}-STAGING"))
        .set_lifecycle(
            project,
            &[
                &format!("{project}-DEV"),
                &format!("{project}-QA"),
                &format!("{project}-STAGING"),
            ],
        )
        .add_repository(&format!("{project}-inventory-internal-docker-nonprod-local"), project, "docker")
        .add_repository(&format!("{project}-inventory-internal-docker-release-local"), project, "docker")
        .add_repository(&format!("{project}-web-internal-npm-nonprod-local"), project, "npm")
        .add_build(project, &format!("{project}-inventory_CI"))
        .add_application(&format!("{project}-inventory"), project)
        .add_version(&format!("{project}-inventory"), "1.0.0", "release", "RELEASED")
        .add_application(&format!("{project}-web"), project)
        .add_version(&format!("{project}-web"), "2.1.0", "latest", "TRUSTED_RELEASE")
        .add_user("alice.developer", &format!("alice.developer@{project}.com"), false)
        .add_member(project, "alice.developer", &["Developer"])
        .add_role(project, &format!("{project}-pipeline"))
        .add_oidc(&format!("{project}-inventory-github"), &[project])
        .add_mapping(
            &format!("{project}-inventory-github"),
            serde_json::json!({
                "name": format!("{project}-inventory"),
                "claims": {"repository": format!("acme/{project}-inventory")},
            }),
        );
}
