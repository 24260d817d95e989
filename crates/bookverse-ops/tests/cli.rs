use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use bvo_core::report::{ResourceDescriptor, write_report};
use bvo_core::{CleanupPlan, CleanupReport};
use bvo_testutil::fixture;
use time::OffsetDateTime;

const CLEARED_ENV: &[&str] = &[
    "JFROG_URL",
    "JFROG_ADMIN_TOKEN",
    "PROJECT_KEY",
    "GH_TOKEN",
    "GITHUB_ORG",
    "BOOKVERSE_BLUEPRINT",
    "CLEANUP_REPORT_PATH",
    "CONFIRM_CLEANUP",
    "GITHUB_STEP_SUMMARY",
    "OTEL_EXPORTER_OTLP_ENDPOINT",
];

fn ops_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bookverse-ops"));
    cmd.current_dir(dir);
    for name in CLEARED_ENV {
        cmd.env_remove(name);
    }
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    ops_cmd(dir).args(args).output().expect("run bookverse-ops")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["provision", "discover", "cleanup", "teardown", "rollback"] {
        assert!(text.contains(command), "help is missing {command}:\n{text}");
    }
}

#[test]
fn teardown_without_confirmation_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["teardown"]);
    assert_eq!(output.status.code(), Some(3));

    let wrong = run(dir.path(), &["teardown", "--confirm", "yes"]);
    assert_eq!(wrong.status.code(), Some(3));
}

#[test]
fn missing_platform_url_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["discover"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn report_validation_sets_the_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cleanup-report.json");
    let mut plan = CleanupPlan::default();
    plan.repositories
        .push(ResourceDescriptor::keyed("bookverse-web-internal-npm-nonprod-local", Some("bookverse")));
    write_report(&path, &CleanupReport::new("bookverse", plan, OffsetDateTime::now_utc())).unwrap();
    let report = path.to_str().unwrap();

    let valid = run(dir.path(), &["report", "validate", "--report", report, "--json"]);
    assert_eq!(valid.status.code(), Some(0), "{}", String::from_utf8_lossy(&valid.stderr));
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&valid)).unwrap();
    assert!(parsed["checks"].is_array());

    let other_project = run(
        dir.path(),
        &["report", "validate", "--report", report, "--project", "other"],
    );
    assert_eq!(other_project.status.code(), Some(1));

    let missing = dir.path().join("absent.json");
    let absent = run(
        dir.path(),
        &["report", "validate", "--report", missing.to_str().unwrap()],
    );
    assert_eq!(absent.status.code(), Some(1));
}

#[test]
fn promotion_failure_renders_markdown_from_an_argument() {
    let dir = tempfile::tempdir().unwrap();
    let failure = fixture("promotion-failure.json");
    let output = run(dir.path(), &["promotion-failure", &failure]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("bookverse-web"));
    assert!(text.contains("SBOM Required"));
}

#[test]
fn promotion_failure_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = ops_cmd(dir.path())
        .args(["promotion-failure", "--json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn bookverse-ops");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(fixture("promotion-failure.json").as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        parsed["violated_policies"][0],
        "BookVerse QA Entry Gate - SBOM Required"
    );
}
