use std::time::Duration;

use bookverse_ops::commands::{identity_mappings, project_roles, teardown};
use bvo_jfrog::{JfrogClient, RetryPolicy};
use bvo_telemetry::RunLabels;
use bvo_testutil::MockPlatform;
use serde_json::json;

fn client(mock: &MockPlatform) -> JfrogClient {
    JfrogClient::from_parts(&mock.base_url(), "token", Duration::from_secs(5), RetryPolicy::none()).unwrap()
}

fn labels() -> RunLabels {
    RunLabels::new("bookverse", "teardown")
}

/// A project emptied by cleanup, with the leftovers teardown handles.
fn seed_leftovers(mock: &MockPlatform) {
    mock.state()
        .add_project("bookverse")
        .add_role("bookverse", "bookverse-pipeline")
        .add_role("bookverse", "bookverse-k8s-image-pull")
        .add_role("bookverse", "release-bot")
        .add_oidc("github-shared", &[])
        .add_mapping(
            "github-shared",
            json!({"id": "m-1", "name": "web", "claims": {"repository": "acme/bookverse-web"}}),
        )
        .add_mapping(
            "github-shared",
            json!({"id": "m-2", "name": "other", "claims": {"repository": "acme/unrelated"}}),
        );
}

#[tokio::test]
async fn identity_mappings_are_matched_by_reference() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_leftovers(&mock);
    let client = client(&mock);

    let found = identity_mappings::discover(&client, "bookverse").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].identifier().as_deref(), Some("m-1"));

    let planned = identity_mappings::cleanup(&client, "bookverse", true, &labels()).await.unwrap();
    assert_eq!(planned.planned, ["identity-mapping:github-shared/m-1"]);
    assert_eq!(mock.state().mappings["github-shared"].len(), 2);

    let summary = identity_mappings::cleanup(&client, "bookverse", false, &labels()).await.unwrap();
    assert_eq!(summary.deleted, ["identity-mapping:github-shared/m-1"]);
    let state = mock.state();
    assert_eq!(state.mappings["github-shared"].len(), 1);
    assert_eq!(state.mappings["github-shared"][0]["id"], "m-2");
}

#[tokio::test]
async fn role_cleanup_honours_the_prefix_and_built_ins() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_leftovers(&mock);
    let client = client(&mock);

    let all = project_roles::discover(&client, "bookverse", None).await.unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["bookverse-pipeline", "bookverse-k8s-image-pull", "release-bot"]);

    let summary = project_roles::cleanup(&client, "bookverse", Some("bookverse-"), false, &labels())
        .await
        .unwrap();
    assert_eq!(summary.deleted.len(), 2);
    let state = mock.state();
    let remaining: Vec<&str> = state.roles["bookverse"]
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert!(remaining.contains(&"release-bot"));
    assert!(remaining.contains(&"Developer"));
    assert!(!remaining.contains(&"bookverse-pipeline"));
}

#[tokio::test]
async fn missing_project_has_no_roles() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    let client = client(&mock);
    let roles = project_roles::discover(&client, "ghost", None).await.unwrap();
    assert!(roles.is_empty());
}

#[tokio::test]
async fn teardown_removes_the_project_and_verifies() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_leftovers(&mock);
    let client = client(&mock);

    let outcome = teardown::teardown(&client, "bookverse", "bookverse-", false, &labels()).await;

    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(outcome.identity_mappings.deleted.len(), 1);
    assert_eq!(outcome.roles.deleted.len(), 2);
    assert_eq!(outcome.project.deleted, ["project:bookverse"]);
    assert!(outcome.markdown().contains("✅ project no longer exists"));
    assert!(mock.state().projects.is_empty());
}

#[tokio::test]
async fn teardown_reports_a_project_that_cannot_be_deleted() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_leftovers(&mock);
    mock.state()
        .add_repository("bookverse-web-internal-npm-nonprod-local", "bookverse", "npm");
    let client = client(&mock);

    let outcome = teardown::teardown(&client, "bookverse", "bookverse-", false, &labels()).await;

    assert!(!outcome.succeeded());
    assert!(!outcome.project_removed);
    assert_eq!(outcome.project.failed.len(), 1);
    assert!(outcome.markdown().contains("❌ project still exists"));
}

#[tokio::test]
async fn dry_run_teardown_plans_without_deleting() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_leftovers(&mock);
    let client = client(&mock);

    let outcome = teardown::teardown(&client, "bookverse", "bookverse-", true, &labels()).await;

    assert!(outcome.succeeded(), "{outcome:?}");
    assert!(outcome.dry_run);
    assert!(!outcome.project_removed);
    assert_eq!(outcome.identity_mappings.planned, ["identity-mapping:github-shared/m-1"]);
    assert_eq!(outcome.roles.planned.len(), 2);
    assert_eq!(outcome.project.planned, ["project:bookverse"]);
    let text = outcome.markdown();
    assert!(text.contains("ℹ️ skipped (dry run)"));
    assert!(text.contains("⏱️ Timing"));

    let state = mock.state();
    assert_eq!(state.count("DELETE", "/"), 0);
    assert!(
        !state
            .requests
            .iter()
            .any(|r| r.method == "GET" && r.path == "/access/api/v1/projects/bookverse")
    );
    assert!(state.projects.contains_key("bookverse"));
    assert_eq!(state.mappings["github-shared"].len(), 2);
}
