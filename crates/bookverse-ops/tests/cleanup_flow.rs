use std::time::Duration;

use bookverse_ops::commands::cleanup::{CleanupOptions, execute};
use bookverse_ops::commands::discover::discover;
use bvo_core::report::{ValidationOptions, read_report_text, validate_report_text, write_report};
use bvo_core::{Blueprint, CleanupPlan, CleanupReport, ReportStatus, ResourceDescriptor};
use bvo_jfrog::{JfrogClient, RetryPolicy};
use bvo_telemetry::RunLabels;
use bvo_testutil::{MockPlatform, seed_provisioned};
use time::OffsetDateTime;

fn client(mock: &MockPlatform) -> JfrogClient {
    JfrogClient::from_parts(&mock.base_url(), "token", Duration::from_secs(5), RetryPolicy::none()).unwrap()
}

fn labels() -> RunLabels {
    RunLabels::new("bookverse", "cleanup")
}

#[tokio::test]
async fn discovery_feeds_a_complete_cleanup() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_provisioned(&mut mock.state(), "bookverse");
    mock.state().add_user("admin", "admin@bookverse.com", true);
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();

    let plan = discover(&client, &blueprint).await.unwrap();
    assert_eq!(plan.repositories.len(), 3);
    assert_eq!(plan.applications.len(), 2);
    assert_eq!(plan.builds.len(), 1);
    assert_eq!(plan.stages.len(), 3);
    assert_eq!(plan.users.len(), 1);
    assert_eq!(plan.oidc.len(), 1);
    // admins are never treated as domain users
    assert_eq!(plan.domain_users.len(), 1);
    assert_eq!(plan.domain_users[0].id(), "alice.developer");

    let summary = execute(&client, "bookverse", &plan, CleanupOptions::default(), &labels()).await;
    assert!(summary.failed.is_empty(), "{:?}", summary.failed);
    assert!(summary.deleted.contains(&"version:bookverse-web@2.1.0".to_string()));
    assert!(summary.deleted.contains(&"project:bookverse".to_string()));

    let state = mock.state();
    assert!(state.projects.is_empty());
    assert!(state.repositories.is_empty());
    assert!(state.applications.is_empty());
    assert!(state.stages.is_empty());
    assert!(state.oidc.is_empty());
    assert!(state.users.contains_key("admin"));
    assert!(!state.users.contains_key("alice.developer"));
}

#[tokio::test]
async fn versions_are_deleted_before_their_application() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_provisioned(&mut mock.state(), "bookverse");
    let client = client(&mock);
    let plan = discover(&client, &Blueprint::bookverse_default().unwrap()).await.unwrap();

    execute(&client, "bookverse", &plan, CleanupOptions::default(), &labels()).await;

    let requests = mock.requests();
    let position = |method: &str, path: &str| {
        requests
            .iter()
            .position(|r| r.method == method && r.path == path)
            .unwrap_or_else(|| panic!("no {method} {path}"))
    };
    let version = position("DELETE", "/apptrust/api/v1/applications/bookverse-inventory/versions/1.0.0");
    let app = position("DELETE", "/apptrust/api/v1/applications/bookverse-inventory");
    let lifecycle = position("PATCH", "/access/api/v2/lifecycle?project_key=bookverse");
    let stage = position("DELETE", "/access/api/v2/stages/bookverse-DEV");
    let project = position("DELETE", "/access/api/v1/projects/bookverse");
    assert!(version < app);
    assert!(lifecycle < stage);
    assert!(stage < project);
}

#[tokio::test]
async fn foreign_applications_are_left_alone() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_project("bookverse")
        .add_application("shared-catalog", "other")
        .add_version("shared-catalog", "1.0.0", "", "RELEASED");
    let client = client(&mock);
    let mut plan = CleanupPlan::default();
    plan.applications
        .push(ResourceDescriptor::keyed("shared-catalog", Some("bookverse")));

    let options = CleanupOptions {
        dry_run: false,
        keep_project: true,
    };
    let summary = execute(&client, "bookverse", &plan, options, &labels()).await;

    assert!(summary.deleted.is_empty());
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].contains("belongs to other"));
    let state = mock.state();
    assert!(state.applications.contains_key("shared-catalog"));
    assert_eq!(state.versions["shared-catalog"].len(), 1);
    assert!(state.projects.contains_key("bookverse"));
}

#[tokio::test]
async fn dry_run_plans_without_deleting() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    seed_provisioned(&mut mock.state(), "bookverse");
    let client = client(&mock);
    let plan = discover(&client, &Blueprint::bookverse_default().unwrap()).await.unwrap();

    let options = CleanupOptions {
        dry_run: true,
        keep_project: false,
    };
    let summary = execute(&client, "bookverse", &plan, options, &labels()).await;

    assert!(summary.deleted.is_empty());
    assert!(summary.planned.contains(&"project:bookverse".to_string()));
    assert!(summary.planned.contains(&"version:bookverse-web@2.1.0".to_string()));
    assert_eq!(mock.state().count("DELETE", "/"), 0);
}

#[test]
fn completed_report_cannot_drive_another_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cleanup-report.json");
    let now = OffsetDateTime::now_utc();
    let mut plan = CleanupPlan::default();
    plan.stages.push(ResourceDescriptor::named("bookverse-DEV", Some("bookverse")));
    let mut report = CleanupReport::new("bookverse", plan, now);
    write_report(&path, &report).unwrap();

    report.zero_out(now);
    write_report(&path, &report).unwrap();

    let raw = read_report_text(&path).unwrap();
    let validation = validate_report_text(&raw, ValidationOptions::new("bookverse", now)).unwrap();
    assert!(!validation.is_valid());
    let written = validation.report.unwrap();
    assert_eq!(written.status, ReportStatus::CleanupCompleted);
    assert_eq!(written.metadata.total_items, 0);
}
