use std::time::Duration;

use bookverse_ops::commands::faulty::{DEFAULT_FAULTY_TAG, scan};
use bookverse_ops::commands::rollback::{ORIGINAL_TAG_BEFORE_QUARANTINE, rollback};
use bookverse_ops::commands::versions::{compute_next, package_requests};
use bvo_core::{Blueprint, VersionMap};
use bvo_jfrog::{JfrogClient, RetryPolicy};
use bvo_telemetry::RunLabels;
use bvo_testutil::MockPlatform;
use serde_json::json;

fn client(mock: &MockPlatform) -> JfrogClient {
    JfrogClient::from_parts(&mock.base_url(), "token", Duration::from_secs(5), RetryPolicy::none()).unwrap()
}

#[tokio::test]
async fn next_versions_bump_platform_state() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_project("bookverse")
        .add_application("bookverse-web", "bookverse")
        .add_version_value(
            "bookverse-web",
            json!({"version": "1.4.1", "release_status": "RELEASED",
                   "sources": {"builds": [{"name": "web-ci", "number": "5.0.8"}]}}),
        )
        .add_version_value(
            "bookverse-web",
            json!({"version": "1.4.2", "release_status": "PRE_RELEASE",
                   "sources": {"builds": [{"name": "web-ci", "number": "5.0.9"}]}}),
        )
        .add_docker_tags("bookverse-web-internal-docker-nonprod-local", "web", &["1.0.0", "1.2.7", "latest"])
        .add_file("bookverse-web-internal-generic-nonprod-local", "assets/2.3.4", "assets.tar.gz");
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();
    let map = VersionMap::default();
    let requests = package_requests(&blueprint, &map, "bookverse-web", Some("web,assets"));

    let next = compute_next(&client, &blueprint, &map, "bookverse-web", &requests)
        .await
        .unwrap();

    assert_eq!(next.app_version, "1.4.3");
    assert_eq!(next.build_number, "5.0.10");
    assert_eq!(next.package_tags["web"], "1.2.8");
    assert_eq!(next.package_tags["assets"], "2.3.5");
}

#[tokio::test]
async fn next_versions_fall_back_to_seeds() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_project("bookverse")
        .add_application("bookverse-inventory", "bookverse");
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();
    let map = VersionMap::from_yaml(
        r#"
applications:
  - key: bookverse-inventory
    seeds: { application: "2.0.0", build: "7.1.0" }
    packages:
      - { type: docker, name: inventory-api, seed: "1.5.0" }
"#,
    )
    .unwrap();
    let requests = package_requests(&blueprint, &map, "bookverse-inventory", None);

    let next = compute_next(&client, &blueprint, &map, "bookverse-inventory", &requests)
        .await
        .unwrap();

    assert_eq!(next.app_version, "2.0.1");
    assert_eq!(next.build_number, "7.1.1");
    assert_eq!(next.package_tags["inventory-api"], "1.5.1");
}

#[tokio::test]
async fn tag_lookup_failures_fall_back_to_seeds() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_project("bookverse")
        .add_application("bookverse-web", "bookverse")
        .add_docker_tags("bookverse-web-internal-docker-nonprod-local", "web", &["4.0.0"])
        .fail("GET", "/artifactory/api/docker/", 500, 10)
        .fail("POST", "/artifactory/api/search/aql", 500, 10);
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();
    let map = VersionMap::from_yaml(
        r#"
applications:
  - key: bookverse-web
    seeds: { application: "1.0.0", build: "1.0.0" }
    packages:
      - { type: docker, name: web, seed: "2.2.0" }
      - { type: generic, name: assets, seed: "0.9.0" }
"#,
    )
    .unwrap();
    let requests = package_requests(&blueprint, &map, "bookverse-web", Some("web,assets"));

    let next = compute_next(&client, &blueprint, &map, "bookverse-web", &requests)
        .await
        .unwrap();

    assert_eq!(next.package_tags["web"], "2.2.1");
    assert_eq!(next.package_tags["assets"], "0.9.1");
    assert_eq!(mock.state().count("GET", "/artifactory/api/docker/"), 1);
}

#[tokio::test]
async fn faulty_versions_are_found_and_deleted() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_project("bookverse")
        .add_application("bookverse-checkout", "bookverse")
        .add_version("bookverse-checkout", "3.1.0", "", "RELEASED")
        .add_version("bookverse-checkout", "3.1.1", "", "PRE_RELEASE")
        .set_content(
            "bookverse-checkout",
            "3.1.0",
            json!({"artifacts": [
                {"name": "bookverse-checkout-internal-docker-nonprod-local/checkout-api/3.1.0/manifest.json"}
            ]}),
        )
        .set_content(
            "bookverse-checkout",
            "3.1.1",
            json!({"artifacts": [
                {"name": "bookverse-checkout-internal-docker-nonprod-local/checkout-api/180-1/manifest.json"},
                {"name": "bookverse-checkout-internal-generic-nonprod-local/docs/readme.md"}
            ]}),
        );
    let client = client(&mock);
    let labels = RunLabels::new("bookverse", "faulty-versions");

    let dry = scan(&client, "bookverse", None, DEFAULT_FAULTY_TAG, true, &labels)
        .await
        .unwrap();
    assert_eq!(dry.versions_scanned, 2);
    assert_eq!(dry.matches.len(), 1);
    assert_eq!(dry.deletions.planned, ["version:bookverse-checkout@3.1.1"]);
    assert_eq!(
        dry.matches[0].artifacts,
        ["bookverse-checkout-internal-docker-nonprod-local/checkout-api/180-1/manifest.json"]
    );
    let content_path =
        "/apptrust/api/v1/applications/bookverse-checkout/versions/3.1.1/content?include=releasables";
    assert!(mock.requests().iter().any(|r| r.path == content_path));
    assert!(mock.state().version("bookverse-checkout", "3.1.1").is_some());

    let result = scan(&client, "bookverse", Some("bookverse-checkout"), DEFAULT_FAULTY_TAG, false, &labels)
        .await
        .unwrap();
    assert_eq!(result.deletions.deleted, ["version:bookverse-checkout@3.1.1"]);
    let state = mock.state();
    assert!(state.version("bookverse-checkout", "3.1.1").is_none());
    assert!(state.version("bookverse-checkout", "3.1.0").is_some());
}

#[tokio::test]
async fn rollback_moves_latest_on_the_platform() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_project("bookverse")
        .add_application("bookverse-web", "bookverse")
        .add_version("bookverse-web", "1.9.0", "stable", "RELEASED")
        .add_version("bookverse-web", "2.0.0", "release", "TRUSTED_RELEASE")
        .add_version("bookverse-web", "2.1.0", "latest", "RELEASED")
        .add_version("bookverse-web", "2.2.0-rc.1", "", "PRE_RELEASE");
    let client = client(&mock);

    let outcome = rollback(&client, "bookverse-web", "2.1.0", false).await.unwrap();

    assert!(outcome.was_latest);
    assert_eq!(outcome.promoted.as_deref(), Some("2.0.0"));
    let state = mock.state();
    assert_eq!(state.tag_of("bookverse-web", "2.1.0").as_deref(), Some("quarantine"));
    assert_eq!(state.tag_of("bookverse-web", "2.0.0").as_deref(), Some("latest"));
    let quarantined = state.version("bookverse-web", "2.1.0").unwrap();
    assert_eq!(quarantined["properties"][ORIGINAL_TAG_BEFORE_QUARANTINE], json!(["latest"]));
}
