use std::time::Duration;

use bookverse_ops::commands::provision::Provision;
use bvo_core::{Blueprint, ReportMode};
use bvo_jfrog::{JfrogClient, RetryPolicy};
use bvo_testutil::MockPlatform;

fn client(mock: &MockPlatform) -> JfrogClient {
    JfrogClient::from_parts(&mock.base_url(), "token", Duration::from_secs(5), RetryPolicy::none()).unwrap()
}

fn provision<'a>(client: &'a JfrogClient, blueprint: &'a Blueprint, token: Option<&'a str>) -> Provision<'a> {
    Provision {
        client,
        blueprint,
        org: "acme",
        github_token: token,
        mirror: None,
    }
}

#[tokio::test]
async fn second_run_only_reports_skips() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    // An existing alias keeps the run from generating an RSA key.
    mock.state().add_trusted_key("bookverse-evidence-key");
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();

    let first = provision(&client, &blueprint, None).run(ReportMode::Ensure).await;
    assert!(first.failed.is_empty(), "{:?}", first.failed);
    for entry in [
        "project:bookverse",
        "stage:bookverse-DEV",
        "repository:bookverse-web-internal-npm-nonprod-local",
        "application:bookverse-checkout",
        "role:bookverse-pipeline",
        "user:alice.developer@bookverse.com",
        "oidc:bookverse-inventory-github",
        "identity-mapping:bookverse-inventory",
        "policy:BookVerse QA Entry Gate - SBOM Required",
    ] {
        assert!(first.created.iter().any(|c| c == entry), "missing {entry}");
    }
    assert!(first.updated.contains(&"lifecycle:bookverse".to_string()));
    assert!(first.skipped.contains(&"trusted-key:bookverse-evidence-key".to_string()));
    assert_eq!(first.warnings, ["webhook:bookverse-release-completed: no GitHub token"]);

    {
        let state = mock.state();
        assert_eq!(
            state.lifecycles["bookverse"],
            ["bookverse-DEV", "bookverse-QA", "bookverse-STAGING"]
        );
        assert_eq!(
            state.members["bookverse"]["pipeline.web@bookverse.com"],
            ["Developer", "bookverse-pipeline"]
        );
        let policy = state
            .policies
            .iter()
            .find(|p| p["name"] == "BookVerse STAGING Entry - Integration Tests")
            .unwrap();
        assert_eq!(policy["action"]["stage"]["key"], "bookverse-STAGING");
        assert_eq!(policy["mode"], "warning");
        let rule = state
            .rules
            .iter()
            .find(|r| r["name"] == "bookverse-integration-tests-present")
            .unwrap();
        assert_eq!(policy["rule_ids"][0], rule["id"].to_string());
        assert_eq!(state.count("GET", "/unifiedpolicy/api/v1/rules"), 1);
        let repo = &state.repositories["bookverse-inventory-internal-python-release-local"];
        assert_eq!(repo["packageType"], "pypi");
    }

    let second = provision(&client, &blueprint, None).run(ReportMode::Ensure).await;
    assert!(second.created.is_empty(), "{:?}", second.created);
    assert!(second.updated.is_empty(), "{:?}", second.updated);
    assert!(second.failed.is_empty(), "{:?}", second.failed);
    assert_eq!(second.skipped.len(), first.created.len() + first.updated.len() + first.skipped.len());
}

#[tokio::test]
async fn plan_mode_only_reads() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();

    let report = provision(&client, &blueprint, Some("ghp_test"))
        .run(ReportMode::Plan)
        .await;

    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert!(report.created.contains(&"project:bookverse".to_string()));
    assert!(report.created.contains(&"trusted-key:bookverse-evidence-key".to_string()));
    assert!(report.created.contains(&"webhook:bookverse-release-completed".to_string()));
    let writes: Vec<_> = mock
        .requests()
        .into_iter()
        .filter(|r| r.method != "GET")
        .collect();
    assert!(writes.is_empty(), "{writes:?}");
}

#[tokio::test]
async fn webhooks_dispatch_to_the_target_repository() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state().add_trusted_key("bookverse-evidence-key");
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();

    let report = provision(&client, &blueprint, Some("ghp_test"))
        .run(ReportMode::Ensure)
        .await;

    assert!(report.created.contains(&"webhook:bookverse-release-completed".to_string()));
    let state = mock.state();
    assert_eq!(state.subscriptions.len(), 1);
    let handler = &state.subscriptions[0]["handlers"][0];
    assert_eq!(
        handler["url"],
        "https://api.github.com/repos/acme/bookverse-helm/dispatches"
    );
    assert_eq!(state.subscriptions[0]["event_filter"]["criteria"]["projectKeys"][0], "bookverse");
}

#[tokio::test]
async fn failing_step_does_not_stop_the_run() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_trusted_key("bookverse-evidence-key")
        .fail("POST", "/apptrust/api/v1/applications", 500, 100);
    let client = client(&mock);
    let blueprint = Blueprint::bookverse_default().unwrap();

    let report = provision(&client, &blueprint, None).run(ReportMode::Ensure).await;

    assert_eq!(report.failed.len(), blueprint.services.len(), "{:?}", report.failed);
    assert!(report.failed.iter().all(|f| f.starts_with("application:")));
    assert!(report.created.contains(&"role:bookverse-pipeline".to_string()));
    assert!(report.created.contains(&"oidc:bookverse-web-github".to_string()));
    assert!(report.has_failures());
}
