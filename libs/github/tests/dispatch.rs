use std::time::Duration;

use bvo_github::{DispatchClient, GithubError, RepoRef};
use bvo_testutil::MockPlatform;
use serde_json::json;

#[tokio::test]
async fn dispatch_posts_event_and_payload() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    let client =
        DispatchClient::with_api_base(&mock.base_url(), "ghp_test", Duration::from_secs(5)).unwrap();
    let repo = RepoRef::new("acme", "bookverse-helm");

    client
        .dispatch(&repo, "release_completed", &json!({"version": "1.2.3"}))
        .await
        .unwrap();

    let state = mock.state();
    assert_eq!(state.dispatches.len(), 1);
    assert_eq!(state.dispatches[0]["event_type"], "release_completed");
    assert_eq!(state.dispatches[0]["client_payload"]["version"], "1.2.3");
    assert_eq!(state.dispatches[0]["repository"], "acme/bookverse-helm");
}

#[tokio::test]
async fn non_204_answers_are_errors() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state().fail("POST", "/repos/acme/x/dispatches", 422, 1);
    let client =
        DispatchClient::with_api_base(&mock.base_url(), "ghp_test", Duration::from_secs(5)).unwrap();

    let err = client
        .dispatch(&RepoRef::new("acme", "x"), "ping", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, GithubError::Dispatch { status: 422, .. }));
}

#[test]
fn blank_token_is_rejected() {
    let err = DispatchClient::new(" ", Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, GithubError::MissingToken(_)));
}
