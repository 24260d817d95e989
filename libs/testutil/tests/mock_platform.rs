use bvo_testutil::MockPlatform;
use serde_json::json;

#[tokio::test]
async fn duplicate_stage_is_rejected_with_exists_message() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    let client = reqwest::Client::new();
    let url = format!("{}/access/api/v2/stages", mock.base_url());
    let body = json!({"name": "demo-DEV", "project_key": "demo"});

    let first = client.post(&url).json(&body).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 201);
    let second = client.post(&url).json(&body).send().await.unwrap();
    assert_eq!(second.status().as_u16(), 409);
    assert!(second.text().await.unwrap().contains("already exists"));
    assert_eq!(mock.state().count("POST", "/access/api/v2/stages"), 2);
}

#[tokio::test]
async fn injected_faults_are_consumed() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state().add_project("demo").fail("GET", "/access/api/v1/projects/demo", 503, 1);
    let url = format!("{}/access/api/v1/projects/demo", mock.base_url());

    let first = reqwest::get(&url).await.unwrap();
    assert_eq!(first.status().as_u16(), 503);
    let second = reqwest::get(&url).await.unwrap();
    assert_eq!(second.status().as_u16(), 200);
}

#[tokio::test]
async fn versions_are_listed_newest_first_with_limit() {
    let Some(mock) = MockPlatform::start().await else {
        return;
    };
    mock.state()
        .add_application("demo-web", "demo")
        .add_version("demo-web", "1.0.0", "", "RELEASED")
        .add_version("demo-web", "1.1.0", "latest", "RELEASED");
    let url = format!(
        "{}/apptrust/api/v1/applications/demo-web/versions?limit=1",
        mock.base_url()
    );
    let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["versions"].as_array().unwrap().len(), 1);
    assert_eq!(body["versions"][0]["version"], "1.1.0");
    assert_eq!(body["total"], 2);
}
