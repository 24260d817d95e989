use std::time::Duration;

use reqwest::header;
use serde_json::{Value, json};

use crate::error::GithubError;
use crate::gh::RepoRef;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Sends `repository_dispatch` events through the GitHub REST API.
#[derive(Clone)]
pub struct DispatchClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for DispatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl DispatchClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, GithubError> {
        Self::with_api_base(DEFAULT_API_BASE, token, timeout)
    }

    pub fn with_api_base(api_base: &str, token: &str, timeout: Duration) -> Result<Self, GithubError> {
        if token.trim().is_empty() {
            return Err(GithubError::MissingToken("repository dispatch"));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("bookverse-ops/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(GithubError::Transport)?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// GitHub answers 204 on acceptance; anything else is an error.
    pub async fn dispatch(
        &self,
        repo: &RepoRef,
        event_type: &str,
        client_payload: &Value,
    ) -> Result<(), GithubError> {
        let url = format!(
            "{}/repos/{}/{}/dispatches",
            self.api_base, repo.owner, repo.name
        );
        let body = json!({ "event_type": event_type, "client_payload": client_payload });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&body)
            .send()
            .await
            .map_err(GithubError::Transport)?;
        let status = response.status().as_u16();
        if status == 204 {
            tracing::info!("✅ dispatched {event_type} to {repo}");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(GithubError::Dispatch {
            repo: repo.to_string(),
            status,
            body,
        })
    }
}
