use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::{ApiResponse, JfrogClient, JfrogError, seg};

const SUBSCRIPTIONS: &str = "/event/api/v1/subscriptions";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub key: String,
    #[serde(default)]
    pub event_types: Vec<String>,
}

/// Webhook that turns platform events into a GitHub repository dispatch.
#[derive(Clone, Debug)]
pub struct DispatchWebhook<'a> {
    pub key: &'a str,
    pub description: &'a str,
    pub domain: &'a str,
    pub event_types: &'a [String],
    pub project: &'a str,
    pub owner: &'a str,
    pub repo: &'a str,
    pub dispatch_event: &'a str,
    pub github_token: &'a str,
}

impl DispatchWebhook<'_> {
    pub fn body(&self) -> Value {
        json!({
            "key": self.key,
            "description": self.description,
            "enabled": true,
            "event_filter": {
                "domain": self.domain,
                "event_types": self.event_types,
                "criteria": { "projectKeys": [self.project] },
            },
            "handlers": [{
                "handler_type": "custom-webhook",
                "url": format!(
                    "https://api.github.com/repos/{}/{}/dispatches",
                    self.owner, self.repo
                ),
                "method": "POST",
                "payload": format!(
                    r#"{{"event_type":"{}","client_payload":{{"domain":"{{{{.domain}}}}","event_type":"{{{{.event_type}}}}","data":{{{{.data}}}}}}}}"#,
                    self.dispatch_event
                ),
                "secrets": [{ "name": "github_token", "value": self.github_token }],
                "http_headers": [
                    { "name": "Authorization", "value": "Bearer {{.secrets.github_token}}" },
                    { "name": "Accept", "value": "application/vnd.github+json" },
                ],
            }],
        })
    }
}

impl JfrogClient {
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>, JfrogError> {
        let value: Value = self.get_json(SUBSCRIPTIONS).await?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("subscriptions") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    pub async fn create_dispatch_webhook(
        &self,
        webhook: &DispatchWebhook<'_>,
    ) -> Result<ApiResponse, JfrogError> {
        self.post_json(SUBSCRIPTIONS, &webhook.body()).await
    }

    pub async fn delete_subscription(&self, key: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{SUBSCRIPTIONS}/{}", seg(key))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_targets_repository_dispatch() {
        let event_types = vec!["release_completed".to_string()];
        let webhook = DispatchWebhook {
            key: "bookverse-release-completed",
            description: "d",
            domain: "app_version",
            event_types: &event_types,
            project: "bookverse",
            owner: "acme",
            repo: "bookverse-helm",
            dispatch_event: "release_completed",
            github_token: "ghp",
        };
        let body = webhook.body();
        let handler = &body["handlers"][0];
        assert_eq!(
            handler["url"],
            "https://api.github.com/repos/acme/bookverse-helm/dispatches"
        );
        let payload = handler["payload"].as_str().unwrap();
        assert!(payload.starts_with(r#"{"event_type":"release_completed""#));
        assert!(payload.contains("{{.data}}"));
        assert_eq!(body["event_filter"]["criteria"]["projectKeys"][0], "bookverse");
    }
}
