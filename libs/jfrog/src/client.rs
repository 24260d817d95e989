use std::time::{Duration, Instant};

use bvo_core::{ApiOutcome, JfrogConnection};
use metrics::{counter, histogram};
use reqwest::{Method, header};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;

use crate::retry::{RetryPolicy, parse_retry_after};

const USER_AGENT: &str = concat!("bookverse-ops/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum JfrogError {
    #[error("invalid client configuration: {0}")]
    Config(String),
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {endpoint} returned HTTP {status}: {body}")]
    Status {
        method: String,
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("unexpected payload from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("request body could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

impl JfrogError {
    pub fn status(&self) -> Option<u16> {
        match self {
            JfrogError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Raw answer of a call after retries were exhausted or not needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn outcome(&self) -> ApiOutcome {
        ApiOutcome::classify(self.status, &self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, JfrogError> {
        let raw = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(raw).map_err(|source| JfrogError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    /// Body as JSON, or a JSON string when it is not JSON.
    pub fn value(&self) -> Value {
        if self.body.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

#[derive(Clone, Debug)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Text(String),
}

#[derive(Clone)]
pub struct JfrogClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for JfrogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JfrogClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl JfrogClient {
    pub fn new(conn: &JfrogConnection) -> Result<Self, JfrogError> {
        Self::from_parts(
            &conn.base_url,
            &conn.token,
            conn.timeout,
            RetryPolicy::new(conn.retries),
        )
    }

    pub fn from_parts(
        base_url: &str,
        token: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, JfrogError> {
        if token.trim().is_empty() {
            return Err(JfrogError::Config("token must not be empty".into()));
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| JfrogError::Config(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sends one logical request, retrying transport failures, 429 and 5xx.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<ApiResponse, JfrogError> {
        let url = format!("{}{}", self.base_url, path);
        let endpoint = metric_endpoint(path);
        let mut attempt = 1;
        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .header(header::ACCEPT, "application/json");
            builder = match &body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.json(value),
                RequestBody::Text(text) => builder
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(text.clone()),
            };

            let started = Instant::now();
            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) => {
                    counter!(
                        "jfrog_errors_total",
                        "kind" => "transport",
                        "endpoint" => endpoint.clone()
                    )
                    .increment(1);
                    if self.retry.should_retry_transport(attempt) {
                        let delay = self.retry.delay_after(attempt);
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "⚠️ {method} {path} failed: {err}; retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(JfrogError::Transport {
                        endpoint: format!("{method} {path}"),
                        source: err,
                    });
                }
            };

            let status = response.status().as_u16();
            histogram!(
                "jfrog_request_seconds",
                "endpoint" => endpoint.clone(),
                "method" => method.as_str().to_string(),
                "status" => status.to_string()
            )
            .record(started.elapsed().as_secs_f64());

            if self.retry.should_retry_status(status, attempt) {
                let hint = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);
                let delay = self.retry.hinted_delay(attempt, hint);
                tracing::warn!(
                    attempt,
                    status,
                    delay_ms = delay.as_millis() as u64,
                    "⚠️ {method} {path} answered {status}; retrying"
                );
                sleep(delay).await;
                attempt += 1;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            tracing::debug!(status, "{method} {path}");
            return Ok(ApiResponse { status, body: text });
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, JfrogError> {
        self.request(Method::GET, path, RequestBody::Empty).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, JfrogError> {
        self.request(Method::DELETE, path, RequestBody::Empty).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, JfrogError> {
        self.request(Method::POST, path, json_body(body)?).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, JfrogError> {
        self.request(Method::PUT, path, json_body(body)?).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, JfrogError> {
        self.request(Method::PATCH, path, json_body(body)?).await
    }

    pub async fn post_text(&self, path: &str, text: &str) -> Result<ApiResponse, JfrogError> {
        self.request(Method::POST, path, RequestBody::Text(text.to_string()))
            .await
    }

    /// GET that must succeed and decode into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, JfrogError> {
        let response = expect_success(Method::GET, path, self.get(path).await?)?;
        response.json(path)
    }
}

fn json_body<T: Serialize + ?Sized>(body: &T) -> Result<RequestBody, JfrogError> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(JfrogError::Encode)
}

pub(crate) fn expect_success(
    method: Method,
    path: &str,
    response: ApiResponse,
) -> Result<ApiResponse, JfrogError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(JfrogError::Status {
            method: method.to_string(),
            endpoint: path.to_string(),
            status: response.status,
            body: response.body,
        })
    }
}

/// Percent-encodes one path segment.
pub(crate) fn seg(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Low-cardinality label: the path without query and identifiers.
fn metric_endpoint(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).take(4).collect();
    format!("/{}", segments.join("/"))
}
