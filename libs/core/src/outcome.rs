use serde::Serialize;

/// How a JFrog/GitHub HTTP answer is interpreted by the provisioning and
/// cleanup flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApiOutcome {
    Success,
    /// 404. Deletions treat this as already done.
    NotFound,
    /// 400/409 whose body mentions that the resource exists.
    AlreadyExists,
    /// 400/409 for any other reason.
    Conflict { status: u16, body: String },
    Failed { status: u16, body: String },
}

impl ApiOutcome {
    pub fn classify(status: u16, body: &str) -> Self {
        match status {
            200..=299 => ApiOutcome::Success,
            404 => ApiOutcome::NotFound,
            400 | 409 if mentions_existing(body) => ApiOutcome::AlreadyExists,
            400 | 409 => ApiOutcome::Conflict {
                status,
                body: body.to_string(),
            },
            _ => ApiOutcome::Failed {
                status,
                body: body.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiOutcome::Success)
    }

    /// Create calls: success or already present.
    pub fn is_ensured(&self) -> bool {
        matches!(self, ApiOutcome::Success | ApiOutcome::AlreadyExists)
    }

    /// Delete calls: success or already gone.
    pub fn is_gone(&self) -> bool {
        matches!(self, ApiOutcome::Success | ApiOutcome::NotFound)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ApiOutcome::Conflict { .. } | ApiOutcome::Failed { .. }
        )
    }

    pub fn describe(&self) -> String {
        match self {
            ApiOutcome::Success => "ok".into(),
            ApiOutcome::NotFound => "not found".into(),
            ApiOutcome::AlreadyExists => "already exists".into(),
            ApiOutcome::Conflict { status, body } => format!("conflict (HTTP {status}): {body}"),
            ApiOutcome::Failed { status, body } => format!("HTTP {status}: {body}"),
        }
    }
}

fn mentions_existing(body: &str) -> bool {
    body.to_ascii_lowercase().contains("exist")
}

/// Statuses worth another attempt: throttling and server-side failures.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}
