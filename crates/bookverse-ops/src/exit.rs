use bvo_core::{BlueprintError, ConfigError, VersionMapError};
use bvo_github::GithubError;

/// How a command finished, mapped onto the process exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failed,
    /// Some deletions of a scoped cleanup did not go through.
    Incomplete,
    /// A destructive command ran without its confirmation.
    Unconfirmed,
}

impl Exit {
    pub fn code(self) -> i32 {
        match self {
            Exit::Success => 0,
            Exit::Failed => 1,
            Exit::Incomplete => 2,
            Exit::Unconfirmed => 3,
        }
    }

    pub fn failed_if(failed: bool) -> Self {
        if failed { Exit::Failed } else { Exit::Success }
    }

    pub fn incomplete_if(failed: bool) -> Self {
        if failed {
            Exit::Incomplete
        } else {
            Exit::Success
        }
    }
}

/// Usage problems detected after argument parsing.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Configuration and usage errors exit with 2, everything else with 1.
pub fn error_code(err: &anyhow::Error) -> i32 {
    let usage = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || cause.is::<BlueprintError>()
            || cause.is::<VersionMapError>()
            || cause.is::<UsageError>()
            || matches!(
                cause.downcast_ref::<GithubError>(),
                Some(GithubError::MissingToken(_) | GithubError::InvalidRepo(_))
            )
    });
    if usage { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn config_errors_map_to_usage_code() {
        let err = Err::<(), _>(ConfigError::Missing("JFROG_URL"))
            .context("loading configuration")
            .unwrap_err();
        assert_eq!(error_code(&err), 2);
        assert_eq!(error_code(&anyhow::anyhow!("boom")), 1);
        let missing = anyhow::Error::new(GithubError::MissingToken("GH_TOKEN"));
        assert_eq!(error_code(&missing), 2);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Exit::Success.code(), 0);
        assert_eq!(Exit::failed_if(true).code(), 1);
        assert_eq!(Exit::incomplete_if(true).code(), 2);
        assert_eq!(Exit::incomplete_if(false), Exit::Success);
        assert_eq!(Exit::Unconfirmed.code(), 3);
    }
}
