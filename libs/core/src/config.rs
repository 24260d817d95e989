use std::{path::PathBuf, time::Duration};

use url::Url;

use crate::report::DEFAULT_REPORT_PATH;

pub const DEFAULT_PROJECT_KEY: &str = "bookverse";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Raw settings before validation. Fields map one to one onto flags and
/// environment variables.
#[derive(Clone, Debug, Default)]
pub struct ConfigInputs {
    pub jfrog_url: Option<String>,
    pub token: Option<String>,
    pub project: Option<String>,
    pub gh_token: Option<String>,
    pub github_org: Option<String>,
    pub blueprint: Option<String>,
    pub report: Option<String>,
    pub timeout_secs: Option<String>,
    pub retries: Option<String>,
}

impl ConfigInputs {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            jfrog_url: lookup("JFROG_URL"),
            token: lookup("JFROG_ADMIN_TOKEN"),
            project: lookup("PROJECT_KEY"),
            gh_token: lookup("GH_TOKEN"),
            github_org: lookup("GITHUB_ORG"),
            blueprint: lookup("BOOKVERSE_BLUEPRINT"),
            report: lookup("CLEANUP_REPORT_PATH"),
            timeout_secs: lookup("JFROG_HTTP_TIMEOUT_SECS"),
            retries: lookup("JFROG_HTTP_RETRIES"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub jfrog_url: Option<Url>,
    pub token: Option<String>,
    pub project: String,
    pub gh_token: Option<String>,
    pub github_org: Option<String>,
    pub blueprint_path: Option<PathBuf>,
    pub report_path: PathBuf,
    pub timeout: Duration,
    pub retries: u32,
}

/// Validated connection details for commands that talk to the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JfrogConnection {
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub retries: u32,
}

impl PlatformConfig {
    pub fn resolve(inputs: ConfigInputs) -> Result<Self, ConfigError> {
        let jfrog_url = non_empty(inputs.jfrog_url)
            .map(|raw| parse_base_url(&raw))
            .transpose()?;
        let project = non_empty(inputs.project).unwrap_or_else(|| DEFAULT_PROJECT_KEY.to_string());
        if project.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
            return Err(ConfigError::Invalid {
                name: "PROJECT_KEY",
                value: project,
                reason: "must be a single token".into(),
            });
        }
        let timeout_secs = parse_number("JFROG_HTTP_TIMEOUT_SECS", inputs.timeout_secs)?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "JFROG_HTTP_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        let retries = parse_number("JFROG_HTTP_RETRIES", inputs.retries)?
            .map(|n: u64| n as u32)
            .unwrap_or(DEFAULT_RETRIES);

        Ok(Self {
            jfrog_url,
            token: non_empty(inputs.token),
            project,
            gh_token: non_empty(inputs.gh_token),
            github_org: non_empty(inputs.github_org),
            blueprint_path: non_empty(inputs.blueprint).map(PathBuf::from),
            report_path: non_empty(inputs.report)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH)),
            timeout: Duration::from_secs(timeout_secs),
            retries,
        })
    }

    pub fn connection(&self) -> Result<JfrogConnection, ConfigError> {
        let url = self.jfrog_url.as_ref().ok_or(ConfigError::Missing("JFROG_URL"))?;
        let token = self
            .token
            .clone()
            .ok_or(ConfigError::Missing("JFROG_ADMIN_TOKEN"))?;
        Ok(JfrogConnection {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            token,
            timeout: self.timeout,
            retries: self.retries,
        })
    }

    /// Host part of the platform URL, used as the docker registry.
    pub fn docker_registry(&self) -> Option<String> {
        self.jfrog_url
            .as_ref()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "JFROG_URL",
        value: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim_end_matches('/')).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https".into()));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}

fn parse_number(name: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    non_empty(value)
        .map(|raw| {
            raw.parse::<u64>().map_err(|err| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: err.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn inputs(pairs: &[(&str, &str)]) -> ConfigInputs {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigInputs::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = PlatformConfig::resolve(inputs(&[])).unwrap();
        assert_eq!(config.project, "bookverse");
        assert_eq!(config.report_path, PathBuf::from(".github/cleanup-report.json"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 3);
        assert!(matches!(
            config.connection(),
            Err(ConfigError::Missing("JFROG_URL"))
        ));
    }

    #[test]
    fn connection_strips_trailing_slash() {
        let config = PlatformConfig::resolve(inputs(&[
            ("JFROG_URL", "https://acme.jfrog.io/"),
            ("JFROG_ADMIN_TOKEN", "tok"),
            ("JFROG_HTTP_RETRIES", "5"),
        ]))
        .unwrap();
        let conn = config.connection().unwrap();
        assert_eq!(conn.base_url, "https://acme.jfrog.io");
        assert_eq!(conn.retries, 5);
        assert_eq!(config.docker_registry().as_deref(), Some("acme.jfrog.io"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let config = PlatformConfig::resolve(inputs(&[
            ("JFROG_URL", "https://acme.jfrog.io"),
            ("JFROG_ADMIN_TOKEN", "   "),
        ]))
        .unwrap();
        assert!(matches!(
            config.connection(),
            Err(ConfigError::Missing("JFROG_ADMIN_TOKEN"))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(PlatformConfig::resolve(inputs(&[("JFROG_URL", "ftp://host")])).is_err());
        assert!(PlatformConfig::resolve(inputs(&[("JFROG_URL", "not a url")])).is_err());
        assert!(PlatformConfig::resolve(inputs(&[("JFROG_HTTP_TIMEOUT_SECS", "abc")])).is_err());
        assert!(PlatformConfig::resolve(inputs(&[("JFROG_HTTP_TIMEOUT_SECS", "0")])).is_err());
        assert!(PlatformConfig::resolve(inputs(&[("PROJECT_KEY", "two words")])).is_err());
    }
}
