use serde::{Deserialize, Serialize};

use crate::outcome::ApiOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    Plan,
    Ensure,
}

impl ReportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportMode::Plan => "plan",
            ReportMode::Ensure => "ensure",
        }
    }

    pub fn is_plan(self) -> bool {
        self == ReportMode::Plan
    }
}

/// Result of a provisioning run. Entries read `<kind>:<name>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub project: String,
    pub mode: ReportMode,
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    #[serde(default)]
    pub skipped: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub secret_keys_written: Vec<String>,
}

impl ProvisionReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct ProvisionReportBuilder {
    report: ProvisionReport,
}

impl ProvisionReportBuilder {
    pub fn new(project: &str, mode: ReportMode) -> Self {
        ProvisionReportBuilder {
            report: ProvisionReport {
                project: project.to_string(),
                mode,
                created: Vec::new(),
                updated: Vec::new(),
                skipped: Vec::new(),
                warnings: Vec::new(),
                failed: Vec::new(),
                secret_keys_written: Vec::new(),
            },
        }
    }

    pub fn mode(&self) -> ReportMode {
        self.report.mode
    }

    pub fn created(&mut self, value: impl Into<String>) {
        self.report.created.push(value.into());
    }

    pub fn updated(&mut self, value: impl Into<String>) {
        self.report.updated.push(value.into());
    }

    pub fn skipped(&mut self, value: impl Into<String>) {
        self.report.skipped.push(value.into());
    }

    pub fn warn(&mut self, value: impl Into<String>) {
        self.report.warnings.push(value.into());
    }

    pub fn failed(&mut self, value: impl Into<String>) {
        self.report.failed.push(value.into());
    }

    pub fn secret_written(&mut self, key: impl Into<String>) {
        self.report.secret_keys_written.push(key.into());
    }

    /// Files the answer to a create call under the matching bucket.
    pub fn record(&mut self, kind: &str, name: &str, outcome: &ApiOutcome) {
        let entry = format!("{kind}:{name}");
        match outcome {
            ApiOutcome::Success => {
                tracing::info!("✅ created {entry}");
                self.created(entry);
            }
            ApiOutcome::AlreadyExists => {
                tracing::info!("✅ {entry} already exists");
                self.skipped(entry);
            }
            other => {
                tracing::error!("❌ {entry}: {}", other.describe());
                self.failed(format!("{entry}: {}", other.describe()));
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        self.report.has_failures()
    }

    pub fn finish(self) -> ProvisionReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sorts_outcomes() {
        let mut builder = ProvisionReportBuilder::new("bookverse", ReportMode::Ensure);
        builder.record("stage", "bookverse-DEV", &ApiOutcome::Success);
        builder.record("stage", "bookverse-QA", &ApiOutcome::AlreadyExists);
        builder.record("repo", "r", &ApiOutcome::classify(500, "boom"));
        assert!(builder.has_failures());
        let report = builder.finish();
        assert_eq!(report.created, vec!["stage:bookverse-DEV"]);
        assert_eq!(report.skipped, vec!["stage:bookverse-QA"]);
        assert_eq!(report.failed, vec!["repo:r: HTTP 500: boom"]);
    }

    #[test]
    fn mode_serializes_lowercase() {
        let report = ProvisionReportBuilder::new("p", ReportMode::Plan).finish();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "plan");
    }
}
