//! Cleanup report: the JSON hand-off written by discovery and consumed by
//! the deletion phase.
//!
//! A report is only actionable while it is fresh, targets the expected
//! project and carries `ready_for_cleanup`. Once the deletions ran the report
//! is zeroed out and flipped to `cleanup_completed` so it cannot be replayed.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};

pub const DEFAULT_REPORT_PATH: &str = ".github/cleanup-report.json";
pub const MAX_REPORT_AGE_MINUTES: i64 = 30;
const FUTURE_SKEW_MINUTES: i64 = 5;
const REPORT_SCHEMA: &str = include_str!("../schemas/cleanup-report.schema.json");
const METADATA_FIELDS: [&str; 4] = ["timestamp", "project_key", "total_items", "discovery_counts"];

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("report schema could not be compiled: {0}")]
    Schema(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    ReadyForCleanup,
    CleanupCompleted,
    StaleReport,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::ReadyForCleanup => "ready_for_cleanup",
            ReportStatus::CleanupCompleted => "cleanup_completed",
            ReportStatus::StaleReport => "stale_report",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Repositories,
    Applications,
    Users,
    Stages,
    Builds,
    Oidc,
    DomainUsers,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Repositories,
        ResourceKind::Applications,
        ResourceKind::Users,
        ResourceKind::Stages,
        ResourceKind::Builds,
        ResourceKind::Oidc,
        ResourceKind::DomainUsers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Repositories => "repositories",
            ResourceKind::Applications => "applications",
            ResourceKind::Users => "users",
            ResourceKind::Stages => "stages",
            ResourceKind::Builds => "builds",
            ResourceKind::Oidc => "oidc",
            ResourceKind::DomainUsers => "domain_users",
        }
    }
}

/// One resource scheduled for deletion. Repositories and applications are
/// identified by `key`, everything else by `name`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResourceDescriptor {
    pub fn keyed(key: impl Into<String>, project: Option<&str>) -> Self {
        Self {
            key: Some(key.into()),
            project: project.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>, project: Option<&str>) -> Self {
        Self {
            name: Some(name.into()),
            project: project.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(field.to_string(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        self.key
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupPlan {
    #[serde(default)]
    pub repositories: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub applications: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub users: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub stages: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub builds: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub oidc: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub domain_users: Vec<ResourceDescriptor>,
}

impl CleanupPlan {
    pub fn get(&self, kind: ResourceKind) -> &[ResourceDescriptor] {
        match kind {
            ResourceKind::Repositories => &self.repositories,
            ResourceKind::Applications => &self.applications,
            ResourceKind::Users => &self.users,
            ResourceKind::Stages => &self.stages,
            ResourceKind::Builds => &self.builds,
            ResourceKind::Oidc => &self.oidc,
            ResourceKind::DomainUsers => &self.domain_users,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut Vec<ResourceDescriptor> {
        match kind {
            ResourceKind::Repositories => &mut self.repositories,
            ResourceKind::Applications => &mut self.applications,
            ResourceKind::Users => &mut self.users,
            ResourceKind::Stages => &mut self.stages,
            ResourceKind::Builds => &mut self.builds,
            ResourceKind::Oidc => &mut self.oidc,
            ResourceKind::DomainUsers => &mut self.domain_users,
        }
    }

    pub fn total(&self) -> usize {
        ResourceKind::ALL.iter().map(|kind| self.get(*kind).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryCounts {
    pub builds: usize,
    pub applications: usize,
    pub repositories: usize,
    pub users: usize,
    pub stages: usize,
    pub oidc: usize,
}

impl DiscoveryCounts {
    pub fn from_plan(plan: &CleanupPlan) -> Self {
        Self {
            builds: plan.builds.len(),
            applications: plan.applications.len(),
            repositories: plan.repositories.len(),
            users: plan.users.len(),
            stages: plan.stages.len(),
            oidc: plan.oidc.len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub timestamp: String,
    pub project_key: String,
    pub total_items: usize,
    pub discovery_counts: DiscoveryCounts,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub metadata: ReportMetadata,
    pub plan: CleanupPlan,
    pub status: ReportStatus,
}

impl CleanupReport {
    pub fn new(project_key: &str, plan: CleanupPlan, now: OffsetDateTime) -> Self {
        Self {
            metadata: ReportMetadata {
                timestamp: format_timestamp(now),
                project_key: project_key.to_string(),
                total_items: plan.total(),
                discovery_counts: DiscoveryCounts::from_plan(&plan),
            },
            plan,
            status: ReportStatus::ReadyForCleanup,
        }
    }

    /// Empties the plan after a cleanup run so the file cannot drive a second one.
    pub fn zero_out(&mut self, now: OffsetDateTime) {
        self.plan = CleanupPlan::default();
        self.metadata.total_items = 0;
        self.metadata.discovery_counts = DiscoveryCounts::default();
        self.metadata.timestamp = format_timestamp(now);
        self.status = ReportStatus::CleanupCompleted;
    }

    pub fn mark_stale(&mut self) {
        self.status = ReportStatus::StaleReport;
    }

    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn format_timestamp(now: OffsetDateTime) -> String {
    now.to_offset(time::UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of validating a report file. All checks are evaluated so the
/// caller can print every problem at once.
#[derive(Clone, Debug, Serialize)]
pub struct ReportValidation {
    pub checks: Vec<ReportCheck>,
    #[serde(skip)]
    pub report: Option<CleanupReport>,
}

impl ReportValidation {
    pub fn is_valid(&self) -> bool {
        self.report.is_some() && self.checks.iter().all(|check| check.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportCheck> {
        self.checks.iter().filter(|check| !check.passed)
    }

    /// True when the only failing check is the age limit.
    pub fn is_stale_only(&self) -> bool {
        let mut failures = self.failures().peekable();
        failures.peek().is_some() && failures.all(|check| check.name == "fresh")
    }

    fn push(&mut self, name: &'static str, passed: bool, detail: impl Into<String>) {
        self.checks.push(ReportCheck {
            name,
            passed,
            detail: detail.into(),
        });
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ValidationOptions<'a> {
    pub expected_project: &'a str,
    pub now: OffsetDateTime,
    pub max_age: Duration,
}

impl<'a> ValidationOptions<'a> {
    pub fn new(expected_project: &'a str, now: OffsetDateTime) -> Self {
        Self {
            expected_project,
            now,
            max_age: Duration::minutes(MAX_REPORT_AGE_MINUTES),
        }
    }
}

pub fn validate_report_text(
    raw: &str,
    options: ValidationOptions<'_>,
) -> Result<ReportValidation, ReportError> {
    let mut validation = ReportValidation {
        checks: Vec::new(),
        report: None,
    };

    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => {
            validation.push("valid_json", true, "report parsed");
            value
        }
        Err(err) => {
            validation.push("valid_json", false, err.to_string());
            return Ok(validation);
        }
    };

    let schema: Value = serde_json::from_str(REPORT_SCHEMA)?;
    let validator =
        jsonschema::validator_for(&schema).map_err(|err| ReportError::Schema(err.to_string()))?;
    let schema_errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if schema_errors.is_empty() {
        validation.push("schema", true, "report matches schema");
    } else {
        validation.push("schema", false, schema_errors.join("; "));
    }

    let missing: Vec<&str> = METADATA_FIELDS
        .iter()
        .copied()
        .filter(|field| value.pointer(&format!("/metadata/{field}")).is_none())
        .collect();
    if missing.is_empty() {
        validation.push("metadata_fields", true, "all metadata fields present");
    } else {
        validation.push(
            "metadata_fields",
            false,
            format!("missing metadata fields: {}", missing.join(", ")),
        );
    }

    let report: CleanupReport = match serde_json::from_value(value) {
        Ok(report) => report,
        Err(err) => {
            validation.push("structure", false, err.to_string());
            return Ok(validation);
        }
    };

    match OffsetDateTime::parse(&report.metadata.timestamp, &Rfc3339) {
        Ok(stamp) => {
            let age = options.now - stamp;
            if age < -Duration::minutes(FUTURE_SKEW_MINUTES) {
                validation.push(
                    "not_future",
                    false,
                    format!("timestamp {} is in the future", report.metadata.timestamp),
                );
            } else if age > options.max_age {
                validation.push(
                    "fresh",
                    false,
                    format!(
                        "report is {} minutes old (limit {})",
                        age.whole_minutes(),
                        options.max_age.whole_minutes()
                    ),
                );
            } else {
                validation.push(
                    "fresh",
                    true,
                    format!("report is {} minutes old", age.whole_minutes().max(0)),
                );
            }
        }
        Err(err) => validation.push(
            "timestamp",
            false,
            format!("invalid timestamp {:?}: {err}", report.metadata.timestamp),
        ),
    }

    if report.metadata.project_key == options.expected_project {
        validation.push("project", true, format!("project {}", options.expected_project));
    } else {
        validation.push(
            "project",
            false,
            format!(
                "report targets {} but cleanup targets {}",
                report.metadata.project_key, options.expected_project
            ),
        );
    }

    if report.status == ReportStatus::ReadyForCleanup {
        validation.push("status", true, "ready_for_cleanup");
    } else {
        validation.push(
            "status",
            false,
            format!("status is {} (expected ready_for_cleanup)", report.status.as_str()),
        );
    }

    let planned = report.plan.total();
    if planned == report.metadata.total_items {
        validation.push("totals", true, format!("{planned} planned items"));
    } else {
        validation.push(
            "totals",
            false,
            format!(
                "total_items is {} but plan lists {planned} items",
                report.metadata.total_items
            ),
        );
    }

    validation.report = Some(report);
    Ok(validation)
}

pub fn read_report_text(path: &Path) -> Result<String, ReportError> {
    fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the report through a temp file in the same directory, then renames.
pub fn write_report(path: &Path, report: &CleanupReport) -> Result<(), ReportError> {
    let json = report.to_json_pretty()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let write_err = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(&parent).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
    tmp.write_all(json.as_bytes()).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_plan() -> CleanupPlan {
        CleanupPlan {
            repositories: vec![ResourceDescriptor::keyed(
                "bookverse-web-internal-docker-nonprod-local",
                Some("bookverse"),
            )],
            applications: vec![ResourceDescriptor::keyed("bookverse-web", Some("bookverse"))],
            domain_users: vec![ResourceDescriptor::named("alice@bookverse.com", None)],
            ..CleanupPlan::default()
        }
    }

    #[test]
    fn new_report_counts_every_plan_entry() {
        let report = CleanupReport::new("bookverse", sample_plan(), datetime!(2026-10-17 12:00 UTC));
        assert_eq!(report.metadata.total_items, 3);
        assert_eq!(report.metadata.discovery_counts.repositories, 1);
        assert_eq!(report.metadata.discovery_counts.users, 0);
        assert_eq!(report.metadata.timestamp, "2026-10-17T12:00:00Z");
        assert_eq!(report.status, ReportStatus::ReadyForCleanup);
    }

    #[test]
    fn descriptor_id_prefers_key() {
        let both = ResourceDescriptor {
            key: Some("k".into()),
            name: Some("n".into()),
            ..ResourceDescriptor::default()
        };
        assert_eq!(both.id(), "k");
        assert_eq!(ResourceDescriptor::named("n", None).id(), "n");
    }

    #[test]
    fn zero_out_clears_plan() {
        let mut report =
            CleanupReport::new("bookverse", sample_plan(), datetime!(2026-10-17 12:00 UTC));
        report.zero_out(datetime!(2026-10-17 12:10 UTC));
        assert!(report.plan.is_empty());
        assert_eq!(report.metadata.total_items, 0);
        assert_eq!(report.metadata.discovery_counts, DiscoveryCounts::default());
        assert_eq!(report.status, ReportStatus::CleanupCompleted);
        assert_eq!(report.metadata.timestamp, "2026-10-17T12:10:00Z");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ReportStatus::StaleReport).unwrap();
        assert_eq!(json, "\"stale_report\"");
    }

    #[test]
    fn descriptor_keeps_extra_fields() {
        let raw = r#"{"name":"build-a","project":"bookverse","numbers":["1","2"]}"#;
        let descriptor: ResourceDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(descriptor.id(), "build-a");
        assert_eq!(descriptor.extra["numbers"], serde_json::json!(["1", "2"]));
    }
}
