//! One module per subcommand. Each exposes the flow as library functions
//! taking the platform client, plus a `run` entry point used by the binary.

pub mod cleanup;
pub mod discover;
pub mod evidence;
pub mod faulty;
pub mod github;
pub mod identity_mappings;
pub mod project_roles;
pub mod promotion;
pub mod provision;
pub mod report;
pub mod rollback;
pub mod teardown;
pub mod versions;

use bvo_core::ApiOutcome;
use bvo_core::summary::markdown_section;
use bvo_jfrog::{ApiResponse, JfrogError};
use bvo_telemetry::{RunLabels, record_action};
use serde::Serialize;

/// Upper bound on concurrent version deletions and application scans.
pub const MAX_PARALLEL_JOBS: usize = 3;

/// Outcome of a batch of deletions. Entries read `<kind>:<id>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeletionSummary {
    pub deleted: Vec<String>,
    /// Answered 404; counted as done.
    pub already_gone: Vec<String>,
    pub skipped: Vec<String>,
    /// Dry-run entries.
    pub planned: Vec<String>,
    pub failed: Vec<String>,
}

impl DeletionSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Appends every bucket of `other`, keeping order.
    pub fn merge(&mut self, other: DeletionSummary) {
        self.deleted.extend(other.deleted);
        self.already_gone.extend(other.already_gone);
        self.skipped.extend(other.skipped);
        self.planned.extend(other.planned);
        self.failed.extend(other.failed);
    }

    /// Files the answer to a delete call.
    pub(crate) fn settle(
        &mut self,
        labels: &RunLabels,
        kind: &'static str,
        id: &str,
        result: Result<ApiResponse, JfrogError>,
    ) {
        let entry = format!("{kind}:{id}");
        match result.map(|response| response.outcome()) {
            Ok(ApiOutcome::Success) => {
                tracing::info!("✅ deleted {entry}");
                record_action(labels, kind, "deleted");
                self.deleted.push(entry);
            }
            Ok(ApiOutcome::NotFound) => {
                tracing::info!("✅ {entry} already deleted");
                record_action(labels, kind, "not_found");
                self.already_gone.push(entry);
            }
            Ok(other) => self.fail(labels, kind, id, &other.describe()),
            Err(err) => self.fail(labels, kind, id, &err.to_string()),
        }
    }

    pub(crate) fn fail(&mut self, labels: &RunLabels, kind: &'static str, id: &str, reason: &str) {
        tracing::error!("❌ {kind}:{id}: {reason}");
        record_action(labels, kind, "failed");
        self.failed.push(format!("{kind}:{id}: {reason}"));
    }

    pub(crate) fn skip(&mut self, kind: &str, id: &str, reason: &str) {
        tracing::warn!("⚠️ skipping {kind}:{id}: {reason}");
        self.skipped.push(format!("{kind}:{id}: {reason}"));
    }

    pub(crate) fn plan(&mut self, kind: &str, id: &str) {
        tracing::info!("would delete {kind}:{id}");
        self.planned.push(format!("{kind}:{id}"));
    }

    /// Step summary block listing every entry with its status marker.
    pub fn markdown(&self, title: &str) -> String {
        let mut lines = Vec::new();
        lines.extend(self.deleted.iter().map(|e| format!("✅ deleted `{e}`")));
        lines.extend(self.already_gone.iter().map(|e| format!("✅ already gone `{e}`")));
        lines.extend(self.planned.iter().map(|e| format!("would delete `{e}`")));
        lines.extend(self.skipped.iter().map(|e| format!("⚠️ skipped {e}")));
        lines.extend(self.failed.iter().map(|e| format!("❌ {e}")));
        markdown_section(title, &lines)
    }
}
