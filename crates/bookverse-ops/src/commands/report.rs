use std::path::Path;

use anyhow::Result;
use bvo_core::report::{ValidationOptions, read_report_text, validate_report_text, write_report};
use bvo_core::ReportValidation;
use time::OffsetDateTime;

use crate::context::OpsContext;
use crate::exit::Exit;

/// Validates the report at `path`. With `mark_stale` a report whose only
/// problem is its age is rewritten with the stale status.
pub fn validate_file(
    path: &Path,
    project: &str,
    now: OffsetDateTime,
    mark_stale: bool,
) -> Result<ReportValidation> {
    let raw = read_report_text(path)?;
    let validation = validate_report_text(&raw, ValidationOptions::new(project, now))?;
    if mark_stale && validation.is_stale_only() {
        if let Some(report) = &validation.report {
            let mut report = report.clone();
            report.mark_stale();
            write_report(path, &report)?;
            tracing::warn!("⚠️ {} marked stale", path.display());
        }
    }
    Ok(validation)
}

pub fn run(ctx: &OpsContext, mark_stale: bool) -> Result<Exit> {
    let path = &ctx.config.report_path;
    let validation = match validate_file(path, ctx.project(), OffsetDateTime::now_utc(), mark_stale) {
        Ok(validation) => validation,
        Err(err) => {
            tracing::error!("❌ {err:#}");
            return Ok(Exit::Failed);
        }
    };
    for check in &validation.checks {
        if check.passed {
            tracing::info!("✅ {}: {}", check.name, check.detail);
        } else {
            tracing::error!("❌ {}: {}", check.name, check.detail);
        }
    }
    ctx.emit(&validation)?;
    Ok(Exit::failed_if(!validation.is_valid()))
}
