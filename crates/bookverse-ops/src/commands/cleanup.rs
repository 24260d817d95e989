//! Deletion phase driven by a validated cleanup report.
//!
//! Resources go in dependency order: application versions and applications,
//! builds, repositories, project members and domain users, the lifecycle and
//! its stages, OIDC integrations and finally the project. A failed deletion
//! is recorded and the remaining ones still run.

use anyhow::Result;
use bvo_core::models::AppVersion;
use bvo_core::report::{read_report_text, validate_report_text, write_report};
use bvo_core::{CleanupPlan, ValidationOptions};
use bvo_jfrog::apptrust::ALL_VERSIONS_LIMIT;
use bvo_jfrog::{JfrogClient, VersionStore};
use bvo_telemetry::RunLabels;
use futures::{StreamExt, stream};
use time::OffsetDateTime;

use crate::commands::{DeletionSummary, MAX_PARALLEL_JOBS};
use crate::context::OpsContext;
use crate::exit::Exit;

#[derive(Clone, Copy, Debug, Default)]
pub struct CleanupOptions {
    pub dry_run: bool,
    pub keep_project: bool,
}

pub async fn execute(
    client: &JfrogClient,
    project: &str,
    plan: &CleanupPlan,
    options: CleanupOptions,
    labels: &RunLabels,
) -> DeletionSummary {
    let mut summary = DeletionSummary::default();
    let dry_run = options.dry_run;

    for app in &plan.applications {
        summary.merge(delete_application(client, project, app.id(), dry_run, labels).await);
    }

    for build in &plan.builds {
        let name = build.id();
        if dry_run {
            summary.plan("build", name);
        } else {
            summary.settle(labels, "build", name, client.delete_build(project, name).await);
        }
    }

    for repo in &plan.repositories {
        let key = repo.id();
        if dry_run {
            summary.plan("repository", key);
        } else {
            summary.settle(labels, "repository", key, client.delete_repository(key).await);
        }
    }

    for user in &plan.users {
        let name = user.id();
        if dry_run {
            summary.plan("member", name);
        } else {
            let result = client.remove_project_member(project, name).await;
            summary.settle(labels, "member", name, result);
        }
    }
    for user in &plan.domain_users {
        let name = user.id();
        if dry_run {
            summary.plan("user", name);
        } else {
            summary.settle(labels, "user", name, client.delete_user(name).await);
        }
    }

    if !plan.stages.is_empty() {
        if dry_run {
            summary.plan("lifecycle", project);
        } else {
            match client.set_lifecycle(project, &[]).await {
                Ok(response) if response.outcome().is_gone() => {
                    tracing::info!("✅ cleared lifecycle of {project}");
                }
                Ok(response) => {
                    summary.fail(labels, "lifecycle", project, &response.outcome().describe())
                }
                Err(err) => summary.fail(labels, "lifecycle", project, &err.to_string()),
            }
        }
    }
    for stage in &plan.stages {
        let name = stage.id();
        if dry_run {
            summary.plan("stage", name);
        } else {
            summary.settle(labels, "stage", name, client.delete_stage(name).await);
        }
    }

    for integration in &plan.oidc {
        let name = integration.id();
        if dry_run {
            summary.plan("oidc", name);
        } else {
            summary.settle(labels, "oidc", name, client.delete_oidc_integration(name).await);
        }
    }

    if !options.keep_project {
        if dry_run {
            summary.plan("project", project);
        } else {
            summary.settle(labels, "project", project, client.delete_project(project).await);
        }
    }
    summary
}

/// Re-reads the application and only deletes it when it still belongs to
/// `project`. Versions go first since the platform refuses to drop an
/// application that has any.
async fn delete_application(
    client: &JfrogClient,
    project: &str,
    app_key: &str,
    dry_run: bool,
    labels: &RunLabels,
) -> DeletionSummary {
    let mut summary = DeletionSummary::default();
    let app = match client.get_application(app_key).await {
        Ok(Some(app)) => app,
        Ok(None) => {
            tracing::info!("✅ application:{app_key} already deleted");
            summary.already_gone.push(format!("application:{app_key}"));
            return summary;
        }
        Err(err) => {
            summary.fail(labels, "application", app_key, &format!("verification failed: {err}"));
            return summary;
        }
    };
    if app.project_key.as_deref() != Some(project) {
        let owner = app.project_key.as_deref().unwrap_or("no project");
        summary.skip("application", app_key, &format!("belongs to {owner}, not {project}"));
        return summary;
    }

    let versions: Vec<AppVersion> = match client.list_versions(app_key, ALL_VERSIONS_LIMIT).await {
        Ok(versions) => versions,
        Err(err) => {
            summary.fail(labels, "application", app_key, &format!("listing versions failed: {err}"));
            return summary;
        }
    };

    if dry_run {
        for version in &versions {
            summary.plan("version", &format!("{app_key}@{}", version.version));
        }
        summary.plan("application", app_key);
        return summary;
    }

    let results: Vec<_> = stream::iter(versions)
        .map(|version| async move {
            let result = client.delete_version(app_key, &version.version).await;
            (version.version, result)
        })
        .buffer_unordered(MAX_PARALLEL_JOBS)
        .collect()
        .await;
    for (version, result) in results {
        summary.settle(labels, "version", &format!("{app_key}@{version}"), result);
    }
    if summary.has_failures() {
        summary.skip("application", app_key, "some versions could not be deleted");
        return summary;
    }
    summary.settle(labels, "application", app_key, client.delete_application(app_key).await);
    summary
}

pub async fn run(ctx: &OpsContext, options: CleanupOptions) -> Result<Exit> {
    let path = &ctx.config.report_path;
    let raw = read_report_text(path)?;
    let validation = validate_report_text(&raw, ValidationOptions::new(ctx.project(), OffsetDateTime::now_utc()))?;
    let mut report = match validation.report.clone() {
        Some(report) if validation.is_valid() => report,
        _ => {
            for check in validation.failures() {
                tracing::error!("❌ {}: {}", check.name, check.detail);
            }
            tracing::error!("❌ refusing to clean up from {}; run discover again", path.display());
            return Ok(Exit::Failed);
        }
    };

    let client = ctx.client()?;
    let summary = execute(&client, ctx.project(), &report.plan, options, &ctx.labels).await;

    if options.dry_run {
        tracing::info!("dry run: {} deletions planned, report left untouched", summary.planned.len());
    } else {
        report.zero_out(OffsetDateTime::now_utc());
        write_report(path, &report)?;
        tracing::info!("✅ report {} marked cleanup_completed", path.display());
    }
    bvo_core::summary::ActionsFile::step_summary().append(&summary.markdown("Cleanup"))?;
    ctx.emit(&summary)?;
    Ok(Exit::failed_if(summary.has_failures()))
}
