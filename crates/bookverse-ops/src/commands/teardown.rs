use std::time::Instant;

use anyhow::Result;
use bvo_core::summary::{ActionsFile, markdown_section};
use bvo_jfrog::JfrogClient;
use bvo_telemetry::RunLabels;
use serde::Serialize;

use crate::cli::TeardownArgs;
use crate::commands::{DeletionSummary, identity_mappings, project_roles};
use crate::context::OpsContext;
use crate::exit::Exit;

pub const CONFIRMATION: &str = "DELETE";

#[derive(Debug, Default, Serialize)]
pub struct TeardownOutcome {
    pub identity_mappings: DeletionSummary,
    pub roles: DeletionSummary,
    pub project: DeletionSummary,
    pub project_removed: bool,
    pub dry_run: bool,
    pub elapsed_secs: f64,
}

impl TeardownOutcome {
    pub fn succeeded(&self) -> bool {
        (self.dry_run || self.project_removed)
            && !self.identity_mappings.has_failures()
            && !self.roles.has_failures()
            && !self.project.has_failures()
    }

    pub fn markdown(&self) -> String {
        let mut text = self.identity_mappings.markdown("Identity mappings");
        text.push_str(&self.roles.markdown("Project roles"));
        text.push_str(&self.project.markdown("Project"));
        let verdict = if self.dry_run {
            "ℹ️ skipped (dry run)"
        } else if self.project_removed {
            "✅ project no longer exists"
        } else {
            "❌ project still exists"
        };
        text.push_str(&markdown_section("Verification", &[verdict.to_string()]));
        text.push_str(&markdown_section(
            "⏱️ Timing",
            &[format!("completed in `{:.2}s`", self.elapsed_secs)],
        ));
        text
    }
}

/// Accepts `DELETE` in any case, surrounding whitespace ignored.
pub fn confirmed(confirm: Option<&str>) -> bool {
    confirm.is_some_and(|value| value.trim().to_ascii_uppercase() == CONFIRMATION)
}

/// Removes identity mappings and custom roles referencing `project`, deletes
/// the project and checks that it is gone. A dry run only plans the
/// deletions and skips verification.
pub async fn teardown(
    client: &JfrogClient,
    project: &str,
    role_prefix: &str,
    dry_run: bool,
    labels: &RunLabels,
) -> TeardownOutcome {
    let started = Instant::now();
    let mut outcome = TeardownOutcome {
        dry_run,
        ..TeardownOutcome::default()
    };

    match identity_mappings::cleanup(client, project, dry_run, labels).await {
        Ok(summary) => outcome.identity_mappings = summary,
        Err(err) => {
            outcome
                .identity_mappings
                .fail(labels, "identity-mapping", "*", &format!("listing providers failed: {err}"))
        }
    }

    match project_roles::cleanup(client, project, Some(role_prefix), dry_run, labels).await {
        Ok(summary) => outcome.roles = summary,
        Err(err) => outcome
            .roles
            .fail(labels, "role", "*", &format!("listing roles failed: {err}")),
    }

    if dry_run {
        outcome.project.plan("project", project);
        outcome.elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!("dry run finished in {:.2}s", outcome.elapsed_secs);
        return outcome;
    }

    outcome
        .project
        .settle(labels, "project", project, client.delete_project(project).await);

    outcome.project_removed = match client.get_project(project).await {
        Ok(response) => response.status == 404,
        Err(err) => {
            tracing::error!("❌ could not verify project {project}: {err}");
            false
        }
    };
    if outcome.project_removed {
        tracing::info!("✅ project {project} no longer exists");
    } else {
        tracing::error!("❌ project {project} still exists");
    }
    outcome.elapsed_secs = started.elapsed().as_secs_f64();
    tracing::info!("teardown finished in {:.2}s", outcome.elapsed_secs);
    outcome
}

pub async fn run(ctx: &OpsContext, args: &TeardownArgs) -> Result<Exit> {
    let project = ctx.project();
    let prefix = args
        .role_prefix
        .clone()
        .unwrap_or_else(|| format!("{project}-"));
    let client = ctx.client()?;
    if args.dry_run {
        tracing::info!("previewing teardown of project {project}");
    } else {
        tracing::warn!("⚠️ tearing down project {project}");
    }
    let outcome = teardown(&client, project, &prefix, args.dry_run, &ctx.labels).await;
    ActionsFile::step_summary().append(&outcome.markdown())?;
    ctx.emit(&outcome)?;
    Ok(Exit::failed_if(!outcome.succeeded()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_confirms_in_any_case() {
        assert!(confirmed(Some("DELETE")));
        assert!(confirmed(Some(" DELETE\n")));
        assert!(confirmed(Some(" delete ")));
        assert!(confirmed(Some("Delete")));
        assert!(!confirmed(Some("yes")));
        assert!(!confirmed(Some("")));
        assert!(!confirmed(None));
    }

    #[test]
    fn dry_run_outcome_succeeds_without_verification() {
        let outcome = TeardownOutcome {
            dry_run: true,
            elapsed_secs: 0.5,
            ..TeardownOutcome::default()
        };
        assert!(outcome.succeeded());
        let text = outcome.markdown();
        assert!(text.contains("ℹ️ skipped (dry run)"));
        assert!(text.contains("completed in `0.50s`"));
    }
}
