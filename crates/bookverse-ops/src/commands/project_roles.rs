use anyhow::{Context, Result};
use bvo_core::models::ProjectRole;
use bvo_core::summary::ActionsFile;
use bvo_jfrog::{JfrogClient, JfrogError};
use bvo_telemetry::RunLabels;

use crate::commands::DeletionSummary;
use crate::commands::discover::not_found_as_empty;
use crate::context::OpsContext;
use crate::exit::Exit;

pub const BUILT_IN_ROLES: [&str; 7] = [
    "Developer",
    "Contributor",
    "Viewer",
    "Release Manager",
    "Security Manager",
    "Application Admin",
    "Project Admin",
];

pub fn is_built_in(role: &ProjectRole) -> bool {
    role.role_type
        .as_deref()
        .is_some_and(|kind| kind.eq_ignore_ascii_case("PREDEFINED"))
        || BUILT_IN_ROLES.contains(&role.name.as_str())
}

/// Custom roles of `project`, optionally limited to names starting with
/// `prefix`. A missing project has no roles.
pub async fn discover(
    client: &JfrogClient,
    project: &str,
    prefix: Option<&str>,
) -> Result<Vec<ProjectRole>, JfrogError> {
    let roles = not_found_as_empty(client.list_project_roles(project).await)?;
    Ok(roles
        .into_iter()
        .filter(|role| !is_built_in(role))
        .filter(|role| prefix.is_none_or(|prefix| role.name.starts_with(prefix)))
        .collect())
}

pub async fn cleanup(
    client: &JfrogClient,
    project: &str,
    prefix: Option<&str>,
    dry_run: bool,
    labels: &RunLabels,
) -> Result<DeletionSummary, JfrogError> {
    let mut summary = DeletionSummary::default();
    for role in discover(client, project, prefix).await? {
        if dry_run {
            summary.plan("role", &role.name);
        } else {
            let result = client.delete_project_role(project, &role.name).await;
            summary.settle(labels, "role", &role.name, result);
        }
    }
    Ok(summary)
}

pub async fn run_discover(ctx: &OpsContext, prefix: Option<&str>) -> Result<Exit> {
    let client = ctx.client()?;
    let roles = discover(&client, ctx.project(), prefix)
        .await
        .context("failed to list project roles")?;
    for role in &roles {
        tracing::info!("👤 {} ({} actions)", role.name, role.actions.len());
    }
    tracing::info!("found {} custom roles in {}", roles.len(), ctx.project());
    ctx.emit(&roles)?;
    Ok(Exit::Success)
}

pub async fn run_cleanup(ctx: &OpsContext, prefix: Option<&str>, dry_run: bool) -> Result<Exit> {
    let client = ctx.client()?;
    let summary = cleanup(&client, ctx.project(), prefix, dry_run, &ctx.labels)
        .await
        .context("failed to list project roles")?;
    ActionsFile::step_summary().append(&summary.markdown("Project role cleanup"))?;
    ctx.emit(&summary)?;
    Ok(Exit::incomplete_if(summary.has_failures()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, kind: Option<&str>) -> ProjectRole {
        ProjectRole {
            name: name.into(),
            role_type: kind.map(str::to_string),
            ..ProjectRole::default()
        }
    }

    #[test]
    fn built_in_roles_are_recognised_by_name_or_type() {
        assert!(is_built_in(&role("Developer", None)));
        assert!(is_built_in(&role("Custom Viewer", Some("PREDEFINED"))));
        assert!(!is_built_in(&role("bookverse-pipeline", Some("CUSTOM"))));
    }
}
