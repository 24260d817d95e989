use anyhow::{Context, Result};
use bvo_core::report::write_report;
use bvo_core::{Blueprint, CleanupPlan, CleanupReport, ResourceDescriptor, ResourceKind};
use bvo_jfrog::{JfrogClient, JfrogError};
use time::OffsetDateTime;

use crate::context::OpsContext;
use crate::exit::Exit;

/// Everything of `blueprint`'s project the cleanup would remove.
pub async fn discover(client: &JfrogClient, blueprint: &Blueprint) -> Result<CleanupPlan, JfrogError> {
    let project = blueprint.project_key();
    let scope = Some(project);
    let mut plan = CleanupPlan::default();

    plan.builds = client
        .list_builds(project)
        .await?
        .iter()
        .map(|build| ResourceDescriptor::named(build.name(), scope))
        .collect();

    plan.applications = client
        .list_applications(project)
        .await?
        .into_iter()
        .filter(|app| app.project_key.as_deref().is_none_or(|key| key == project))
        .map(|app| ResourceDescriptor::keyed(app.application_key, scope))
        .collect();

    plan.repositories = client
        .list_repositories(project)
        .await?
        .into_iter()
        .map(|repo| {
            let descriptor = ResourceDescriptor::keyed(repo.key, scope);
            match repo.package_type {
                Some(package_type) => descriptor.with_extra("package_type", package_type),
                None => descriptor,
            }
        })
        .collect();

    plan.users = not_found_as_empty(client.list_project_members(project).await)?
        .into_iter()
        .map(|member| ResourceDescriptor::named(member.name, scope).with_extra("roles", member.roles))
        .collect();

    plan.stages = client
        .list_stages(project)
        .await?
        .into_iter()
        .map(|stage| ResourceDescriptor::named(stage.name, scope))
        .collect();

    plan.oidc = related_integrations(client, project)
        .await?
        .into_iter()
        .map(|name| ResourceDescriptor::named(name, scope))
        .collect();

    if let Some(domain) = blueprint.user_domain.as_deref() {
        plan.domain_users = client
            .list_users()
            .await?
            .into_iter()
            .filter(|user| user.in_domain(domain))
            .map(|user| {
                let descriptor = ResourceDescriptor::named(user.username, None);
                match user.email {
                    Some(email) => descriptor.with_extra("email", email),
                    None => descriptor,
                }
            })
            .collect();
    }

    for kind in ResourceKind::ALL {
        tracing::info!("🔍 {}: {}", kind.as_str(), plan.get(kind).len());
    }
    Ok(plan)
}

/// OIDC integrations whose name, project list or identity mappings mention
/// `project`.
async fn related_integrations(client: &JfrogClient, project: &str) -> Result<Vec<String>, JfrogError> {
    let needle = project.to_ascii_lowercase();
    let mut related = Vec::new();
    for integration in client.list_oidc_integrations().await? {
        let direct = integration.name.to_ascii_lowercase().contains(&needle)
            || integration
                .projects
                .iter()
                .any(|p| p.eq_ignore_ascii_case(project));
        let via_mapping = direct
            || match client.list_identity_mappings(&integration.name).await {
                Ok(mappings) => mappings.iter().any(|m| m.references(project)),
                Err(err) => {
                    tracing::warn!("⚠️ could not list mappings of {}: {err}", integration.name);
                    false
                }
            };
        if via_mapping {
            related.push(integration.name);
        }
    }
    Ok(related)
}

pub(crate) fn not_found_as_empty<T>(result: Result<Vec<T>, JfrogError>) -> Result<Vec<T>, JfrogError> {
    match result {
        Err(err) if err.is_not_found() => Ok(Vec::new()),
        other => other,
    }
}

pub async fn run(ctx: &OpsContext) -> Result<Exit> {
    let client = ctx.client()?;
    let plan = discover(&client, &ctx.blueprint)
        .await
        .context("discovery failed")?;
    let report = CleanupReport::new(ctx.project(), plan, OffsetDateTime::now_utc());
    write_report(&ctx.config.report_path, &report)?;
    tracing::info!(
        "✅ wrote {} with {} items",
        ctx.config.report_path.display(),
        report.metadata.total_items
    );
    ctx.emit(&report)?;
    Ok(Exit::Success)
}
