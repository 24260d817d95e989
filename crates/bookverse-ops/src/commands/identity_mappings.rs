use std::time::Instant;

use anyhow::{Context, Result};
use bvo_core::summary::{ActionsFile, markdown_section};
use bvo_jfrog::oidc::{IdentityMapping, MappingDeletion};
use bvo_jfrog::{JfrogClient, JfrogError};
use bvo_telemetry::RunLabels;
use serde_json::{Value, json};

use crate::commands::DeletionSummary;
use crate::context::OpsContext;
use crate::exit::Exit;

/// Identity mappings across all OIDC providers that mention `project`.
/// Providers whose mappings cannot be listed are logged and skipped.
pub async fn discover(client: &JfrogClient, project: &str) -> Result<Vec<IdentityMapping>, JfrogError> {
    let providers = client.list_oidc_integrations().await?;
    tracing::info!("🔍 scanning {} OIDC providers", providers.len());
    let mut related = Vec::new();
    for provider in providers {
        match client.list_identity_mappings(&provider.name).await {
            Ok(mappings) => related.extend(mappings.into_iter().filter(|m| m.references(project))),
            Err(err) => tracing::warn!("⚠️ could not list mappings of {}: {err}", provider.name),
        }
    }
    Ok(related)
}

pub async fn cleanup(
    client: &JfrogClient,
    project: &str,
    dry_run: bool,
    labels: &RunLabels,
) -> Result<DeletionSummary, JfrogError> {
    let mut summary = DeletionSummary::default();
    for mapping in discover(client, project).await? {
        let id = label(&mapping);
        if dry_run {
            summary.plan("identity-mapping", &id);
            continue;
        }
        match client.delete_identity_mapping(&mapping).await {
            Ok(MappingDeletion::Deleted { path }) => {
                tracing::info!("✅ deleted identity mapping {id} via {path}");
                bvo_telemetry::record_action(labels, "identity-mapping", "deleted");
                summary.deleted.push(format!("identity-mapping:{id}"));
            }
            Ok(MappingDeletion::Unsupported) => {
                summary.fail(labels, "identity-mapping", &id, "no delete endpoint accepted the request")
            }
            Ok(MappingDeletion::MissingIdentifier) => {
                summary.fail(labels, "identity-mapping", &id, "mapping has no id or name")
            }
            Ok(MappingDeletion::Failed { path, status, body }) => summary.fail(
                labels,
                "identity-mapping",
                &id,
                &format!("DELETE {path} returned HTTP {status}: {body}"),
            ),
            Err(err) => summary.fail(labels, "identity-mapping", &id, &err.to_string()),
        }
    }
    Ok(summary)
}

fn label(mapping: &IdentityMapping) -> String {
    format!(
        "{}/{}",
        mapping.provider,
        mapping.identifier().unwrap_or_else(|| "<unnamed>".into())
    )
}

fn as_json(mapping: &IdentityMapping) -> Value {
    json!({ "provider": mapping.provider, "mapping": mapping.raw })
}

pub async fn run_discover(ctx: &OpsContext) -> Result<Exit> {
    let client = ctx.client()?;
    let mappings = discover(&client, ctx.project())
        .await
        .context("failed to list OIDC providers")?;
    for mapping in &mappings {
        tracing::info!("🔗 {}", label(mapping));
    }
    tracing::info!("found {} identity mappings referencing {}", mappings.len(), ctx.project());
    ctx.emit(&mappings.iter().map(as_json).collect::<Vec<_>>())?;
    Ok(Exit::Success)
}

pub async fn run_cleanup(ctx: &OpsContext, dry_run: bool) -> Result<Exit> {
    let started = Instant::now();
    let client = ctx.client()?;
    let summary = cleanup(&client, ctx.project(), dry_run, &ctx.labels)
        .await
        .context("failed to list OIDC providers")?;
    let elapsed = started.elapsed().as_secs_f64();
    let mut text = summary.markdown("Identity mapping cleanup");
    text.push_str(&markdown_section(
        "Identity mapping totals",
        &[
            format!("deleted: {}", summary.deleted.len()),
            format!("failed: {}", summary.failed.len()),
            format!("duration: {elapsed:.1}s"),
        ],
    ));
    ActionsFile::step_summary().append(&text)?;
    ctx.emit(&summary)?;
    Ok(Exit::incomplete_if(summary.has_failures()))
}
