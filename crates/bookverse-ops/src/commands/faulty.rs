use anyhow::{Context, Result};
use bvo_core::summary::ActionsFile;
use bvo_jfrog::apptrust::ALL_VERSIONS_LIMIT;
use bvo_jfrog::{JfrogClient, JfrogError, VersionStore};
use bvo_telemetry::RunLabels;
use futures::{StreamExt, stream};
use serde::Serialize;
use serde_json::Value;

use crate::commands::{DeletionSummary, MAX_PARALLEL_JOBS};
use crate::context::OpsContext;
use crate::exit::Exit;

pub const DEFAULT_FAULTY_TAG: &str = "180-1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FaultyVersion {
    pub application: String,
    pub version: String,
    /// Artifact paths or `name:version` releasables that matched.
    pub artifacts: Vec<String>,
    /// Stages the version was promoted to.
    pub promotions: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct FaultyScan {
    pub tag: String,
    pub applications_scanned: usize,
    pub versions_scanned: usize,
    pub matches: Vec<FaultyVersion>,
    pub deletions: DeletionSummary,
}

/// A releasable carries the faulty artifact when its version is the tag or
/// its name mentions it, and it is a docker image or a checkout package.
pub fn is_faulty_releasable(item: &Value, tag: &str) -> bool {
    let text = |field: &str| item.get(field).and_then(Value::as_str).unwrap_or_default();
    let name = text("name");
    let tagged = text("version") == tag || name.contains(tag);
    let kind = text("package_type");
    tagged && (kind.eq_ignore_ascii_case("docker") || name.contains("checkout"))
}

/// An artifact path such as `repo/checkout-api/180-1/manifest.json` is
/// faulty when it names the tag and belongs to checkout or a docker repo.
pub fn is_faulty_artifact_name(name: &str, tag: &str) -> bool {
    name.contains(tag) && (name.contains("checkout") || name.to_ascii_lowercase().contains("docker"))
}

/// Matches in both content listings: `artifacts[].name` and, when the
/// platform includes them, `releasables[]`.
pub fn faulty_artifacts(content: &Value, tag: &str) -> Vec<String> {
    let items = |field: &str| {
        content
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    };
    let mut found: Vec<String> = items("artifacts")
        .iter()
        .filter_map(|artifact| artifact.get("name").and_then(Value::as_str))
        .filter(|name| is_faulty_artifact_name(name, tag))
        .map(str::to_string)
        .collect();
    for item in items("releasables").iter().filter(|item| is_faulty_releasable(item, tag)) {
        let name = item.get("name").and_then(Value::as_str).unwrap_or("?");
        let version = item.get("version").and_then(Value::as_str).unwrap_or("?");
        found.push(format!("{name}:{version}"));
    }
    found
}

fn promoted_stages(promotions: &Value) -> Vec<String> {
    let items = match promotions {
        Value::Array(items) => items.as_slice(),
        other => other
            .get("promotions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };
    items
        .iter()
        .filter_map(|p| p.get("target_stage").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Versions of `app_key` whose content includes the faulty artifact.
pub async fn scan_application(
    client: &JfrogClient,
    app_key: &str,
    tag: &str,
) -> Result<(usize, Vec<FaultyVersion>), JfrogError> {
    let versions = client.list_versions(app_key, ALL_VERSIONS_LIMIT).await?;
    let mut matches = Vec::new();
    for version in &versions {
        let content = match client.version_content(app_key, &version.version).await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("⚠️ could not read content of {app_key}@{}: {err}", version.version);
                continue;
            }
        };
        let artifacts = faulty_artifacts(&content, tag);
        if artifacts.is_empty() {
            continue;
        }
        let promotions = match client.version_promotions(app_key, &version.version).await {
            Ok(value) => promoted_stages(&value),
            Err(err) => {
                tracing::warn!("⚠️ could not read promotions of {app_key}@{}: {err}", version.version);
                Vec::new()
            }
        };
        tracing::warn!(
            "⚠️ {app_key}@{} ships {} (promoted to: {})",
            version.version,
            artifacts.join(", "),
            if promotions.is_empty() { "none".to_string() } else { promotions.join(", ") }
        );
        matches.push(FaultyVersion {
            application: app_key.to_string(),
            version: version.version.clone(),
            artifacts,
            promotions,
        });
    }
    Ok((versions.len(), matches))
}

pub async fn scan(
    client: &JfrogClient,
    project: &str,
    app_key: Option<&str>,
    tag: &str,
    dry_run: bool,
    labels: &RunLabels,
) -> Result<FaultyScan, JfrogError> {
    let apps: Vec<String> = match app_key {
        Some(app) => vec![app.to_string()],
        None => client
            .list_applications(project)
            .await?
            .into_iter()
            .map(|app| app.application_key)
            .collect(),
    };

    let mut result = FaultyScan {
        tag: tag.to_string(),
        applications_scanned: apps.len(),
        ..FaultyScan::default()
    };
    let scans: Vec<_> = stream::iter(apps)
        .map(|app| async move {
            let scanned = scan_application(client, &app, tag).await;
            (app, scanned)
        })
        .buffer_unordered(MAX_PARALLEL_JOBS)
        .collect()
        .await;
    for (app, scanned) in scans {
        match scanned {
            Ok((count, matches)) => {
                result.versions_scanned += count;
                result.matches.extend(matches);
            }
            Err(err) => result.deletions.fail(labels, "application", &app, &format!("scan failed: {err}")),
        }
    }
    result
        .matches
        .sort_by(|a, b| (&a.application, &a.version).cmp(&(&b.application, &b.version)));

    for faulty in &result.matches {
        let id = format!("{}@{}", faulty.application, faulty.version);
        if dry_run {
            result.deletions.plan("version", &id);
        } else {
            let deleted = client.delete_version(&faulty.application, &faulty.version).await;
            result.deletions.settle(labels, "version", &id, deleted);
        }
    }
    Ok(result)
}

pub async fn run(ctx: &OpsContext, app_key: Option<&str>, tag: &str, dry_run: bool) -> Result<Exit> {
    let client = ctx.client()?;
    let result = scan(&client, ctx.project(), app_key, tag, dry_run, &ctx.labels)
        .await
        .context("faulty version scan failed")?;
    tracing::info!(
        "scanned {} versions in {} applications; {} carry {}",
        result.versions_scanned,
        result.applications_scanned,
        result.matches.len(),
        tag
    );
    ActionsFile::step_summary().append(&result.deletions.markdown("Faulty versions"))?;
    ctx.emit(&result)?;
    Ok(Exit::failed_if(result.deletions.has_failures()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn releasable_matching() {
        let tag = DEFAULT_FAULTY_TAG;
        assert!(is_faulty_releasable(
            &json!({"name": "checkout-api", "version": "180-1", "package_type": "docker"}),
            tag
        ));
        assert!(is_faulty_releasable(
            &json!({"name": "checkout-180-1.tar.gz", "version": "1.0.0", "package_type": "generic"}),
            tag
        ));
        assert!(!is_faulty_releasable(
            &json!({"name": "web-assets", "version": "180-1", "package_type": "generic"}),
            tag
        ));
        assert!(!is_faulty_releasable(
            &json!({"name": "checkout-api", "version": "181-1", "package_type": "docker"}),
            tag
        ));
    }

    #[test]
    fn artifact_listing_matches_tag_with_checkout_or_docker() {
        let content = json!({"artifacts": [
            {"name": "bookverse-checkout-internal-docker-nonprod-local/checkout-api/180-1/manifest.json"},
            {"name": "bookverse-web-internal-npm-nonprod-local/web/180-1/web.tgz"},
            {"name": "bookverse-checkout-internal-docker-nonprod-local/checkout-api/1.2.0/manifest.json"},
        ]});
        let found = faulty_artifacts(&content, DEFAULT_FAULTY_TAG);
        assert_eq!(
            found,
            ["bookverse-checkout-internal-docker-nonprod-local/checkout-api/180-1/manifest.json"]
        );
    }

    #[test]
    fn releasables_are_read_alongside_artifacts() {
        let content = json!({
            "artifacts": [{"name": "inventory/DOCKER/180-1/manifest.json"}],
            "releasables": [{"name": "checkout-api", "version": "180-1", "package_type": "docker"}],
        });
        let found = faulty_artifacts(&content, DEFAULT_FAULTY_TAG);
        assert_eq!(found, ["inventory/DOCKER/180-1/manifest.json", "checkout-api:180-1"]);
        assert!(faulty_artifacts(&json!({"version": "1.0.0"}), DEFAULT_FAULTY_TAG).is_empty());
    }

    #[test]
    fn promotions_accept_both_envelopes() {
        let wrapped = json!({"promotions": [{"target_stage": "bookverse-QA"}, {"status": "x"}]});
        assert_eq!(promoted_stages(&wrapped), ["bookverse-QA"]);
        let bare = json!([{"target_stage": "PROD"}]);
        assert_eq!(promoted_stages(&bare), ["PROD"]);
    }
}
