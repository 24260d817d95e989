//! Next-version computation for CI and the version map that seeds it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use bvo_core::models::extract_versions;
use bvo_core::summary::{ActionsFile, env_key};
use bvo_core::versioning::{bump_patch, max_release, parse_release, release_from_path};
use bvo_core::{Blueprint, PackageKind, VersionMap};
use bvo_jfrog::JfrogClient;
use serde::Serialize;
use serde_json::Value;

use crate::context::OpsContext;
use crate::exit::Exit;

/// How many recent versions are considered when the newest one is not a
/// plain release.
pub const RECENT_VERSIONS: u32 = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NextVersions {
    pub application_key: String,
    pub app_version: String,
    pub build_number: String,
    pub package_tags: BTreeMap<String, String>,
}

impl NextVersions {
    /// `$GITHUB_ENV` lines for the CI workflow. Every package tag is
    /// exported as `DOCKER_TAG_<NAME>`, whatever its type.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("APP_VERSION".to_string(), self.app_version.clone()),
            ("BUILD_NUMBER".to_string(), self.build_number.clone()),
            ("IMAGE_TAG".to_string(), self.build_number.clone()),
        ];
        for (name, tag) in &self.package_tags {
            pairs.push((env_key("DOCKER_TAG_", name), tag.clone()));
        }
        pairs
    }
}

/// A package to tag, with the type used to find its existing tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: String,
    pub kind: PackageKind,
}

/// Resolves `--packages` (comma separated) against the version map and the
/// service images. Without a list every image of the service is tagged.
pub fn package_requests(
    blueprint: &Blueprint,
    map: &VersionMap,
    app_key: &str,
    packages: Option<&str>,
) -> Vec<PackageRequest> {
    let service = blueprint.service_for_app(app_key);
    let names: Vec<String> = match packages {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        None => service.map(|s| s.images.clone()).unwrap_or_default(),
    };
    names
        .into_iter()
        .map(|name| {
            let mapped = map
                .app(app_key)
                .and_then(|app| app.packages.iter().find(|p| p.name == name))
                .map(|p| p.package_type.as_str());
            let is_image = service.is_some_and(|s| s.images.contains(&name));
            let kind = match mapped {
                Some("docker") => PackageKind::Docker,
                Some(_) => PackageKind::Generic,
                None if is_image => PackageKind::Docker,
                None => PackageKind::Generic,
            };
            PackageRequest { name, kind }
        })
        .collect()
}

fn bump_or_seed(current: Option<&str>, seed: Option<&str>, what: &str) -> Result<String> {
    if let Some(next) = current.and_then(bump_patch) {
        return Ok(next);
    }
    seed.and_then(bump_patch)
        .ok_or_else(|| anyhow!("no usable version or seed for {what}"))
}

fn build_number_of(version: &Value) -> Option<String> {
    match version.pointer("/sources/builds/0/number")? {
        Value::String(number) => Some(number.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub async fn compute_next(
    client: &JfrogClient,
    blueprint: &Blueprint,
    map: &VersionMap,
    app_key: &str,
    packages: &[PackageRequest],
) -> Result<NextVersions> {
    let seeds = map.app(app_key);
    let raw = client.list_versions_raw(app_key, RECENT_VERSIONS).await?;
    let versions = extract_versions(&raw);

    let latest = versions.first().map(|v| v.version.as_str());
    let current = match latest.filter(|v| parse_release(v).is_some()) {
        Some(latest) => Some(latest),
        None => max_release(versions.iter().map(|v| v.version.as_str())),
    };
    let app_version = bump_or_seed(
        current,
        seeds.and_then(|s| s.seeds.application.as_deref()),
        &format!("application {app_key}"),
    )?;

    let mut last_build = None;
    if let Some(latest) = latest {
        let listed = raw
            .get("versions")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(build_number_of);
        last_build = match listed {
            Some(number) => Some(number),
            None => match client.get_version(app_key, latest).await {
                Ok(detail) => build_number_of(&detail),
                Err(err) => {
                    tracing::warn!("⚠️ could not read {app_key}@{latest}: {err}");
                    None
                }
            },
        };
    }
    let build_number = bump_or_seed(
        last_build.as_deref(),
        seeds.and_then(|s| s.seeds.build.as_deref()),
        &format!("build of {app_key}"),
    )?;

    let service = blueprint.service_for_app(app_key);
    let mut package_tags = BTreeMap::new();
    for package in packages {
        let seed = seeds
            .and_then(|s| s.packages.iter().find(|p| p.name == package.name))
            .and_then(|p| p.seed.as_deref());
        let existing = match service {
            Some(service) => existing_tags(client, blueprint, &service.name, package).await,
            None => Vec::new(),
        };
        let current = max_release(existing.iter().map(String::as_str));
        let tag = bump_or_seed(current, seed, &format!("package {}", package.name))?;
        package_tags.insert(package.name.clone(), tag);
    }

    Ok(NextVersions {
        application_key: app_key.to_string(),
        app_version,
        build_number,
        package_tags,
    })
}

/// Release tags already published for `package`. Lookup failures are
/// logged and treated as no tags so the seed still applies.
async fn existing_tags(
    client: &JfrogClient,
    blueprint: &Blueprint,
    service: &str,
    package: &PackageRequest,
) -> Vec<String> {
    let found = match package.kind {
        PackageKind::Docker => {
            let repo = blueprint.nonprod_repository(service, PackageKind::Docker);
            client.docker_tags(&repo, &package.name).await
        }
        _ => {
            let repo = blueprint.nonprod_repository(service, PackageKind::Generic);
            client.list_repository_files(&repo).await.map(|files| {
                files
                    .iter()
                    .filter_map(|item| release_from_path(&format!("{}/{}", item.path, item.name)))
                    .collect()
            })
        }
    };
    found.unwrap_or_else(|err| {
        tracing::warn!("⚠️ could not list tags of {}: {err}", package.name);
        Vec::new()
    })
}

pub async fn run_next(
    ctx: &OpsContext,
    app_key: &str,
    packages: Option<&str>,
    version_map: &Path,
) -> Result<Exit> {
    let map = if version_map.exists() {
        VersionMap::load(version_map)?
    } else {
        tracing::warn!("⚠️ {} not found; relying on platform state", version_map.display());
        VersionMap::default()
    };
    let requests = package_requests(&ctx.blueprint, &map, app_key, packages);
    let client = ctx.client()?;
    let next = compute_next(&client, &ctx.blueprint, &map, app_key, &requests)
        .await
        .with_context(|| format!("failed to compute versions for {app_key}"))?;

    let pairs = next.env_pairs();
    ActionsFile::github_env().export(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    tracing::info!(
        "✅ {app_key}: version {} build {}",
        next.app_version,
        next.build_number
    );
    if ctx.json {
        ctx.emit(&next)?;
    } else {
        println!("{}", serde_json::to_string(&next)?);
    }
    Ok(Exit::Success)
}

pub fn run_seed_map(ctx: &OpsContext, version_map: &Path) -> Result<Exit> {
    let mut map = if version_map.exists() {
        VersionMap::load(version_map)?
    } else {
        VersionMap::default()
    };
    let added = map.fill_missing(&ctx.blueprint, &mut rand::rng());
    map.save(version_map)?;
    tracing::info!("✅ {} seeds added to {}", added, version_map.display());
    ctx.emit(&map)?;
    Ok(Exit::Success)
}
