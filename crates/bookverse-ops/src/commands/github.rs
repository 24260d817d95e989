use std::collections::BTreeMap;

use anyhow::{Context, Result};
use bvo_core::summary::markdown_section;
use bvo_core::{Blueprint, ProvisionReportBuilder, ReportMode, ServiceSpec};
use bvo_github::{DispatchClient, GhCli, RepoCreation, RepoRef};
use serde_json::Value;

use crate::commands::provision::summary_lines;
use crate::context::OpsContext;
use crate::exit::{Exit, UsageError};

pub const PRIVATE_KEY_SECRET: &str = "EVIDENCE_PRIVATE_KEY";

/// Where and what to mirror into the service repositories.
pub struct Mirror<'a> {
    pub gh: &'a GhCli,
    pub org: &'a str,
    pub jfrog_url: String,
    pub docker_registry: String,
}

impl Mirror<'_> {
    pub fn repo(&self, service: &ServiceSpec) -> RepoRef {
        RepoRef::new(self.org, &service.github_repo)
    }

    /// Repository variables written for `service`.
    pub fn variables(&self, blueprint: &Blueprint, service: &ServiceSpec) -> Vec<(&'static str, String)> {
        vec![
            ("JFROG_URL", self.jfrog_url.clone()),
            ("PROJECT_KEY", blueprint.project_key().to_string()),
            ("DOCKER_REGISTRY", self.docker_registry.clone()),
            ("SERVICE_NAME", service.name.clone()),
            ("APPLICATION_KEY", service.application.key.clone()),
            ("EVIDENCE_KEY_ALIAS", blueprint.evidence.key_alias.clone()),
        ]
    }
}

/// Ensures each service repository exists and writes the variables whose
/// value differs from what the repository already holds. The evidence
/// private key is stored as a secret when one is provided.
pub async fn mirror_services(
    mirror: &Mirror<'_>,
    blueprint: &Blueprint,
    services: &[&ServiceSpec],
    private_key: Option<&str>,
    report: &mut ProvisionReportBuilder,
) {
    for service in services {
        let repo = mirror.repo(service);
        let entry = format!("github:{repo}");
        if report.mode().is_plan() {
            report.updated(entry);
            continue;
        }

        match mirror.gh.ensure_repo(&repo, &service.application.description).await {
            Ok(RepoCreation::Created) => {
                tracing::info!("✅ created repository {repo}");
                report.created(format!("github-repo:{repo}"));
            }
            Ok(RepoCreation::AlreadyExists) => report.skipped(format!("github-repo:{repo}")),
            Err(err) => {
                tracing::error!("❌ {repo}: {err}");
                report.failed(format!("github-repo:{repo}: {err}"));
                continue;
            }
        }

        let current = mirror.gh.list_variables(&repo).await.unwrap_or_else(|err| {
            tracing::warn!("⚠️ could not list variables of {repo}: {err}");
            BTreeMap::new()
        });
        let mut failed = false;
        let mut written = 0;
        for (name, value) in mirror.variables(blueprint, service) {
            if value.is_empty() {
                report.warn(format!("{entry}: {name} has no value"));
                continue;
            }
            if current.get(name) == Some(&value) {
                continue;
            }
            match mirror.gh.set_variable(&repo, name, &value).await {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::error!("❌ {repo} variable {name}: {err}");
                    report.failed(format!("github-variable:{repo}/{name}: {err}"));
                    failed = true;
                }
            }
        }
        if !failed {
            if written == 0 {
                tracing::info!("variables of {repo} already up to date");
                report.skipped(format!("github-variables:{repo}"));
            } else {
                tracing::info!("✅ {written} variables written to {repo}");
                report.updated(format!("github-variables:{repo}"));
            }
        }

        if let Some(key) = private_key {
            match mirror.gh.set_secret(&repo, PRIVATE_KEY_SECRET, key).await {
                Ok(()) => report.secret_written(format!("{repo}:{PRIVATE_KEY_SECRET}")),
                Err(err) => report.failed(format!("github-secret:{repo}/{PRIVATE_KEY_SECRET}: {err}")),
            }
        }
    }
}

pub async fn run_sync(ctx: &OpsContext, service: Option<&str>) -> Result<Exit> {
    let services: Vec<&ServiceSpec> = match service {
        Some(name) => vec![
            ctx.blueprint
                .service(name)
                .ok_or_else(|| UsageError(format!("unknown service {name}")))?,
        ],
        None => ctx.blueprint.services.iter().collect(),
    };
    let gh = ctx.gh();
    let mirror = ctx.mirror(&gh)?;
    let mut report = ProvisionReportBuilder::new(ctx.project(), ReportMode::Ensure);
    mirror_services(&mirror, &ctx.blueprint, &services, None, &mut report).await;
    let report = report.finish();
    bvo_core::summary::ActionsFile::step_summary()
        .append(&markdown_section("GitHub sync", &summary_lines(&report)))?;
    ctx.emit(&report)?;
    Ok(Exit::failed_if(report.has_failures()))
}

pub async fn run_dispatch(
    ctx: &OpsContext,
    repo: &str,
    event_type: &str,
    payload: &str,
    api_base: Option<&str>,
) -> Result<Exit> {
    let repo = RepoRef::parse(repo)?;
    let payload: Value = serde_json::from_str(payload)
        .map_err(|err| UsageError(format!("--payload is not valid JSON: {err}")))?;
    let token = ctx.config.gh_token.as_deref().unwrap_or_default();
    let client = match api_base {
        Some(base) => DispatchClient::with_api_base(base, token, ctx.config.timeout)?,
        None => DispatchClient::new(token, ctx.config.timeout)?,
    };
    client
        .dispatch(&repo, event_type, &payload)
        .await
        .with_context(|| format!("dispatch to {repo} failed"))?;
    tracing::info!("✅ sent {event_type} to {repo}");
    Ok(Exit::Success)
}

/// Splits `key=value` workflow inputs. The value may itself contain `=`.
pub fn parse_fields(fields: &[String]) -> Result<Vec<(String, String)>, UsageError> {
    fields
        .iter()
        .map(|field| match field.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(UsageError(format!("workflow input `{field}` must look like key=value"))),
        })
        .collect()
}

pub async fn trigger_workflow(
    gh: &GhCli,
    repo: &RepoRef,
    workflow: &str,
    git_ref: Option<&str>,
    inputs: &[(String, String)],
) -> Result<()> {
    gh.run_workflow(repo, workflow, git_ref, inputs)
        .await
        .with_context(|| format!("workflow {workflow} in {repo} could not be started"))?;
    tracing::info!("✅ started {workflow} in {repo}");
    Ok(())
}

pub async fn run_workflow(
    ctx: &OpsContext,
    repo: &str,
    workflow: &str,
    git_ref: Option<&str>,
    fields: &[String],
) -> Result<Exit> {
    let repo = RepoRef::parse(repo)?;
    let inputs = parse_fields(fields)?;
    trigger_workflow(&ctx.gh(), &repo, workflow, git_ref, &inputs).await?;
    Ok(Exit::Success)
}
