//! Ordered, idempotent provisioning of the BookVerse demo.
//!
//! Every step creates what the blueprint describes and files the platform's
//! answer in a [`ProvisionReport`]. "Already exists" answers count as
//! skipped, so a second run over the same platform reports no changes. In
//! plan mode the steps only read, and anything missing is reported as
//! created.

use std::collections::BTreeSet;
use std::future::Future;

use anyhow::{Context, Result};
use bvo_core::models::{Application, OidcIntegration, PlatformUser, ProjectRole, RepositorySummary, Stage};
use bvo_core::summary::{ActionsFile, markdown_section};
use bvo_core::{Blueprint, ProvisionReport, ProvisionReportBuilder, ReportMode, ServiceSpec};
use bvo_jfrog::access::{NewProject, NewUser};
use bvo_jfrog::apptrust::NewApplication;
use bvo_jfrog::artifactory::NewLocalRepository;
use bvo_jfrog::events::{DispatchWebhook, Subscription};
use bvo_jfrog::oidc::{GITHUB_ISSUER, NewIdentityMapping, NewIntegration};
use bvo_jfrog::policy::{NewPolicy, created_id};
use bvo_jfrog::{ApiResponse, JfrogClient, JfrogError};
use bvo_telemetry::{RunLabels, record_action};
use rand::Rng;
use serde_json::json;

use crate::cli::ProvisionArgs;
use crate::commands::discover::not_found_as_empty;
use crate::commands::evidence::ensure_evidence_key;
use crate::commands::github::{Mirror, mirror_services};
use crate::context::OpsContext;
use crate::exit::Exit;

const PASSWORD_LENGTH: usize = 24;
const OIDC_PROVIDER_TYPE: &str = "GitHub";
const OIDC_AUDIENCE: &str = "jfrog-github";
const CI_BASE_ROLE: &str = "Developer";
const TOKEN_TTL_SECS: u64 = 3600;
const PROD_STAGE: &str = "PROD";

/// One provisioning run over a blueprint.
pub struct Provision<'a> {
    pub client: &'a JfrogClient,
    pub blueprint: &'a Blueprint,
    /// GitHub organisation used in identity mapping claims and webhooks.
    pub org: &'a str,
    /// Token embedded in dispatch webhooks. Without one webhooks are skipped.
    pub github_token: Option<&'a str>,
    /// Service repository mirroring. `None` skips the GitHub step.
    pub mirror: Option<Mirror<'a>>,
}

impl Provision<'_> {
    pub async fn run(&self, mode: ReportMode) -> ProvisionReport {
        let mut report = ProvisionReportBuilder::new(self.project(), mode);
        tracing::info!("provisioning {} ({})", self.project(), mode.as_str());

        let result = self.project_step(&mut report).await;
        settle_step(&mut report, "project", result);
        let result = self.stages_step(&mut report).await;
        settle_step(&mut report, "stages", result);
        let result = self.repositories_step(&mut report).await;
        settle_step(&mut report, "repositories", result);
        let result = self.applications_step(&mut report).await;
        settle_step(&mut report, "applications", result);
        let result = self.roles_step(&mut report).await;
        settle_step(&mut report, "roles", result);
        let result = self.users_step(&mut report).await;
        settle_step(&mut report, "users", result);
        let result = self.oidc_step(&mut report).await;
        settle_step(&mut report, "oidc", result);
        let result = self.policies_step(&mut report).await;
        settle_step(&mut report, "policies", result);

        let key = ensure_evidence_key(self.client, self.blueprint, &mut report).await;

        let result = self.webhooks_step(&mut report).await;
        settle_step(&mut report, "webhooks", result);

        match &self.mirror {
            Some(mirror) => {
                let services: Vec<&ServiceSpec> = self.blueprint.services.iter().collect();
                let private_key = key.as_ref().map(|pair| pair.private_pem.as_str());
                mirror_services(mirror, self.blueprint, &services, private_key, &mut report).await;
            }
            None => tracing::info!("GitHub mirroring skipped"),
        }
        report.finish()
    }

    fn project(&self) -> &str {
        self.blueprint.project_key()
    }

    async fn project_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let spec = &self.blueprint.project;
        let exists = if report.mode().is_plan() {
            self.client.get_project(&spec.key).await?.is_success()
        } else {
            false
        };
        let project = NewProject {
            project_key: &spec.key,
            display_name: &spec.display_name,
            description: &spec.description,
            storage_quota_bytes: spec.storage_quota_bytes,
            admin_privileges: Default::default(),
        };
        ensure(report, "project", &spec.key, exists, || {
            self.client.create_project(&project)
        })
        .await;
        Ok(())
    }

    async fn stages_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let project = self.project();
        let known = known_names(
            report,
            || self.client.list_stages(project),
            |s: &Stage| s.name.clone(),
        )
        .await?;
        let stages = self.blueprint.stage_names();
        for stage in &stages {
            ensure(report, "stage", stage, known.contains(stage), || {
                self.client.create_stage(project, stage)
            })
            .await;
        }

        let current = match self.client.get_lifecycle(project).await {
            Ok(lifecycle) => lifecycle.promote_stages,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };
        let entry = format!("lifecycle:{project}");
        if current == stages {
            report.skipped(entry);
        } else if report.mode().is_plan() {
            report.updated(entry);
        } else {
            let outcome = self.client.set_lifecycle(project, &stages).await?.outcome();
            if outcome.is_success() {
                tracing::info!("✅ lifecycle {}", stages.join(" → "));
                report.updated(entry);
            } else {
                report.failed(format!("{entry}: {}", outcome.describe()));
            }
        }
        Ok(())
    }

    async fn repositories_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let project = self.project();
        let known = known_names(
            report,
            || self.client.list_repositories(project),
            |r: &RepositorySummary| r.key.clone(),
        )
        .await?;
        for plan in self.blueprint.repositories() {
            let repo = NewLocalRepository {
                key: &plan.key,
                rclass: "local",
                package_type: plan.package.repository_type(),
                project_key: project,
                environments: vec![plan.environment],
                description: format!("{} {} packages", plan.service, plan.package.as_str()),
            };
            ensure(report, "repository", &plan.key, known.contains(&plan.key), || {
                self.client.create_local_repository(&repo)
            })
            .await;
        }
        Ok(())
    }

    async fn applications_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let project = self.project();
        let known = known_names(
            report,
            || self.client.list_applications(project),
            |a: &Application| a.application_key.clone(),
        )
        .await?;
        for service in &self.blueprint.services {
            let spec = &service.application;
            let app = NewApplication {
                application_key: &spec.key,
                application_name: &spec.name,
                project_key: project,
                description: &spec.description,
                criticality: &spec.criticality,
                maturity_level: &spec.maturity,
            };
            ensure(report, "application", &spec.key, known.contains(&spec.key), || {
                self.client.create_application(&app)
            })
            .await;
        }
        Ok(())
    }

    async fn roles_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let project = self.project();
        let known = known_names(
            report,
            || self.client.list_project_roles(project),
            |r: &ProjectRole| r.name.clone(),
        )
        .await?;
        for spec in &self.blueprint.roles {
            let role = ProjectRole {
                name: spec.name.clone(),
                description: Some(spec.description.clone()),
                role_type: Some("CUSTOM".to_string()),
                environments: spec.environments.clone(),
                actions: spec.actions.clone(),
            };
            ensure(report, "role", &spec.name, known.contains(&spec.name), || {
                self.client.create_project_role(project, &role)
            })
            .await;
        }
        Ok(())
    }

    /// Blueprint users plus one CI user per service that names one.
    fn members(&self) -> Vec<(String, String, Vec<String>)> {
        let mut members: Vec<(String, String, Vec<String>)> = self
            .blueprint
            .users
            .iter()
            .map(|u| (u.username.clone(), u.email.clone(), u.roles.clone()))
            .collect();
        let ci_roles = ci_roles(self.blueprint);
        for service in &self.blueprint.services {
            if let Some(ci_user) = &service.ci_user {
                members.push((ci_user.clone(), ci_user.clone(), ci_roles.clone()));
            }
        }
        members
    }

    async fn users_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let project = self.project();
        let known = known_names(
            report,
            || self.client.list_users(),
            |u: &PlatformUser| u.username.clone(),
        )
        .await?;
        let assigned = not_found_as_empty(self.client.list_project_members(project).await)?;

        for (username, email, roles) in self.members() {
            let password = random_password();
            let user = NewUser {
                username: &username,
                email: &email,
                password: &password,
                admin: false,
                profile_updatable: true,
            };
            ensure(report, "user", &username, known.contains(&username), || {
                self.client.create_user(&user)
            })
            .await;

            let entry = format!("member:{username}");
            let current = assigned.iter().find(|m| m.name == username);
            if current.is_some_and(|m| same_roles(&m.roles, &roles)) {
                report.skipped(entry);
                continue;
            }
            if report.mode().is_plan() {
                report.updated(entry);
                continue;
            }
            match self.client.add_project_member(project, &username, &roles).await {
                Ok(response) if response.is_success() => {
                    tracing::info!("✅ {username} → {}", roles.join(", "));
                    report.updated(entry);
                }
                Ok(response) => report.failed(format!("{entry}: {}", response.outcome().describe())),
                Err(err) => report.failed(format!("{entry}: {err}")),
            }
        }
        Ok(())
    }

    async fn oidc_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let project = self.project();
        let known = known_names(
            report,
            || self.client.list_oidc_integrations(),
            |i: &OidcIntegration| i.name.clone(),
        )
        .await?;
        let roles = ci_roles(self.blueprint);
        for service in &self.blueprint.services {
            let name = self.blueprint.oidc_integration_name(&service.name);
            let integration = NewIntegration {
                name: &name,
                issuer_url: GITHUB_ISSUER,
                provider_type: OIDC_PROVIDER_TYPE,
                description: format!("GitHub Actions for {}", service.github_repo),
                projects: vec![project.to_string()],
                audience: OIDC_AUDIENCE,
            };
            let integration_exists = known.contains(&name);
            ensure(report, "oidc", &name, integration_exists, || {
                self.client.create_oidc_integration(&integration)
            })
            .await;

            let mapping = NewIdentityMapping {
                name: self.blueprint.identity_mapping_name(&service.name),
                description: format!("{} pipelines", service.name),
                priority: 1,
                claims: json!({ "repository": format!("{}/{}", self.org, service.github_repo) }),
                token_spec: json!({
                    "username": service.ci_user,
                    "scope": format!("applied-permissions/roles:{project}:{}", roles.join(",")),
                    "audience": "*@*",
                    "expires_in": TOKEN_TTL_SECS,
                }),
            };
            let mapping_exists = report.mode().is_plan()
                && integration_exists
                && self
                    .client
                    .list_identity_mappings(&name)
                    .await?
                    .iter()
                    .any(|m| m.identifier().as_deref() == Some(mapping.name.as_str()));
            ensure(report, "identity-mapping", &mapping.name, mapping_exists, || {
                self.client.create_identity_mapping(&name, &mapping)
            })
            .await;
        }
        Ok(())
    }

    async fn policies_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let project = self.project();
        let existing_policies: BTreeSet<String> = self
            .client
            .list_policies(project)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();

        let rules = self.client.list_policy_rules().await?;
        let mut created_rules: Vec<(String, String)> = Vec::new();
        for spec in &self.blueprint.policies {
            let rule_name = format!("{project}-{}", spec.template);
            let mut rule_id = rules
                .iter()
                .find(|r| r.name == rule_name)
                .and_then(|r| r.id.clone())
                .or_else(|| {
                    created_rules
                        .iter()
                        .find(|(name, _)| *name == rule_name)
                        .map(|(_, id)| id.clone())
                });
            if rule_id.is_none() {
                let response = ensure(report, "policy-rule", &rule_name, false, || {
                    self.client.create_policy_rule(&rule_name, &spec.description, &spec.template)
                })
                .await;
                rule_id = response.as_ref().and_then(created_id);
                if let Some(id) = &rule_id {
                    created_rules.push((rule_name.clone(), id.clone()));
                }
            } else {
                report.skipped(format!("policy-rule:{rule_name}"));
            }

            if existing_policies.contains(&spec.name) {
                tracing::info!("✅ policy:{} already exists", spec.name);
                report.skipped(format!("policy:{}", spec.name));
                continue;
            }
            if report.mode().is_plan() {
                report.created(format!("policy:{}", spec.name));
                continue;
            }
            let Some(rule_id) = rule_id else {
                report.failed(format!("policy:{}: rule {rule_name} has no id", spec.name));
                continue;
            };
            let stage = if spec.stage == PROD_STAGE {
                PROD_STAGE.to_string()
            } else {
                self.blueprint.stage_name(&spec.stage)
            };
            let policy = NewPolicy::gate(
                &spec.name,
                &spec.description,
                &spec.mode,
                project,
                &stage,
                &spec.gate,
                rule_id,
            );
            ensure(report, "policy", &spec.name, false, || self.client.create_policy(&policy)).await;
        }
        Ok(())
    }

    async fn webhooks_step(&self, report: &mut ProvisionReportBuilder) -> Result<(), JfrogError> {
        let Some(token) = self.github_token.filter(|t| !t.trim().is_empty()) else {
            for webhook in &self.blueprint.webhooks {
                tracing::warn!("⚠️ webhook {} skipped: no GitHub token", webhook.key);
                report.warn(format!("webhook:{}: no GitHub token", webhook.key));
            }
            return Ok(());
        };
        let known = known_names(
            report,
            || self.client.list_subscriptions(),
            |s: &Subscription| s.key.clone(),
        )
        .await?;
        for webhook in &self.blueprint.webhooks {
            let subscription = DispatchWebhook {
                key: &webhook.key,
                description: &webhook.description,
                domain: &webhook.domain,
                event_types: &webhook.event_types,
                project: self.project(),
                owner: self.org,
                repo: &webhook.target_repo,
                dispatch_event: &webhook.dispatch_event,
                github_token: token,
            };
            ensure(report, "webhook", &webhook.key, known.contains(&webhook.key), || {
                self.client.create_dispatch_webhook(&subscription)
            })
            .await;
        }
        Ok(())
    }
}

/// Roles granted to service CI users: the base developer role plus every
/// blueprint role meant for pipelines.
fn ci_roles(blueprint: &Blueprint) -> Vec<String> {
    let mut roles = vec![CI_BASE_ROLE.to_string()];
    roles.extend(
        blueprint
            .roles
            .iter()
            .filter(|r| r.name.ends_with("-pipeline"))
            .map(|r| r.name.clone()),
    );
    roles
}

fn same_roles(current: &[String], wanted: &[String]) -> bool {
    let current: BTreeSet<&String> = current.iter().collect();
    let wanted: BTreeSet<&String> = wanted.iter().collect();
    current == wanted
}

fn random_password() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

fn settle_step(report: &mut ProvisionReportBuilder, step: &str, result: Result<(), JfrogError>) {
    if let Err(err) = result {
        tracing::error!("❌ {step} step failed: {err}");
        report.failed(format!("{step}: {err}"));
    }
}

/// Names already on the platform. Only plan mode needs them; ensure mode
/// relies on the "already exists" answers instead.
async fn known_names<T, Fut>(
    report: &ProvisionReportBuilder,
    list: impl FnOnce() -> Fut,
    name: impl Fn(&T) -> String,
) -> Result<BTreeSet<String>, JfrogError>
where
    Fut: Future<Output = Result<Vec<T>, JfrogError>>,
{
    if !report.mode().is_plan() {
        return Ok(BTreeSet::new());
    }
    Ok(not_found_as_empty(list().await)?.iter().map(name).collect())
}

/// Creates one resource, or in plan mode reports whether it would be.
async fn ensure<Fut>(
    report: &mut ProvisionReportBuilder,
    kind: &str,
    name: &str,
    exists: bool,
    create: impl FnOnce() -> Fut,
) -> Option<ApiResponse>
where
    Fut: Future<Output = Result<ApiResponse, JfrogError>>,
{
    if report.mode().is_plan() {
        if exists {
            report.skipped(format!("{kind}:{name}"));
        } else {
            tracing::info!("would create {kind}:{name}");
            report.created(format!("{kind}:{name}"));
        }
        return None;
    }
    match create().await {
        Ok(response) => {
            report.record(kind, name, &response.outcome());
            Some(response)
        }
        Err(err) => {
            tracing::error!("❌ {kind}:{name}: {err}");
            report.failed(format!("{kind}:{name}: {err}"));
            None
        }
    }
}

/// Markdown bullet lines for the step summary.
pub fn summary_lines(report: &ProvisionReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} created, {} updated, {} skipped, {} failed",
        report.created.len(),
        report.updated.len(),
        report.skipped.len(),
        report.failed.len()
    )];
    lines.extend(report.created.iter().map(|entry| format!("✅ created {entry}")));
    lines.extend(report.updated.iter().map(|entry| format!("✅ updated {entry}")));
    lines.extend(report.warnings.iter().map(|entry| format!("⚠️ {entry}")));
    lines.extend(report.failed.iter().map(|entry| format!("❌ {entry}")));
    lines
}

fn record_totals(labels: &RunLabels, report: &ProvisionReport) {
    let buckets = [
        ("created", &report.created),
        ("updated", &report.updated),
        ("skipped", &report.skipped),
        ("failed", &report.failed),
    ];
    for (outcome, entries) in buckets {
        for _ in entries {
            record_action(labels, "provision", outcome);
        }
    }
}

pub async fn run(ctx: &OpsContext, args: &ProvisionArgs) -> Result<Exit> {
    let client = ctx.client()?;
    let mode = if args.dry_run { ReportMode::Plan } else { ReportMode::Ensure };
    let gh = ctx.gh();
    let mirror = if args.skip_github {
        None
    } else {
        Some(ctx.mirror(&gh)?)
    };
    let provision = Provision {
        client: &client,
        blueprint: &ctx.blueprint,
        org: ctx.github_org(),
        github_token: ctx.config.gh_token.as_deref(),
        mirror,
    };
    let report = provision.run(mode).await;
    record_totals(&ctx.labels, &report);

    tracing::info!(
        "{}: {} created, {} updated, {} skipped, {} failed",
        ctx.project(),
        report.created.len(),
        report.updated.len(),
        report.skipped.len(),
        report.failed.len()
    );
    ActionsFile::step_summary()
        .append(&markdown_section("Provisioning", &summary_lines(&report)))
        .context("failed to write the step summary")?;
    ctx.emit(&report)?;
    Ok(Exit::failed_if(report.has_failures()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ci_users_get_pipeline_roles() {
        let blueprint = Blueprint::bookverse_default().unwrap();
        assert_eq!(ci_roles(&blueprint), ["Developer", "bookverse-pipeline"]);
    }

    #[test]
    fn role_order_does_not_matter() {
        let a = vec!["Developer".to_string(), "Viewer".to_string()];
        let b = vec!["Viewer".to_string(), "Developer".to_string()];
        assert!(same_roles(&a, &b));
        assert!(!same_roles(&a, &b[..1]));
    }

    #[test]
    fn passwords_are_alphanumeric() {
        let password = random_password();
        assert_eq!(password.len(), PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn summary_counts_every_bucket() {
        let mut builder = ProvisionReportBuilder::new("bookverse", ReportMode::Ensure);
        builder.created("stage:bookverse-DEV");
        builder.skipped("project:bookverse");
        builder.failed("user:x: HTTP 500");
        let lines = summary_lines(&builder.finish());
        assert_eq!(lines[0], "1 created, 0 updated, 1 skipped, 1 failed");
        assert!(lines.contains(&"❌ user:x: HTTP 500".to_string()));
    }
}
