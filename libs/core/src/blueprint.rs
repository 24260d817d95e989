//! Fixed-schema description of the BookVerse demo environment and the names
//! derived from it.

use std::{collections::BTreeSet, fs, path::Path};

use serde::{Deserialize, Serialize};

const DEFAULT_BLUEPRINT: &str = include_str!("../assets/bookverse.yaml");
const PROJECT_PLACEHOLDER: &str = "{project}";

#[derive(Debug, thiserror::Error)]
pub enum BlueprintError {
    #[error("failed to read blueprint {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid blueprint yaml: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),
    #[error("invalid blueprint: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blueprint {
    pub project: ProjectSpec,
    pub stages: Vec<String>,
    #[serde(default)]
    pub user_domain: Option<String>,
    #[serde(default)]
    pub github: GithubSpec,
    pub evidence: EvidenceSpec,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
    #[serde(default)]
    pub webhooks: Vec<WebhookSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "unlimited_quota")]
    pub storage_quota_bytes: i64,
}

fn unlimited_quota() -> i64 {
    -1
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GithubSpec {
    #[serde(default)]
    pub org: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidenceSpec {
    pub key_alias: String,
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_key_bits() -> usize {
    2048
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub application: ApplicationSpec,
    #[serde(default)]
    pub packages: Vec<PackageKind>,
    /// Docker image names published by the service.
    #[serde(default)]
    pub images: Vec<String>,
    pub github_repo: String,
    #[serde(default)]
    pub ci_user: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_criticality")]
    pub criticality: String,
    #[serde(default = "default_maturity")]
    pub maturity: String,
}

fn default_criticality() -> String {
    "medium".into()
}

fn default_maturity() -> String {
    "production".into()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Docker,
    Python,
    Npm,
    Generic,
    Helm,
    Maven,
}

impl PackageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageKind::Docker => "docker",
            PackageKind::Python => "python",
            PackageKind::Npm => "npm",
            PackageKind::Generic => "generic",
            PackageKind::Helm => "helm",
            PackageKind::Maven => "maven",
        }
    }

    /// Artifactory `packageType` value.
    pub fn repository_type(self) -> &'static str {
        match self {
            PackageKind::Python => "pypi",
            other => other.as_str(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserSpec {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub environments: Vec<String>,
    pub actions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stage: String,
    pub gate: String,
    pub mode: String,
    pub template: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookSpec {
    pub key: String,
    #[serde(default)]
    pub description: String,
    pub domain: String,
    pub event_types: Vec<String>,
    pub target_repo: String,
    pub dispatch_event: String,
}

/// A repository the blueprint expects for one service and package type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryPlan {
    pub key: String,
    pub service: String,
    pub package: PackageKind,
    pub environment: &'static str,
}

impl Blueprint {
    pub fn bookverse_default() -> Result<Self, BlueprintError> {
        Self::from_yaml(DEFAULT_BLUEPRINT, None)
    }

    /// Loads `path`, or the embedded default when `path` is `None`.
    pub fn load(path: Option<&Path>, project_override: Option<&str>) -> Result<Self, BlueprintError> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| BlueprintError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_yaml(&raw, project_override)
            }
            None => Self::from_yaml(DEFAULT_BLUEPRINT, project_override),
        }
    }

    pub fn from_yaml(raw: &str, project_override: Option<&str>) -> Result<Self, BlueprintError> {
        let mut blueprint: Blueprint = serde_yaml_bw::from_str(raw)?;
        if let Some(project) = project_override.map(str::trim).filter(|p| !p.is_empty()) {
            blueprint.project.key = project.to_string();
        }
        blueprint.expand_placeholders();
        blueprint.validate()?;
        Ok(blueprint)
    }

    pub fn project_key(&self) -> &str {
        &self.project.key
    }

    fn expand_placeholders(&mut self) {
        let project = self.project.key.clone();
        let expand = |value: &mut String| {
            if value.contains(PROJECT_PLACEHOLDER) {
                *value = value.replace(PROJECT_PLACEHOLDER, &project);
            }
        };
        expand(&mut self.evidence.key_alias);
        for service in &mut self.services {
            expand(&mut service.application.key);
            expand(&mut service.github_repo);
        }
        for role in &mut self.roles {
            expand(&mut role.name);
        }
        for webhook in &mut self.webhooks {
            expand(&mut webhook.key);
            expand(&mut webhook.target_repo);
        }
    }

    pub fn validate(&self) -> Result<(), BlueprintError> {
        ensure_identifier("project.key", &self.project.key)?;
        ensure_non_empty("project.display_name", &self.project.display_name)?;
        ensure_no_control_chars("project.display_name", &self.project.display_name)?;
        ensure_identifier("evidence.key_alias", &self.evidence.key_alias)?;
        if self.evidence.key_bits < 2048 {
            return Err(BlueprintError::Validation(format!(
                "evidence.key_bits must be at least 2048, got {}",
                self.evidence.key_bits
            )));
        }
        for stage in &self.stages {
            ensure_identifier("stages[]", stage)?;
        }

        let mut names = BTreeSet::new();
        for service in &self.services {
            ensure_identifier("services[].name", &service.name)?;
            if !names.insert(service.name.as_str()) {
                return Err(BlueprintError::Validation(format!(
                    "duplicate service name {}",
                    service.name
                )));
            }
            ensure_identifier("services[].application.key", &service.application.key)?;
            ensure_no_control_chars("services[].application.name", &service.application.name)?;
            ensure_identifier("services[].github_repo", &service.github_repo)?;
            for image in &service.images {
                ensure_identifier("services[].images[]", image)?;
            }
            if let Some(ci_user) = &service.ci_user {
                ensure_identifier("services[].ci_user", ci_user)?;
            }
        }
        for user in &self.users {
            ensure_identifier("users[].username", &user.username)?;
            ensure_identifier("users[].email", &user.email)?;
        }
        for role in &self.roles {
            ensure_identifier("roles[].name", &role.name)?;
        }
        for policy in &self.policies {
            ensure_non_empty("policies[].name", &policy.name)?;
            ensure_no_control_chars("policies[].name", &policy.name)?;
            if !self.stages.iter().any(|stage| stage == &policy.stage) && policy.stage != "PROD" {
                return Err(BlueprintError::Validation(format!(
                    "policy {} references unknown stage {}",
                    policy.name, policy.stage
                )));
            }
        }
        for webhook in &self.webhooks {
            ensure_identifier("webhooks[].key", &webhook.key)?;
            ensure_identifier("webhooks[].dispatch_event", &webhook.dispatch_event)?;
        }
        Ok(())
    }

    /// `bookverse-DEV` style name for a blueprint stage.
    pub fn stage_name(&self, stage: &str) -> String {
        format!("{}-{}", self.project.key, stage)
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|stage| self.stage_name(stage)).collect()
    }

    pub fn repositories(&self) -> Vec<RepositoryPlan> {
        let mut repos = Vec::new();
        for service in &self.services {
            for package in &service.packages {
                for (suffix, environment) in [("nonprod", "DEV"), ("release", "PROD")] {
                    repos.push(RepositoryPlan {
                        key: repository_key(&self.project.key, &service.name, *package, suffix),
                        service: service.name.clone(),
                        package: *package,
                        environment,
                    });
                }
            }
        }
        repos
    }

    pub fn nonprod_repository(&self, service: &str, package: PackageKind) -> String {
        repository_key(&self.project.key, service, package, "nonprod")
    }

    pub fn oidc_integration_name(&self, service: &str) -> String {
        format!("{}-{}-github", self.project.key, service)
    }

    pub fn identity_mapping_name(&self, service: &str) -> String {
        format!("{}-{}", self.project.key, service)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|service| service.name == name)
    }

    /// Service whose application key is `app_key`.
    pub fn service_for_app(&self, app_key: &str) -> Option<&ServiceSpec> {
        self.services
            .iter()
            .find(|service| service.application.key == app_key)
    }

    /// GitHub organisation, preferring an explicit override.
    pub fn github_org<'a>(&'a self, override_org: Option<&'a str>) -> &'a str {
        override_org
            .map(str::trim)
            .filter(|org| !org.is_empty())
            .unwrap_or(self.github.org.as_str())
    }
}

fn repository_key(project: &str, service: &str, package: PackageKind, suffix: &str) -> String {
    format!(
        "{project}-{service}-internal-{}-{suffix}-local",
        package.as_str()
    )
}

pub(crate) fn ensure_non_empty(field: &str, value: &str) -> Result<(), BlueprintError> {
    if value.trim().is_empty() {
        return Err(BlueprintError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn ensure_no_control_chars(field: &str, value: &str) -> Result<(), BlueprintError> {
    if value.chars().any(is_disallowed_control) {
        return Err(BlueprintError::Validation(format!(
            "{field} contains control characters"
        )));
    }
    Ok(())
}

fn ensure_identifier(field: &str, value: &str) -> Result<(), BlueprintError> {
    ensure_non_empty(field, value)?;
    ensure_no_control_chars(field, value)?;
    if value.contains(PROJECT_PLACEHOLDER) || value.chars().any(char::is_whitespace) {
        return Err(BlueprintError::Validation(format!(
            "{field} must be a single token, got {value:?}"
        )));
    }
    Ok(())
}

fn is_disallowed_control(ch: char) -> bool {
    (ch as u32) < 0x20 && ch != '\n' && ch != '\r'
}
