use std::collections::BTreeMap;

use serde_json::{Value, json};

pub const BUILT_IN_ROLES: [&str; 7] = [
    "Developer",
    "Contributor",
    "Viewer",
    "Release Manager",
    "Security Manager",
    "Application Admin",
    "Project Admin",
];

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    /// Decoded path plus the raw query, e.g. `/access/api/v2/stages?project_key=bookverse`.
    pub path: String,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn is(&self, method: &str, path_prefix: &str) -> bool {
        self.method == method && self.path.starts_with(path_prefix)
    }
}

/// Which collection answers identity mapping listing and deletion.
/// Creation always goes through `/oidc/{provider}/identity_mappings`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MappingApi {
    /// `/access/api/v1/oidc/{provider}/mappings`
    #[default]
    ProviderMappings,
    /// `/access/api/v1/oidc/{provider}/identity-mappings`
    ProviderIdentityMappings,
    /// `/access/api/v1/identity-mappings?provider=...`
    GlobalHyphen,
    /// `/access/api/v1/identity_mappings?provider=...`
    GlobalUnderscore,
}

impl MappingApi {
    pub(crate) fn provider_collection(self) -> Option<&'static str> {
        match self {
            MappingApi::ProviderMappings => Some("mappings"),
            MappingApi::ProviderIdentityMappings => Some("identity-mappings"),
            _ => None,
        }
    }

    pub(crate) fn global_collection(self) -> Option<&'static str> {
        match self {
            MappingApi::GlobalHyphen => Some("identity-mappings"),
            MappingApi::GlobalUnderscore => Some("identity_mappings"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Fault {
    pub method: String,
    pub path_prefix: String,
    pub status: u16,
    pub remaining: u32,
}

/// In-memory platform contents. Tests seed it before running a flow and
/// inspect it afterwards.
#[derive(Debug, Default)]
pub struct PlatformState {
    pub projects: BTreeMap<String, Value>,
    pub stages: BTreeMap<String, Value>,
    pub lifecycles: BTreeMap<String, Vec<String>>,
    pub users: BTreeMap<String, Value>,
    pub members: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub roles: BTreeMap<String, Vec<Value>>,
    pub oidc: BTreeMap<String, Value>,
    pub mappings: BTreeMap<String, Vec<Value>>,
    pub mapping_api: MappingApi,
    pub repositories: BTreeMap<String, Value>,
    pub builds: BTreeMap<String, Vec<String>>,
    pub applications: BTreeMap<String, Value>,
    /// Oldest first.
    pub versions: BTreeMap<String, Vec<Value>>,
    pub contents: BTreeMap<(String, String), Value>,
    pub promotions: BTreeMap<(String, String), Value>,
    pub trusted_keys: Vec<Value>,
    pub rules: Vec<Value>,
    pub policies: Vec<Value>,
    pub subscriptions: Vec<Value>,
    pub docker_tags: BTreeMap<(String, String), Vec<String>>,
    pub files: BTreeMap<String, Vec<Value>>,
    pub dispatches: Vec<Value>,
    pub requests: Vec<RecordedRequest>,
    pub(crate) faults: Vec<Fault>,
    pub(crate) next_id: u64,
}

impl PlatformState {
    pub fn add_project(&mut self, key: &str) -> &mut Self {
        self.projects.insert(
            key.to_string(),
            json!({"project_key": key, "display_name": key}),
        );
        self.roles.entry(key.to_string()).or_insert_with(|| {
            BUILT_IN_ROLES
                .iter()
                .map(|name| json!({"name": name, "type": "PREDEFINED"}))
                .collect()
        });
        self
    }

    pub fn add_role(&mut self, project: &str, name: &str) -> &mut Self {
        self.roles
            .entry(project.to_string())
            .or_default()
            .push(json!({"name": name, "type": "CUSTOM", "environments": ["DEV"], "actions": []}));
        self
    }

    pub fn add_stage(&mut self, project: &str, name: &str) -> &mut Self {
        self.stages.insert(
            name.to_string(),
            json!({"name": name, "scope": "project", "project_key": project, "category": "promote"}),
        );
        self
    }

    pub fn set_lifecycle(&mut self, project: &str, stages: &[&str]) -> &mut Self {
        self.lifecycles.insert(
            project.to_string(),
            stages.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn add_user(&mut self, username: &str, email: &str, admin: bool) -> &mut Self {
        self.users.insert(
            username.to_string(),
            json!({"username": username, "email": email, "admin": admin, "realm": "internal"}),
        );
        self
    }

    pub fn add_member(&mut self, project: &str, username: &str, roles: &[&str]) -> &mut Self {
        self.members.entry(project.to_string()).or_default().insert(
            username.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn add_oidc(&mut self, name: &str, projects: &[&str]) -> &mut Self {
        self.oidc.insert(
            name.to_string(),
            json!({
                "name": name,
                "issuer_url": "https://token.actions.githubusercontent.com",
                "provider_type": "GitHub",
                "projects": projects,
            }),
        );
        self
    }

    pub fn add_mapping(&mut self, provider: &str, mapping: Value) -> &mut Self {
        self.mappings
            .entry(provider.to_string())
            .or_default()
            .push(mapping);
        self
    }

    pub fn serve_mappings_at(&mut self, api: MappingApi) -> &mut Self {
        self.mapping_api = api;
        self
    }

    pub fn add_repository(&mut self, key: &str, project: &str, package_type: &str) -> &mut Self {
        self.repositories.insert(
            key.to_string(),
            json!({"key": key, "type": "LOCAL", "packageType": package_type, "projectKey": project}),
        );
        self
    }

    pub fn add_build(&mut self, project: &str, name: &str) -> &mut Self {
        self.builds
            .entry(project.to_string())
            .or_default()
            .push(name.to_string());
        self
    }

    pub fn add_application(&mut self, key: &str, project: &str) -> &mut Self {
        self.applications.insert(
            key.to_string(),
            json!({"application_key": key, "application_name": key, "project_key": project}),
        );
        self
    }

    /// Appends a version; later calls are newer.
    pub fn add_version(&mut self, app: &str, version: &str, tag: &str, status: &str) -> &mut Self {
        self.add_version_value(
            app,
            json!({"version": version, "tag": tag, "release_status": status, "properties": {}}),
        )
    }

    pub fn add_version_value(&mut self, app: &str, value: Value) -> &mut Self {
        self.versions.entry(app.to_string()).or_default().push(value);
        self
    }

    pub fn set_content(&mut self, app: &str, version: &str, content: Value) -> &mut Self {
        self.contents
            .insert((app.to_string(), version.to_string()), content);
        self
    }

    pub fn add_docker_tags(&mut self, repo: &str, image: &str, tags: &[&str]) -> &mut Self {
        self.docker_tags.insert(
            (repo.to_string(), image.to_string()),
            tags.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn add_file(&mut self, repo: &str, path: &str, name: &str) -> &mut Self {
        self.files
            .entry(repo.to_string())
            .or_default()
            .push(json!({"repo": repo, "path": path, "name": name}));
        self
    }

    pub fn add_trusted_key(&mut self, alias: &str) -> &mut Self {
        self.next_id += 1;
        self.trusted_keys
            .push(json!({"kid": format!("kid-{}", self.next_id), "alias": alias}));
        self
    }

    pub fn version(&self, app: &str, version: &str) -> Option<&Value> {
        self.versions
            .get(app)?
            .iter()
            .find(|v| v["version"] == version)
    }

    pub fn tag_of(&self, app: &str, version: &str) -> Option<String> {
        self.version(app, version)
            .and_then(|v| v["tag"].as_str())
            .map(str::to_string)
    }

    pub fn count(&self, method: &str, path_prefix: &str) -> usize {
        self.requests
            .iter()
            .filter(|r| r.is(method, path_prefix))
            .count()
    }

    /// Answers the next `times` matching requests with `status`.
    pub fn fail(&mut self, method: &str, path_prefix: &str, status: u16, times: u32) -> &mut Self {
        self.faults.push(Fault {
            method: method.to_string(),
            path_prefix: path_prefix.to_string(),
            status,
            remaining: times,
        });
        self
    }

    pub(crate) fn take_fault(&mut self, method: &str, path: &str) -> Option<u16> {
        let fault = self.faults.iter_mut().find(|f| {
            f.remaining > 0 && f.method == method && path.starts_with(&f.path_prefix)
        })?;
        fault.remaining -= 1;
        Some(fault.status)
    }

    pub(crate) fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}
