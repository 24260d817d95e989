use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::state::{PlatformState, RecordedRequest};

type Shared = Arc<Mutex<PlatformState>>;

static AQL_REPO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""repo"\s*:\s*"([^"]+)""#).expect("valid regex"));

/// Local HTTP server that behaves like the subset of the JFrog Platform and
/// GitHub REST API the BookVerse tools talk to.
pub struct MockPlatform {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockPlatform {
    /// Binds an ephemeral localhost port. Returns `None` when the sandbox
    /// does not allow listening sockets so callers can skip.
    pub async fn start() -> Option<Self> {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(err) => {
                eprintln!("mock platform unavailable: {err}");
                return None;
            }
        };
        let addr = listener.local_addr().ok()?;
        let state: Shared = Arc::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let server = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app.into_make_service()).await {
                eprintln!("mock platform server error: {err}");
            }
        });
        Some(Self {
            addr,
            state,
            server,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.server.abort();
    }
}

enum Reply {
    Json(u16, Value),
    Empty(u16),
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(status, body) => (
                status_code(status),
                [(header::CONTENT_TYPE, "application/json")],
                body.to_string(),
            )
                .into_response(),
            Reply::Empty(status) => status_code(status).into_response(),
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error(status: u16, message: &str) -> Reply {
    Reply::Json(
        status,
        json!({ "errors": [{ "status": status, "message": message }] }),
    )
}

fn not_found() -> Reply {
    error(404, "Not Found")
}

async fn handle(State(state): State<Shared>, method: Method, uri: Uri, body: Bytes) -> Reply {
    let raw_path = uri.path();
    let segments: Vec<String> = raw_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let text = String::from_utf8_lossy(&body).into_owned();
    let json_body = serde_json::from_str::<Value>(&text).ok();

    let mut recorded = format!("/{}", segments.join("/"));
    if let Some(q) = uri.query() {
        recorded.push('?');
        recorded.push_str(q);
    }

    let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    state.requests.push(RecordedRequest {
        method: method.as_str().to_string(),
        path: recorded.clone(),
        body: json_body.clone(),
    });
    if let Some(status) = state.take_fault(method.as_str(), &recorded) {
        return error(status, "injected failure");
    }

    let segs: Vec<&str> = segments.iter().map(String::as_str).collect();
    let request = Request {
        method: method.as_str(),
        query: &query,
        json: json_body.unwrap_or(Value::Null),
        text: &text,
    };
    route(&mut state, &segs, &request)
}

struct Request<'a> {
    method: &'a str,
    query: &'a HashMap<String, String>,
    json: Value,
    text: &'a str,
}

impl Request<'_> {
    fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn field(&self, name: &str) -> String {
        self.json
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

fn route(state: &mut PlatformState, segs: &[&str], req: &Request<'_>) -> Reply {
    match segs {
        ["access", "api", "v1", "projects", rest @ ..] => projects(state, rest, req),
        ["access", "api", "v2", "stages", rest @ ..] => stages(state, rest, req),
        ["access", "api", "v2", "lifecycle"] => lifecycle(state, req),
        ["access", "api", "v2", "users", rest @ ..] => users(state, rest, req),
        ["access", "api", "v1", "oidc", rest @ ..] => oidc(state, rest, req),
        ["access", "api", "v1", collection @ ("identity-mappings" | "identity_mappings"), rest @ ..] => {
            global_mappings(state, collection, rest, req)
        }
        ["artifactory", "api", "repositories", rest @ ..] => repositories(state, rest, req),
        ["artifactory", "api", "build", rest @ ..] => builds(state, rest, req),
        ["artifactory", "api", "search", "aql"] if req.method == "POST" => {
            let repo = AQL_REPO
                .captures(req.text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let results = state.files.get(&repo).cloned().unwrap_or_default();
            Reply::Json(200, json!({ "results": results }))
        }
        ["artifactory", "api", "docker", repo, "v2", image @ .., "tags", "list"]
            if req.method == "GET" =>
        {
            let image = image.join("/");
            match state.docker_tags.get(&(repo.to_string(), image.clone())) {
                Some(tags) => Reply::Json(200, json!({ "name": image, "tags": tags })),
                None => not_found(),
            }
        }
        ["artifactory", "api", "security", "keys", "trusted"] => trusted_keys(state, req),
        ["apptrust", "api", "v1", "applications", rest @ ..] => applications(state, rest, req),
        ["unifiedpolicy", "api", "v1", kind @ ("rules" | "policies"), rest @ ..] => {
            policies(state, kind, rest, req)
        }
        ["event", "api", "v1", "subscriptions", rest @ ..] => subscriptions(state, rest, req),
        ["repos", owner, repo, "dispatches"] if req.method == "POST" => {
            let mut dispatch = req.json.clone();
            if let Some(map) = dispatch.as_object_mut() {
                map.insert("repository".into(), json!(format!("{owner}/{repo}")));
            }
            state.dispatches.push(dispatch);
            Reply::Empty(204)
        }
        _ => not_found(),
    }
}

fn projects(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("POST", []) => {
            let key = req.field("project_key");
            if state.projects.contains_key(&key) {
                return error(409, &format!("Project '{key}' already exists"));
            }
            state.add_project(&key);
            state.projects.insert(key, req.json.clone());
            Reply::Json(201, req.json.clone())
        }
        ("GET", [key]) => match state.projects.get(*key) {
            Some(project) => Reply::Json(200, project.clone()),
            None => not_found(),
        },
        ("DELETE", [key]) => {
            if !state.projects.contains_key(*key) {
                return not_found();
            }
            let busy = state
                .repositories
                .values()
                .any(|r| r["projectKey"] == *key)
                || state
                    .applications
                    .values()
                    .any(|a| a["project_key"] == *key);
            if busy {
                return error(400, "Project still contains repositories or applications");
            }
            state.projects.remove(*key);
            state.roles.remove(*key);
            state.members.remove(*key);
            state.lifecycles.remove(*key);
            Reply::Empty(204)
        }
        ("GET", [key, "users"]) => match state.members.get(*key) {
            Some(members) => {
                let members: Vec<Value> = members
                    .iter()
                    .map(|(name, roles)| json!({ "name": name, "roles": roles }))
                    .collect();
                Reply::Json(200, json!({ "members": members }))
            }
            None if state.projects.contains_key(*key) => Reply::Json(200, json!({ "members": [] })),
            None => not_found(),
        },
        ("PUT", [key, "users", user]) => {
            if !state.projects.contains_key(*key) {
                return not_found();
            }
            let roles: Vec<&str> = req.json["roles"]
                .as_array()
                .map(|roles| roles.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            state.add_member(key, user, &roles);
            Reply::Json(200, req.json.clone())
        }
        ("DELETE", [key, "users", user]) => {
            match state.members.get_mut(*key).and_then(|m| m.remove(*user)) {
                Some(_) => Reply::Empty(204),
                None => not_found(),
            }
        }
        ("GET", [key, "roles"]) => match state.roles.get(*key) {
            Some(roles) => Reply::Json(200, Value::Array(roles.clone())),
            None => not_found(),
        },
        ("POST", [key, "roles"]) => {
            let Some(roles) = state.roles.get_mut(*key) else {
                return not_found();
            };
            let name = req.field("name");
            if roles.iter().any(|r| r["name"] == name.as_str()) {
                return error(409, &format!("Role '{name}' already exists"));
            }
            let mut role = req.json.clone();
            role["type"] = json!("CUSTOM");
            roles.push(role.clone());
            Reply::Json(201, role)
        }
        ("DELETE", [key, "roles", role]) => {
            let Some(roles) = state.roles.get_mut(*key) else {
                return not_found();
            };
            let Some(index) = roles.iter().position(|r| r["name"] == *role) else {
                return not_found();
            };
            if roles[index]["type"] == "PREDEFINED" {
                return error(400, "Predefined roles cannot be deleted");
            }
            roles.remove(index);
            Reply::Empty(204)
        }
        _ => not_found(),
    }
}

fn stages(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("POST", []) => {
            let name = req.field("name");
            if state.stages.contains_key(&name) {
                return error(409, &format!("Stage '{name}' already exists"));
            }
            state.stages.insert(name, req.json.clone());
            Reply::Json(201, req.json.clone())
        }
        ("GET", []) => {
            let project = req.query("project_key");
            let stages: Vec<Value> = state
                .stages
                .values()
                .filter(|s| project.is_none_or(|p| s["project_key"] == p))
                .cloned()
                .collect();
            Reply::Json(200, Value::Array(stages))
        }
        ("DELETE", [name]) => {
            if !state.stages.contains_key(*name) {
                return not_found();
            }
            if state
                .lifecycles
                .values()
                .any(|stages| stages.iter().any(|s| s == name))
            {
                return error(409, "Stage is part of a lifecycle");
            }
            state.stages.remove(*name);
            Reply::Empty(204)
        }
        _ => not_found(),
    }
}

fn lifecycle(state: &mut PlatformState, req: &Request<'_>) -> Reply {
    let project = req.query("project_key").unwrap_or_default().to_string();
    match req.method {
        "GET" => {
            let stages = state.lifecycles.get(&project).cloned().unwrap_or_default();
            Reply::Json(200, json!({ "promote_stages": stages }))
        }
        "PATCH" => {
            let stages: Vec<String> = req.json["promote_stages"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            state.lifecycles.insert(project, stages.clone());
            Reply::Json(200, json!({ "promote_stages": stages }))
        }
        _ => not_found(),
    }
}

fn users(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("GET", []) => {
            let users: Vec<Value> = state
                .users
                .keys()
                .map(|u| json!({ "username": u }))
                .collect();
            Reply::Json(200, json!({ "users": users }))
        }
        ("POST", []) => {
            let username = req.field("username");
            if state.users.contains_key(&username) {
                return error(409, &format!("User '{username}' already exists"));
            }
            let mut user = req.json.clone();
            if let Some(map) = user.as_object_mut() {
                map.remove("password");
                map.insert("realm".into(), json!("internal"));
            }
            state.users.insert(username, user.clone());
            Reply::Json(201, user)
        }
        ("GET", [name]) => match state.users.get(*name) {
            Some(user) => Reply::Json(200, user.clone()),
            None => not_found(),
        },
        ("DELETE", [name]) => match state.users.remove(*name) {
            Some(_) => Reply::Empty(204),
            None => not_found(),
        },
        _ => not_found(),
    }
}

fn oidc(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("GET", []) => Reply::Json(200, Value::Array(state.oidc.values().cloned().collect())),
        ("POST", []) => {
            let name = req.field("name");
            if state.oidc.contains_key(&name) {
                return error(409, &format!("Integration '{name}' already exists"));
            }
            state.oidc.insert(name, req.json.clone());
            Reply::Json(201, req.json.clone())
        }
        ("DELETE", [name]) => match state.oidc.remove(*name) {
            Some(_) => {
                state.mappings.remove(*name);
                Reply::Empty(204)
            }
            None => not_found(),
        },
        ("GET", [provider, collection])
            if state.mapping_api.provider_collection() == Some(*collection) =>
        {
            if !state.oidc.contains_key(*provider) {
                return not_found();
            }
            let mappings = state.mappings.get(*provider).cloned().unwrap_or_default();
            Reply::Json(200, Value::Array(mappings))
        }
        ("POST", [provider, "identity_mappings"]) => {
            if !state.oidc.contains_key(*provider) {
                return not_found();
            }
            let name = req.field("name");
            let mappings = state.mappings.entry(provider.to_string()).or_default();
            if mappings.iter().any(|m| m["name"] == name.as_str()) {
                return error(409, &format!("Identity mapping '{name}' already exists"));
            }
            mappings.push(req.json.clone());
            Reply::Json(201, req.json.clone())
        }
        ("DELETE", [provider, collection, id])
            if state.mapping_api.provider_collection() == Some(*collection) =>
        {
            remove_mapping(state, Some(*provider), id)
        }
        _ => not_found(),
    }
}

/// `/access/api/v1/{identity-mappings|identity_mappings}` filtered by the
/// `provider` query parameter.
fn global_mappings(
    state: &mut PlatformState,
    collection: &str,
    rest: &[&str],
    req: &Request<'_>,
) -> Reply {
    if state.mapping_api.global_collection() != Some(collection) {
        return not_found();
    }
    let provider = req.query("provider");
    match (req.method, rest) {
        ("GET", []) => {
            let mappings: Vec<Value> = state
                .mappings
                .iter()
                .filter(|(name, _)| provider.is_none_or(|p| p == name.as_str()))
                .flat_map(|(_, items)| items.iter().cloned())
                .collect();
            Reply::Json(200, json!({ "mappings": mappings }))
        }
        ("DELETE", [id]) => remove_mapping(state, provider, id),
        _ => not_found(),
    }
}

fn remove_mapping(state: &mut PlatformState, provider: Option<&str>, id: &str) -> Reply {
    let mut removed = false;
    for (name, mappings) in state.mappings.iter_mut() {
        if provider.is_some_and(|p| p != name.as_str()) {
            continue;
        }
        let before = mappings.len();
        mappings.retain(|m| {
            !["id", "_id", "name"].iter().any(|field| match &m[*field] {
                Value::String(s) => s == id,
                Value::Number(n) => n.to_string() == id,
                _ => false,
            })
        });
        removed |= mappings.len() != before;
    }
    if removed { Reply::Empty(204) } else { not_found() }
}

fn repositories(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("GET", []) => {
            let project = req.query("project");
            let repos: Vec<Value> = state
                .repositories
                .values()
                .filter(|r| project.is_none_or(|p| r["projectKey"] == p))
                .cloned()
                .collect();
            Reply::Json(200, Value::Array(repos))
        }
        ("PUT", [key]) => {
            if state.repositories.contains_key(*key) {
                return error(
                    400,
                    &format!("Case insensitive repository key already exists: '{key}'"),
                );
            }
            let package_type = req.field("packageType");
            let project = req.field("projectKey");
            state.add_repository(key, &project, &package_type);
            Reply::Json(200, json!(format!("Successfully created repository '{key}'")))
        }
        ("DELETE", [key]) => match state.repositories.remove(*key) {
            Some(_) => {
                state.files.remove(*key);
                Reply::Json(200, json!(format!("Repository '{key}' and all its content have been removed successfully.")))
            }
            None => not_found(),
        },
        _ => not_found(),
    }
}

fn builds(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("GET", []) => {
            let project = req.query("project").unwrap_or_default();
            match state.builds.get(project).filter(|b| !b.is_empty()) {
                Some(builds) => {
                    let builds: Vec<Value> = builds
                        .iter()
                        .map(|name| {
                            json!({
                                "uri": format!("/{}", urlencoding::encode(name)),
                                "lastStarted": "2024-05-01T10:00:00.000+0000",
                            })
                        })
                        .collect();
                    Reply::Json(200, json!({ "builds": builds }))
                }
                None => error(404, "No builds were found"),
            }
        }
        ("POST", ["delete"]) => {
            let project = req.field("project");
            let name = req.field("buildName");
            let Some(builds) = state.builds.get_mut(&project) else {
                return not_found();
            };
            let before = builds.len();
            builds.retain(|b| *b != name);
            if builds.len() == before {
                not_found()
            } else {
                Reply::Json(200, json!(format!("Deleted build '{name}'")))
            }
        }
        _ => not_found(),
    }
}

fn trusted_keys(state: &mut PlatformState, req: &Request<'_>) -> Reply {
    match req.method {
        "GET" => Reply::Json(200, json!({ "keys": state.trusted_keys })),
        "POST" => {
            let alias = req.field("alias");
            if state.trusted_keys.iter().any(|k| k["alias"] == alias.as_str()) {
                return error(409, &format!("Key with alias '{alias}' already exists"));
            }
            let kid = format!("kid-{}", state.allocate_id());
            let key = json!({ "kid": kid, "alias": alias, "fingerprint": "00:11:22" });
            state.trusted_keys.push(key.clone());
            Reply::Json(201, key)
        }
        _ => not_found(),
    }
}

fn applications(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("GET", []) => {
            let project = req.query("project_key");
            let apps: Vec<Value> = state
                .applications
                .values()
                .filter(|a| project.is_none_or(|p| a["project_key"] == p))
                .cloned()
                .collect();
            Reply::Json(200, Value::Array(apps))
        }
        ("POST", []) => {
            let key = req.field("application_key");
            if state.applications.contains_key(&key) {
                return error(409, &format!("Application '{key}' already exists"));
            }
            state.applications.insert(key, req.json.clone());
            Reply::Json(201, req.json.clone())
        }
        ("GET", [key]) => match state.applications.get(*key) {
            Some(app) => Reply::Json(200, app.clone()),
            None => not_found(),
        },
        ("DELETE", [key]) => {
            if !state.applications.contains_key(*key) {
                return not_found();
            }
            if state.versions.get(*key).is_some_and(|v| !v.is_empty()) {
                return error(400, "Application has versions; delete them first");
            }
            state.applications.remove(*key);
            state.versions.remove(*key);
            Reply::Empty(204)
        }
        ("GET", [key, "versions"]) => {
            if !state.applications.contains_key(*key) {
                return not_found();
            }
            let limit = req
                .query("limit")
                .and_then(|l| l.parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            let all = state.versions.get(*key).cloned().unwrap_or_default();
            let total = all.len();
            let newest_first: Vec<Value> = all.into_iter().rev().take(limit).collect();
            Reply::Json(200, json!({ "versions": newest_first, "total": total }))
        }
        (method, [key, "versions", version, tail @ ..]) => {
            version_route(state, method, key, version, tail, req)
        }
        _ => not_found(),
    }
}

fn version_route(
    state: &mut PlatformState,
    method: &str,
    app: &str,
    version: &str,
    tail: &[&str],
    req: &Request<'_>,
) -> Reply {
    let key = (app.to_string(), version.to_string());
    let Some(versions) = state.versions.get_mut(app) else {
        return not_found();
    };
    let Some(index) = versions.iter().position(|v| v["version"] == version) else {
        return not_found();
    };
    match (method, tail) {
        ("GET", []) => Reply::Json(200, versions[index].clone()),
        ("PATCH", []) => {
            let entry = &mut versions[index];
            if let Some(tag) = req.json.get("tag") {
                entry["tag"] = tag.clone();
            }
            if let Some(Value::Object(props)) = req.json.get("properties") {
                if !entry["properties"].is_object() {
                    entry["properties"] = Value::Object(Map::new());
                }
                if let Some(existing) = entry["properties"].as_object_mut() {
                    for (k, v) in props {
                        existing.insert(k.clone(), v.clone());
                    }
                }
            }
            if let Some(Value::Array(removed)) = req.json.get("delete_properties") {
                if let Some(existing) = entry["properties"].as_object_mut() {
                    for name in removed.iter().filter_map(Value::as_str) {
                        existing.remove(name);
                    }
                }
            }
            Reply::Json(200, entry.clone())
        }
        ("DELETE", []) => {
            versions.remove(index);
            state.contents.remove(&key);
            state.promotions.remove(&key);
            Reply::Empty(204)
        }
        ("GET", ["content"]) => {
            let content = state
                .contents
                .get(&key)
                .cloned()
                .unwrap_or_else(|| json!({ "version": version, "artifacts": [], "releasables": [] }));
            Reply::Json(200, content)
        }
        ("GET", ["promotions"]) => {
            let promotions = state
                .promotions
                .get(&key)
                .cloned()
                .unwrap_or_else(|| json!({ "promotions": [] }));
            Reply::Json(200, promotions)
        }
        _ => not_found(),
    }
}

fn policies(state: &mut PlatformState, kind: &str, rest: &[&str], req: &Request<'_>) -> Reply {
    let is_rules = kind == "rules";
    match (req.method, rest) {
        ("GET", []) => {
            let project = req.query("project_key");
            let items: Vec<Value> = if is_rules {
                state.rules.clone()
            } else {
                state
                    .policies
                    .iter()
                    .filter(|p| {
                        project.is_none_or(|project| {
                            p["scope"]["project_keys"]
                                .as_array()
                                .is_some_and(|keys| keys.iter().any(|k| k == project))
                        })
                    })
                    .cloned()
                    .collect()
            };
            Reply::Json(200, json!({ "items": items }))
        }
        ("POST", []) => {
            let name = req.field("name");
            let exists = if is_rules {
                state.rules.iter().any(|r| r["name"] == name.as_str())
            } else {
                state.policies.iter().any(|p| p["name"] == name.as_str())
            };
            if exists {
                return error(409, &format!("'{name}' already exists"));
            }
            let id: u64 = state.allocate_id().parse().unwrap_or_default();
            let mut item = req.json.clone();
            item["id"] = json!(id);
            if is_rules {
                state.rules.push(item.clone());
            } else {
                state.policies.push(item.clone());
            }
            Reply::Json(201, item)
        }
        ("DELETE", [id]) => {
            let list = if is_rules {
                &mut state.rules
            } else {
                &mut state.policies
            };
            let before = list.len();
            list.retain(|item| item["id"].to_string().trim_matches('"') != *id);
            if list.len() == before {
                not_found()
            } else {
                Reply::Empty(204)
            }
        }
        _ => not_found(),
    }
}

fn subscriptions(state: &mut PlatformState, rest: &[&str], req: &Request<'_>) -> Reply {
    match (req.method, rest) {
        ("GET", []) => Reply::Json(200, Value::Array(state.subscriptions.clone())),
        ("POST", []) => {
            let key = req.field("key");
            if state.subscriptions.iter().any(|s| s["key"] == key.as_str()) {
                return error(409, &format!("Subscription '{key}' already exists"));
            }
            state.subscriptions.push(req.json.clone());
            Reply::Json(201, req.json.clone())
        }
        ("DELETE", [key]) => {
            let before = state.subscriptions.len();
            state.subscriptions.retain(|s| s["key"] != *key);
            if state.subscriptions.len() == before {
                not_found()
            } else {
                Reply::Empty(204)
            }
        }
        _ => not_found(),
    }
}
