//! OIDC integrations and their identity mappings.
//!
//! Mapping endpoints differ between platform versions, so listing and
//! deletion try the provider-scoped collections first and then the global
//! collections filtered by provider.

use bvo_core::models::OidcIntegration;
use serde::Serialize;
use serde_json::Value;

use crate::client::{ApiResponse, JfrogClient, JfrogError, seg};

const OIDC: &str = "/access/api/v1/oidc";
pub const GITHUB_ISSUER: &str = "https://token.actions.githubusercontent.com";

const CREATE_COLLECTION: &str = "identity_mappings";
const PROVIDER_COLLECTIONS: [&str; 2] = ["mappings", "identity-mappings"];
const GLOBAL_COLLECTIONS: [&str; 2] = [
    "/access/api/v1/identity-mappings",
    "/access/api/v1/identity_mappings",
];

fn mapping_list_paths(provider: &str) -> impl Iterator<Item = String> {
    let provider = seg(provider);
    let scoped: Vec<String> = PROVIDER_COLLECTIONS
        .into_iter()
        .map(|collection| format!("{OIDC}/{provider}/{collection}"))
        .collect();
    let global = GLOBAL_COLLECTIONS
        .into_iter()
        .map(move |collection| format!("{collection}?provider={provider}"));
    scoped.into_iter().chain(global)
}

fn mapping_delete_paths(provider: &str, id: &str) -> impl Iterator<Item = String> {
    let provider = seg(provider);
    let id = seg(id);
    let scoped: Vec<String> = PROVIDER_COLLECTIONS
        .into_iter()
        .map(|collection| format!("{OIDC}/{provider}/{collection}/{id}"))
        .collect();
    let global = GLOBAL_COLLECTIONS
        .into_iter()
        .map(move |collection| format!("{collection}/{id}?provider={provider}"));
    scoped.into_iter().chain(global)
}

#[derive(Clone, Debug, Serialize)]
pub struct NewIntegration<'a> {
    pub name: &'a str,
    pub issuer_url: &'a str,
    pub provider_type: &'a str,
    pub description: String,
    pub projects: Vec<String>,
    pub audience: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewIdentityMapping {
    pub name: String,
    pub description: String,
    pub priority: u32,
    pub claims: Value,
    pub token_spec: Value,
}

/// One mapping as returned by the platform, kept as raw JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityMapping {
    pub provider: String,
    pub raw: Value,
}

impl IdentityMapping {
    /// `id`, `_id` or `name`, whichever is present first.
    pub fn identifier(&self) -> Option<String> {
        ["id", "_id", "name"].iter().find_map(|field| {
            match self.raw.get(*field) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        })
    }

    /// True when any string inside the mapping mentions `project`.
    pub fn references(&self, project: &str) -> bool {
        contains_reference(&self.raw, &project.to_ascii_lowercase())
    }
}

fn contains_reference(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_ascii_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|item| contains_reference(item, needle)),
        Value::Object(map) => map.values().any(|item| contains_reference(item, needle)),
        _ => false,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MappingDeletion {
    Deleted { path: String },
    /// Every candidate endpoint answered 404 or 405.
    Unsupported,
    Failed { path: String, status: u16, body: String },
    MissingIdentifier,
}

impl JfrogClient {
    pub async fn list_oidc_integrations(&self) -> Result<Vec<OidcIntegration>, JfrogError> {
        let value: Value = self.get_json(OIDC).await?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("integrations") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter_map(|mut item| {
                if item.get("name").is_none() {
                    let alt = item.get("provider_name").cloned()?;
                    item.as_object_mut()?.insert("name".into(), alt);
                }
                serde_json::from_value(item).ok()
            })
            .collect())
    }

    pub async fn create_oidc_integration(
        &self,
        integration: &NewIntegration<'_>,
    ) -> Result<ApiResponse, JfrogError> {
        self.post_json(OIDC, integration).await
    }

    pub async fn delete_oidc_integration(&self, name: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{OIDC}/{}", seg(name))).await
    }

    pub async fn create_identity_mapping(
        &self,
        provider: &str,
        mapping: &NewIdentityMapping,
    ) -> Result<ApiResponse, JfrogError> {
        self.post_json(
            &format!("{OIDC}/{}/{CREATE_COLLECTION}", seg(provider)),
            mapping,
        )
        .await
    }

    /// Mappings of `provider` from the first collection endpoint that
    /// answers with a list. Missing endpoints yield an empty list.
    pub async fn list_identity_mappings(
        &self,
        provider: &str,
    ) -> Result<Vec<IdentityMapping>, JfrogError> {
        for path in mapping_list_paths(provider) {
            let response = self.get(&path).await?;
            if !response.is_success() {
                continue;
            }
            let items = match response.value() {
                Value::Array(items) => items,
                Value::Object(mut map) => match map.remove("mappings") {
                    Some(Value::Array(items)) => items,
                    _ => continue,
                },
                _ => continue,
            };
            return Ok(items
                .into_iter()
                .map(|raw| IdentityMapping {
                    provider: provider.to_string(),
                    raw,
                })
                .collect());
        }
        Ok(Vec::new())
    }

    pub async fn delete_identity_mapping(
        &self,
        mapping: &IdentityMapping,
    ) -> Result<MappingDeletion, JfrogError> {
        let Some(id) = mapping.identifier() else {
            return Ok(MappingDeletion::MissingIdentifier);
        };
        for path in mapping_delete_paths(&mapping.provider, &id) {
            let response = self.delete(&path).await?;
            if response.is_success() {
                return Ok(MappingDeletion::Deleted { path });
            }
            if matches!(response.status, 404 | 405) {
                continue;
            }
            return Ok(MappingDeletion::Failed {
                path,
                status: response.status,
                body: response.body,
            });
        }
        Ok(MappingDeletion::Unsupported)
    }
}
