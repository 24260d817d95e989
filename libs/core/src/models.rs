//! Shapes of the platform entities the tools read. Only the fields the flows
//! look at are modelled; unknown fields are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const RELEASED: &str = "RELEASED";
pub const TRUSTED_RELEASE: &str = "TRUSTED_RELEASE";
pub const PRE_RELEASE: &str = "PRE_RELEASE";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppVersion {
    #[serde(alias = "name")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl AppVersion {
    pub fn new(version: &str, tag: &str, release_status: &str) -> Self {
        Self {
            version: version.to_string(),
            tag: tag.to_string(),
            release_status: release_status.to_string(),
            ..Self::default()
        }
    }

    /// Released to production, trusted or not.
    pub fn is_prod(&self) -> bool {
        let status = self.release_status.to_ascii_uppercase();
        status == RELEASED || status == TRUSTED_RELEASE
    }

    pub fn is_trusted(&self) -> bool {
        self.release_status.eq_ignore_ascii_case(TRUSTED_RELEASE)
    }
}

/// Version listings come back under one of several envelope keys.
pub fn extract_versions(payload: &Value) -> Vec<AppVersion> {
    let items = match payload {
        Value::Array(items) => items.clone(),
        Value::Object(map) => ["versions", "results", "items", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(version) => Some(AppVersion {
                version,
                ..AppVersion::default()
            }),
            other => serde_json::from_value(other).ok(),
        })
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(alias = "key")]
    pub application_key: String,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub project_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub key: String,
    #[serde(default, rename = "type")]
    pub repo_type: Option<String>,
    #[serde(default, rename = "packageType")]
    pub package_type: Option<String>,
    #[serde(default, rename = "projectKey")]
    pub project_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub project_key: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub promote_stages: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OidcIntegration {
    pub name: String,
    #[serde(default)]
    pub issuer_url: Option<String>,
    #[serde(default)]
    pub provider_type: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub role_type: Option<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// `/<build name>` as returned by the build listing.
    pub uri: String,
    #[serde(default, rename = "lastStarted")]
    pub last_started: Option<String>,
}

impl BuildSummary {
    pub fn name(&self) -> String {
        let raw = self.uri.trim_start_matches('/');
        urlencoding::decode(raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustedKey {
    #[serde(default)]
    pub kid: Option<String>,
    pub alias: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub realm: Option<String>,
}

impl PlatformUser {
    /// Non-admin user whose email belongs to `domain`.
    pub fn in_domain(&self, domain: &str) -> bool {
        let domain = domain.trim().trim_start_matches('@').to_ascii_lowercase();
        if domain.is_empty() || self.admin {
            return false;
        }
        self.email
            .as_deref()
            .map(|email| email.to_ascii_lowercase().ends_with(&format!("@{domain}")))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn versions_from_any_envelope() {
        let payload = json!({"results": [{"version": "1.0.0", "tag": null, "release_status": "RELEASED"}]});
        let versions = extract_versions(&payload);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].tag, "");
        assert!(versions[0].is_prod());

        let payload = json!({"items": [{"name": "2.0.0"}], "versions": []});
        assert_eq!(extract_versions(&payload)[0].version, "2.0.0");
        assert_eq!(extract_versions(&json!(["3.0.0"]))[0].version, "3.0.0");
        assert!(extract_versions(&json!("nope")).is_empty());
    }

    #[test]
    fn prod_statuses() {
        assert!(AppVersion::new("1.0.0", "", "trusted_release").is_prod());
        assert!(!AppVersion::new("1.0.0", "", PRE_RELEASE).is_prod());
    }

    #[test]
    fn build_name_is_decoded() {
        let build = BuildSummary {
            uri: "/bookverse-web%20ci".into(),
            last_started: None,
        };
        assert_eq!(build.name(), "bookverse-web ci");
    }

    #[test]
    fn domain_users_exclude_admins() {
        let mut user = PlatformUser {
            username: "alice".into(),
            email: Some("Alice@BookVerse.com".into()),
            admin: false,
            realm: None,
        };
        assert!(user.in_domain("bookverse.com"));
        assert!(user.in_domain("@bookverse.com"));
        assert!(!user.in_domain("verse.com"));
        user.admin = true;
        assert!(!user.in_domain("bookverse.com"));
    }
}
