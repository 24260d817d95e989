use std::collections::BTreeMap;

use async_trait::async_trait;
use bvo_core::models::{AppVersion, Application, extract_versions};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::client::{ApiResponse, JfrogClient, JfrogError, expect_success, seg};

const APPLICATIONS: &str = "/apptrust/api/v1/applications";
pub const ALL_VERSIONS_LIMIT: u32 = 1000;

#[derive(Clone, Debug, Serialize)]
pub struct NewApplication<'a> {
    pub application_key: &'a str,
    pub application_name: &'a str,
    pub project_key: &'a str,
    pub description: &'a str,
    pub criticality: &'a str,
    pub maturity_level: &'a str,
}

/// Partial update of an application version.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VersionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_properties: Option<Vec<String>>,
}

impl VersionPatch {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: &str, values: Vec<String>) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), values);
        self
    }
}

/// Read/patch access to application versions.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Versions newest first.
    async fn list_versions(&self, app_key: &str, limit: u32)
    -> Result<Vec<AppVersion>, JfrogError>;

    async fn patch_version(
        &self,
        app_key: &str,
        version: &str,
        patch: &VersionPatch,
    ) -> Result<(), JfrogError>;
}

#[async_trait]
impl VersionStore for JfrogClient {
    async fn list_versions(
        &self,
        app_key: &str,
        limit: u32,
    ) -> Result<Vec<AppVersion>, JfrogError> {
        let value = self.list_versions_raw(app_key, limit).await?;
        Ok(extract_versions(&value))
    }

    async fn patch_version(
        &self,
        app_key: &str,
        version: &str,
        patch: &VersionPatch,
    ) -> Result<(), JfrogError> {
        let path = version_path(app_key, version);
        let response = self.patch_json(&path, patch).await?;
        expect_success(Method::PATCH, &path, response).map(|_| ())
    }
}

fn version_path(app_key: &str, version: &str) -> String {
    format!("{APPLICATIONS}/{}/versions/{}", seg(app_key), seg(version))
}

impl JfrogClient {
    pub async fn create_application(
        &self,
        app: &NewApplication<'_>,
    ) -> Result<ApiResponse, JfrogError> {
        self.post_json(APPLICATIONS, app).await
    }

    pub async fn list_applications(&self, project: &str) -> Result<Vec<Application>, JfrogError> {
        let value: Value = self
            .get_json(&format!("{APPLICATIONS}?project_key={}", seg(project)))
            .await?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("applications") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    pub async fn get_application(&self, app_key: &str) -> Result<Option<Application>, JfrogError> {
        let path = format!("{APPLICATIONS}/{}", seg(app_key));
        let response = self.get(&path).await?;
        if response.status == 404 {
            return Ok(None);
        }
        expect_success(Method::GET, &path, response)?
            .json(&path)
            .map(Some)
    }

    pub async fn delete_application(&self, app_key: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{APPLICATIONS}/{}", seg(app_key)))
            .await
    }

    /// Raw listing newest first. A missing application yields an empty list.
    pub async fn list_versions_raw(&self, app_key: &str, limit: u32) -> Result<Value, JfrogError> {
        let path = format!(
            "{APPLICATIONS}/{}/versions?limit={limit}&order_by=created&order_asc=false",
            seg(app_key)
        );
        let response = self.get(&path).await?;
        if response.status == 404 {
            return Ok(Value::Array(Vec::new()));
        }
        expect_success(Method::GET, &path, response)?.json(&path)
    }

    pub async fn get_version(&self, app_key: &str, version: &str) -> Result<Value, JfrogError> {
        self.get_json(&version_path(app_key, version)).await
    }

    pub async fn version_content(&self, app_key: &str, version: &str) -> Result<Value, JfrogError> {
        let path = format!("{}/content?include=releasables", version_path(app_key, version));
        self.get_json(&path).await
    }

    pub async fn version_promotions(
        &self,
        app_key: &str,
        version: &str,
    ) -> Result<Value, JfrogError> {
        let path = format!("{}/promotions", version_path(app_key, version));
        let response = self.get(&path).await?;
        if response.status == 404 {
            return Ok(Value::Array(Vec::new()));
        }
        expect_success(Method::GET, &path, response)?.json(&path)
    }

    pub async fn delete_version(
        &self,
        app_key: &str,
        version: &str,
    ) -> Result<ApiResponse, JfrogError> {
        self.delete(&version_path(app_key, version)).await
    }
}
