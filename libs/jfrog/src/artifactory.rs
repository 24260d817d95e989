use bvo_core::models::{BuildSummary, RepositorySummary, TrustedKey};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{ApiResponse, JfrogClient, JfrogError, expect_success, seg};

const REPOSITORIES: &str = "/artifactory/api/repositories";
const BUILDS: &str = "/artifactory/api/build";
const AQL: &str = "/artifactory/api/search/aql";
const TRUSTED_KEYS: &str = "/artifactory/api/security/keys/trusted";

#[derive(Clone, Debug, Serialize)]
pub struct NewLocalRepository<'a> {
    pub key: &'a str,
    pub rclass: &'static str,
    #[serde(rename = "packageType")]
    pub package_type: &'a str,
    #[serde(rename = "projectKey")]
    pub project_key: &'a str,
    pub environments: Vec<&'a str>,
    pub description: String,
}

#[derive(Deserialize)]
struct BuildList {
    #[serde(default)]
    builds: Vec<BuildSummary>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AqlItem {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct AqlResults {
    #[serde(default)]
    results: Vec<AqlItem>,
}

#[derive(Deserialize)]
struct DockerTags {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct TrustedKeyList {
    #[serde(default)]
    keys: Vec<TrustedKey>,
}

impl JfrogClient {
    pub async fn create_local_repository(
        &self,
        repo: &NewLocalRepository<'_>,
    ) -> Result<ApiResponse, JfrogError> {
        self.put_json(&format!("{REPOSITORIES}/{}", seg(repo.key)), repo)
            .await
    }

    pub async fn list_repositories(
        &self,
        project: &str,
    ) -> Result<Vec<RepositorySummary>, JfrogError> {
        self.get_json(&format!("{REPOSITORIES}?project={}", seg(project)))
            .await
    }

    pub async fn delete_repository(&self, key: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{REPOSITORIES}/{}", seg(key))).await
    }

    /// Builds of `project`. A project without builds answers 404.
    pub async fn list_builds(&self, project: &str) -> Result<Vec<BuildSummary>, JfrogError> {
        let path = format!("{BUILDS}?project={}", seg(project));
        let response = self.get(&path).await?;
        if response.status == 404 {
            return Ok(Vec::new());
        }
        let list: BuildList =
            expect_success(Method::GET, &path, response)?.json(&path)?;
        Ok(list.builds)
    }

    /// Removes every number of `build` together with its artifacts.
    pub async fn delete_build(&self, project: &str, build: &str) -> Result<ApiResponse, JfrogError> {
        let body = json!({
            "project": project,
            "buildName": build,
            "buildNumbers": [],
            "deleteArtifacts": true,
            "deleteAll": true,
        });
        self.post_json(&format!("{BUILDS}/delete"), &body).await
    }

    pub async fn aql(&self, query: &str) -> Result<Vec<AqlItem>, JfrogError> {
        let response = self.post_text(AQL, query).await?;
        let results: AqlResults =
            expect_success(Method::POST, AQL, response)?.json(AQL)?;
        Ok(results.results)
    }

    /// Files stored in `repo`, with path and name.
    pub async fn list_repository_files(&self, repo: &str) -> Result<Vec<AqlItem>, JfrogError> {
        let query = format!(
            r#"items.find({{"repo":"{}","type":"file"}}).include("repo","name","path")"#,
            repo.replace('"', "")
        );
        self.aql(&query).await
    }

    pub async fn docker_tags(&self, repo: &str, image: &str) -> Result<Vec<String>, JfrogError> {
        let path = format!(
            "/artifactory/api/docker/{}/v2/{}/tags/list",
            seg(repo),
            image.split('/').map(seg).collect::<Vec<_>>().join("/")
        );
        let response = self.get(&path).await?;
        if response.status == 404 {
            return Ok(Vec::new());
        }
        let tags: DockerTags =
            expect_success(Method::GET, &path, response)?.json(&path)?;
        Ok(tags.tags)
    }

    pub async fn list_trusted_keys(&self) -> Result<Vec<TrustedKey>, JfrogError> {
        let list: TrustedKeyList = self.get_json(TRUSTED_KEYS).await?;
        Ok(list.keys)
    }

    pub async fn upload_trusted_key(
        &self,
        alias: &str,
        public_key_pem: &str,
    ) -> Result<ApiResponse, JfrogError> {
        let body = json!({ "alias": alias, "public_key": public_key_pem });
        self.post_json(TRUSTED_KEYS, &body).await
    }
}
