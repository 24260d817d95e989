//! Access service: projects, stages, lifecycle, users, membership and
//! project roles.

use bvo_core::models::{Lifecycle, PlatformUser, ProjectMember, ProjectRole, Stage};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::{ApiResponse, JfrogClient, JfrogError, expect_success, seg};

const PROJECTS: &str = "/access/api/v1/projects";
const STAGES: &str = "/access/api/v2/stages";
const LIFECYCLE: &str = "/access/api/v2/lifecycle";
const USERS: &str = "/access/api/v2/users";

#[derive(Clone, Debug, Serialize)]
pub struct NewProject<'a> {
    pub project_key: &'a str,
    pub display_name: &'a str,
    pub description: &'a str,
    pub storage_quota_bytes: i64,
    pub admin_privileges: AdminPrivileges,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct AdminPrivileges {
    pub manage_members: bool,
    pub manage_resources: bool,
    pub index_resources: bool,
}

impl Default for AdminPrivileges {
    fn default() -> Self {
        Self {
            manage_members: true,
            manage_resources: true,
            index_resources: true,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub admin: bool,
    pub profile_updatable: bool,
}

#[derive(Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<UserRef>,
}

#[derive(Deserialize)]
struct UserRef {
    username: String,
}

#[derive(Deserialize)]
struct MemberList {
    #[serde(default)]
    members: Vec<ProjectMember>,
}

impl JfrogClient {
    pub async fn create_project(&self, project: &NewProject<'_>) -> Result<ApiResponse, JfrogError> {
        self.post_json(PROJECTS, project).await
    }

    pub async fn get_project(&self, key: &str) -> Result<ApiResponse, JfrogError> {
        self.get(&format!("{PROJECTS}/{}", seg(key))).await
    }

    pub async fn delete_project(&self, key: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{PROJECTS}/{}?force=true", seg(key)))
            .await
    }

    pub async fn create_stage(&self, project: &str, name: &str) -> Result<ApiResponse, JfrogError> {
        let body = json!({
            "name": name,
            "scope": "project",
            "project_key": project,
            "category": "promote",
        });
        self.post_json(STAGES, &body).await
    }

    pub async fn list_stages(&self, project: &str) -> Result<Vec<Stage>, JfrogError> {
        let value: Value = self
            .get_json(&format!("{STAGES}?project_key={}&scope=project", seg(project)))
            .await?;
        Ok(match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            Value::Object(mut map) => map
                .remove("stages")
                .and_then(|stages| serde_json::from_value(stages).ok())
                .unwrap_or_default(),
            _ => Vec::new(),
        })
    }

    pub async fn delete_stage(&self, name: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{STAGES}/{}", seg(name))).await
    }

    pub async fn get_lifecycle(&self, project: &str) -> Result<Lifecycle, JfrogError> {
        self.get_json(&format!("{LIFECYCLE}?project_key={}", seg(project)))
            .await
    }

    pub async fn set_lifecycle(
        &self,
        project: &str,
        promote_stages: &[String],
    ) -> Result<ApiResponse, JfrogError> {
        let body = Lifecycle {
            promote_stages: promote_stages.to_vec(),
        };
        self.patch_json(&format!("{LIFECYCLE}?project_key={}", seg(project)), &body)
            .await
    }

    pub async fn create_user(&self, user: &NewUser<'_>) -> Result<ApiResponse, JfrogError> {
        self.post_json(USERS, user).await
    }

    /// Lists every platform user with details. The listing only carries
    /// usernames, so each user is fetched individually.
    pub async fn list_users(&self) -> Result<Vec<PlatformUser>, JfrogError> {
        let list: UserList = self.get_json(USERS).await?;
        let mut users = Vec::with_capacity(list.users.len());
        for user in list.users {
            match self.get_user(&user.username).await {
                Ok(Some(details)) => users.push(details),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!("⚠️ could not read user {}: {err}", user.username);
                }
            }
        }
        Ok(users)
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<PlatformUser>, JfrogError> {
        let path = format!("{USERS}/{}", seg(username));
        let response = self.get(&path).await?;
        if response.status == 404 {
            return Ok(None);
        }
        expect_success(Method::GET, &path, response)?
            .json(&path)
            .map(Some)
    }

    pub async fn delete_user(&self, username: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{USERS}/{}", seg(username))).await
    }

    pub async fn add_project_member(
        &self,
        project: &str,
        username: &str,
        roles: &[String],
    ) -> Result<ApiResponse, JfrogError> {
        let body = ProjectMember {
            name: username.to_string(),
            roles: roles.to_vec(),
        };
        self.put_json(
            &format!("{PROJECTS}/{}/users/{}", seg(project), seg(username)),
            &body,
        )
        .await
    }

    pub async fn list_project_members(
        &self,
        project: &str,
    ) -> Result<Vec<ProjectMember>, JfrogError> {
        let list: MemberList = self
            .get_json(&format!("{PROJECTS}/{}/users", seg(project)))
            .await?;
        Ok(list.members)
    }

    pub async fn remove_project_member(
        &self,
        project: &str,
        username: &str,
    ) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!(
            "{PROJECTS}/{}/users/{}",
            seg(project),
            seg(username)
        ))
        .await
    }

    pub async fn create_project_role(
        &self,
        project: &str,
        role: &ProjectRole,
    ) -> Result<ApiResponse, JfrogError> {
        self.post_json(&format!("{PROJECTS}/{}/roles", seg(project)), role)
            .await
    }

    pub async fn list_project_roles(&self, project: &str) -> Result<Vec<ProjectRole>, JfrogError> {
        self.get_json(&format!("{PROJECTS}/{}/roles", seg(project)))
            .await
    }

    pub async fn delete_project_role(
        &self,
        project: &str,
        role: &str,
    ) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{PROJECTS}/{}/roles/{}", seg(project), seg(role)))
            .await
    }
}
