use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::{ApiResponse, JfrogClient, JfrogError, seg};

const RULES: &str = "/unifiedpolicy/api/v1/rules";
const POLICIES: &str = "/unifiedpolicy/api/v1/policies";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyObject {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewPolicy<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub enabled: bool,
    pub mode: &'a str,
    pub action: Value,
    pub scope: Value,
    pub rule_ids: Vec<String>,
}

impl<'a> NewPolicy<'a> {
    /// Gate policy on `stage` of `project` enforcing `rule_id`.
    pub fn gate(
        name: &'a str,
        description: &'a str,
        mode: &'a str,
        project: &str,
        stage: &str,
        gate: &str,
        rule_id: String,
    ) -> Self {
        Self {
            name,
            description,
            enabled: true,
            mode,
            action: json!({
                "type": "certify_to_gate",
                "stage": { "key": stage, "gate": gate },
            }),
            scope: json!({ "type": "project", "project_keys": [project] }),
            rule_ids: vec![rule_id],
        }
    }
}

/// Id carried by the answer to a create call, as a string.
pub fn created_id(response: &ApiResponse) -> Option<String> {
    match response.value().get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn items(value: Value) -> Vec<PolicyObject> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|mut item| {
            // ids come back as numbers on some versions
            if let Some(Value::Number(n)) = item.get("id").cloned() {
                item["id"] = Value::String(n.to_string());
            }
            serde_json::from_value(item).ok()
        })
        .collect()
}

impl JfrogClient {
    pub async fn list_policy_rules(&self) -> Result<Vec<PolicyObject>, JfrogError> {
        Ok(items(self.get_json(RULES).await?))
    }

    pub async fn create_policy_rule(
        &self,
        name: &str,
        description: &str,
        template: &str,
    ) -> Result<ApiResponse, JfrogError> {
        let body = json!({
            "name": name,
            "description": description,
            "is_custom": true,
            "template_id": template,
            "parameters": [],
        });
        self.post_json(RULES, &body).await
    }

    pub async fn list_policies(&self, project: &str) -> Result<Vec<PolicyObject>, JfrogError> {
        Ok(items(
            self.get_json(&format!("{POLICIES}?project_key={}", seg(project)))
                .await?,
        ))
    }

    pub async fn create_policy(&self, policy: &NewPolicy<'_>) -> Result<ApiResponse, JfrogError> {
        self.post_json(POLICIES, policy).await
    }

    pub async fn delete_policy(&self, id: &str) -> Result<ApiResponse, JfrogError> {
        self.delete(&format!("{POLICIES}/{}", seg(id))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_become_strings() {
        let parsed = items(json!({"items": [{"id": 12, "name": "r"}, {"name": "no-id"}]}));
        assert_eq!(parsed[0].id.as_deref(), Some("12"));
        assert_eq!(parsed[1].id, None);
    }

    #[test]
    fn created_id_reads_the_answer_body() {
        let answer = |body: &str| ApiResponse {
            status: 201,
            body: body.to_string(),
        };
        assert_eq!(created_id(&answer(r#"{"id": 31, "name": "r"}"#)).as_deref(), Some("31"));
        assert_eq!(created_id(&answer(r#"{"id": "abc"}"#)).as_deref(), Some("abc"));
        assert_eq!(created_id(&answer("")), None);
        assert_eq!(created_id(&answer(r#"{"name": "r"}"#)), None);
    }

    #[test]
    fn gate_policy_shape() {
        let policy = NewPolicy::gate("p", "d", "block", "bookverse", "bookverse-QA", "entry", "7".into());
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["action"]["stage"]["key"], "bookverse-QA");
        assert_eq!(json["scope"]["project_keys"][0], "bookverse");
        assert_eq!(json["rule_ids"][0], "7");
    }
}
