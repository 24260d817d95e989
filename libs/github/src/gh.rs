//! Thin wrapper around the `gh` CLI for the repository settings the
//! BookVerse services need: existence, secrets, variables and workflow runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::GithubError;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// `owner/name` repository reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, GithubError> {
        match raw.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(GithubError::InvalidRepo(raw.to_string())),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepoCreation {
    Created,
    AlreadyExists,
}

const PROGRAM: &str = "gh";

#[derive(Clone)]
pub struct GhCli {
    runner: Arc<dyn CommandRunner>,
    token: Option<String>,
}

impl fmt::Debug for GhCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhCli")
            .field("token", &self.token.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl GhCli {
    pub fn new(runner: Arc<dyn CommandRunner>, token: Option<String>) -> Self {
        Self {
            runner,
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut invocation = Invocation::new(PROGRAM, args).env("GH_PROMPT_DISABLED", "1");
        if let Some(token) = &self.token {
            invocation = invocation.env("GH_TOKEN", token);
        }
        invocation
    }

    async fn run(&self, invocation: Invocation) -> Result<CommandOutput, GithubError> {
        tracing::debug!(command = %invocation.display(), "running gh");
        self.runner.run(&invocation).await
    }

    async fn run_checked(&self, invocation: Invocation) -> Result<CommandOutput, GithubError> {
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(GithubError::Command {
                command,
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    pub async fn repo_exists(&self, repo: &RepoRef) -> Result<bool, GithubError> {
        let full_name = repo.to_string();
        let invocation = self.invocation(["repo", "view", full_name.as_str(), "--json", "name"]);
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            return Ok(true);
        }
        let stderr = output.stderr.to_ascii_lowercase();
        if stderr.contains("could not resolve") || stderr.contains("not found") {
            return Ok(false);
        }
        Err(GithubError::Command {
            command,
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }

    pub async fn create_repo(
        &self,
        repo: &RepoRef,
        description: &str,
        private: bool,
    ) -> Result<RepoCreation, GithubError> {
        let visibility = if private { "--private" } else { "--public" };
        let full_name = repo.to_string();
        let invocation = self.invocation([
            "repo",
            "create",
            full_name.as_str(),
            visibility,
            "--description",
            description,
        ]);
        let command = invocation.display();
        let output = self.run(invocation).await?;
        if output.success() {
            return Ok(RepoCreation::Created);
        }
        if output.stderr.to_ascii_lowercase().contains("already exists") {
            return Ok(RepoCreation::AlreadyExists);
        }
        Err(GithubError::Command {
            command,
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }

    /// Creates `repo` unless `gh repo view` already finds it.
    pub async fn ensure_repo(
        &self,
        repo: &RepoRef,
        description: &str,
    ) -> Result<RepoCreation, GithubError> {
        if self.repo_exists(repo).await? {
            return Ok(RepoCreation::AlreadyExists);
        }
        self.create_repo(repo, description, false).await
    }

    /// The value travels on stdin so it never shows up in process listings.
    pub async fn set_secret(
        &self,
        repo: &RepoRef,
        name: &str,
        value: &str,
    ) -> Result<(), GithubError> {
        let full_name = repo.to_string();
        let invocation = self
            .invocation(["secret", "set", name, "--repo", full_name.as_str()])
            .stdin(value);
        self.run_checked(invocation).await.map(|_| ())
    }

    pub async fn set_variable(
        &self,
        repo: &RepoRef,
        name: &str,
        value: &str,
    ) -> Result<(), GithubError> {
        let full_name = repo.to_string();
        let invocation = self.invocation([
            "variable",
            "set",
            name,
            "--repo",
            full_name.as_str(),
            "--body",
            value,
        ]);
        self.run_checked(invocation).await.map(|_| ())
    }

    /// Current repository variables by name.
    pub async fn list_variables(&self, repo: &RepoRef) -> Result<BTreeMap<String, String>, GithubError> {
        let full_name = repo.to_string();
        let invocation = self.invocation([
            "variable",
            "list",
            "--repo",
            full_name.as_str(),
            "--json",
            "name,value",
        ]);
        let command = invocation.display();
        let output = self.run_checked(invocation).await?;
        if output.stdout.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let items: Vec<Value> = serde_json::from_str(&output.stdout)
            .map_err(|source| GithubError::Output { command, source })?;
        Ok(items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                let value = item.get("value").and_then(Value::as_str).unwrap_or_default();
                Some((name.to_string(), value.to_string()))
            })
            .collect())
    }

    pub async fn run_workflow(
        &self,
        repo: &RepoRef,
        workflow: &str,
        git_ref: Option<&str>,
        inputs: &[(String, String)],
    ) -> Result<(), GithubError> {
        let mut args = vec![
            "workflow".to_string(),
            "run".to_string(),
            workflow.to_string(),
            "--repo".to_string(),
            repo.to_string(),
        ];
        if let Some(git_ref) = git_ref {
            args.push("--ref".into());
            args.push(git_ref.to_string());
        }
        for (key, value) in inputs {
            args.push("-f".into());
            args.push(format!("{key}={value}"));
        }
        self.run_checked(self.invocation(args)).await.map(|_| ())
    }
}
