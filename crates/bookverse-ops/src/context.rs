use std::sync::Arc;

use anyhow::{Context, Result};
use bvo_core::{Blueprint, PlatformConfig};
use bvo_github::{GhCli, ProcessRunner};
use bvo_jfrog::JfrogClient;
use bvo_telemetry::RunLabels;
use serde::Serialize;

use crate::cli::GlobalArgs;
use crate::commands::github::Mirror;

/// Resolved settings for one command invocation.
pub struct OpsContext {
    pub config: PlatformConfig,
    pub blueprint: Blueprint,
    pub labels: RunLabels,
    pub json: bool,
}

impl OpsContext {
    pub fn load(global: &GlobalArgs, command: &str) -> Result<Self> {
        let config =
            PlatformConfig::resolve(global.inputs()).context("invalid configuration")?;
        let blueprint = Blueprint::load(config.blueprint_path.as_deref(), Some(&config.project))
            .context("failed to load blueprint")?;
        let labels = RunLabels::new(config.project.clone(), command);
        Ok(Self {
            config,
            blueprint,
            labels,
            json: global.json,
        })
    }

    pub fn project(&self) -> &str {
        self.blueprint.project_key()
    }

    pub fn client(&self) -> Result<JfrogClient> {
        let connection = self.config.connection()?;
        Ok(JfrogClient::new(&connection)?)
    }

    pub fn gh(&self) -> GhCli {
        GhCli::new(
            Arc::new(ProcessRunner::default()),
            self.config.gh_token.clone(),
        )
    }

    pub fn github_org(&self) -> &str {
        self.blueprint.github_org(self.config.github_org.as_deref())
    }

    /// Settings mirrored into every service repository.
    pub fn mirror<'a>(&'a self, gh: &'a GhCli) -> Result<Mirror<'a>> {
        let connection = self.config.connection()?;
        Ok(Mirror {
            gh,
            org: self.github_org(),
            jfrog_url: connection.base_url,
            docker_registry: self.config.docker_registry().unwrap_or_default(),
        })
    }

    /// Prints `value` as pretty JSON on stdout when `--json` was given.
    pub fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(())
    }
}
