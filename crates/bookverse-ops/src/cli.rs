use std::path::PathBuf;

use bvo_core::{ConfigInputs, version_map::DEFAULT_VERSION_MAP_PATH};
use clap::{Args, Parser, Subcommand};

use crate::commands::faulty::DEFAULT_FAULTY_TAG;

#[derive(Parser, Debug)]
#[command(
    name = "bookverse-ops",
    version,
    about = "Provision, inspect and tear down the BookVerse demo on a JFrog Platform Deployment"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// Connection and output settings shared by every command. Each flag falls
/// back to its environment variable.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Print machine-readable JSON on stdout; logs stay on stderr.
    #[arg(long, global = true)]
    pub json: bool,
    /// Base URL of the JFrog Platform Deployment.
    #[arg(long, global = true, env = "JFROG_URL", value_name = "URL")]
    pub jfrog_url: Option<String>,
    /// Admin access token.
    #[arg(long, global = true, env = "JFROG_ADMIN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Project key (defaults to bookverse).
    #[arg(long, global = true, env = "PROJECT_KEY")]
    pub project: Option<String>,
    /// GitHub token for repository settings and dispatch webhooks.
    #[arg(long, global = true, env = "GH_TOKEN", hide_env_values = true)]
    pub gh_token: Option<String>,
    /// GitHub organisation owning the service repositories.
    #[arg(long, global = true, env = "GITHUB_ORG")]
    pub github_org: Option<String>,
    /// Blueprint YAML; the embedded BookVerse blueprint is used when unset.
    #[arg(long, global = true, env = "BOOKVERSE_BLUEPRINT", value_name = "PATH")]
    pub blueprint: Option<String>,
    /// Cleanup report location.
    #[arg(long, global = true, env = "CLEANUP_REPORT_PATH", value_name = "PATH")]
    pub report: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "JFROG_HTTP_TIMEOUT_SECS", value_name = "SECS")]
    pub timeout_secs: Option<String>,
    /// Attempts per request for throttled or failing calls.
    #[arg(long, global = true, env = "JFROG_HTTP_RETRIES", value_name = "N")]
    pub retries: Option<String>,
}

impl GlobalArgs {
    pub fn inputs(&self) -> ConfigInputs {
        ConfigInputs {
            jfrog_url: self.jfrog_url.clone(),
            token: self.token.clone(),
            project: self.project.clone(),
            gh_token: self.gh_token.clone(),
            github_org: self.github_org.clone(),
            blueprint: self.blueprint.clone(),
            report: self.report.clone(),
            timeout_secs: self.timeout_secs.clone(),
            retries: self.retries.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create every platform resource the blueprint describes
    Provision(ProvisionArgs),
    /// Inventory project resources and write the cleanup report
    Discover,
    /// Delete the resources listed in a validated cleanup report
    Cleanup(CleanupArgs),
    /// Cleanup report helpers
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
    /// Remove identity mappings, custom roles and the project itself
    Teardown(TeardownArgs),
    /// OIDC identity mappings that reference the project
    IdentityMappings {
        #[command(subcommand)]
        command: ScanCommand,
    },
    /// Custom project roles
    ProjectRoles {
        #[command(subcommand)]
        command: RolesCommand,
    },
    /// Quarantine a PROD version and move the latest tag
    Rollback(RollbackArgs),
    /// Compute next versions or maintain the version map
    Versions {
        #[command(subcommand)]
        command: VersionsCommand,
    },
    /// Find and delete versions that shipped a faulty artifact
    FaultyVersions(FaultyArgs),
    /// Render a promotion failure as markdown
    PromotionFailure(PromotionArgs),
    /// Mirror settings to GitHub or send repository dispatches
    Github {
        #[command(subcommand)]
        command: GithubCommand,
    },
    /// Ensure the evidence signing key and mirror it to the service repositories
    EvidenceKey(EvidenceArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProvisionArgs {
    /// Only read the platform and report what would be created.
    #[arg(long)]
    pub dry_run: bool,
    /// Do not touch GitHub repositories.
    #[arg(long)]
    pub skip_github: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CleanupArgs {
    /// Log deletions without performing them.
    #[arg(long)]
    pub dry_run: bool,
    /// Leave the project itself in place.
    #[arg(long)]
    pub keep_project: bool,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Check the report against the freshness, project and status rules
    Validate {
        /// Flip a report that only failed the freshness check to stale_report.
        #[arg(long)]
        mark_stale: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TeardownArgs {
    /// Must be DELETE (any case).
    #[arg(long, env = "CONFIRM_CLEANUP")]
    pub confirm: Option<String>,
    /// Only delete custom roles starting with this prefix (defaults to `<project>-`).
    #[arg(long)]
    pub role_prefix: Option<String>,
    /// Plan the deletions without touching the platform.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum ScanCommand {
    /// List related identity mappings
    Discover,
    /// Delete related identity mappings
    Cleanup {
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RolesCommand {
    /// List custom roles
    Discover {
        #[arg(long)]
        role_prefix: Option<String>,
    },
    /// Delete custom roles
    Cleanup {
        #[arg(long)]
        role_prefix: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RollbackArgs {
    /// Application key.
    #[arg(long)]
    pub app: String,
    /// Version to quarantine.
    #[arg(long)]
    pub version: String,
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum VersionsCommand {
    /// Compute the next application version, build number and package tags
    Next {
        /// Application key.
        #[arg(long)]
        app: String,
        /// Comma separated package names; defaults to the service images.
        #[arg(long)]
        packages: Option<String>,
        #[arg(long, default_value = DEFAULT_VERSION_MAP_PATH)]
        version_map: PathBuf,
    },
    /// Create or complete the version map with random seeds
    SeedMap {
        #[arg(long, default_value = DEFAULT_VERSION_MAP_PATH)]
        version_map: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct FaultyArgs {
    /// Scan only this application; all project applications otherwise.
    #[arg(long)]
    pub app_key: Option<String>,
    /// Tag of the faulty artifact.
    #[arg(long, default_value = DEFAULT_FAULTY_TAG)]
    pub tag: String,
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PromotionArgs {
    /// Failure JSON; read from --file or stdin when omitted.
    pub failure: Option<String>,
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Append the markdown to $GITHUB_STEP_SUMMARY.
    #[arg(long)]
    pub summary: bool,
    /// Also write the markdown to this file.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum GithubCommand {
    /// Ensure service repositories and write their variables
    Sync {
        /// Limit to one service.
        #[arg(long)]
        service: Option<String>,
    },
    /// Send a repository_dispatch event
    Dispatch {
        /// owner/name
        #[arg(long)]
        repo: String,
        #[arg(long)]
        event_type: String,
        /// JSON client payload.
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, env = "GITHUB_API_URL", hide = true)]
        api_base: Option<String>,
    },
    /// Trigger a workflow_dispatch run through `gh workflow run`
    WorkflowRun {
        /// owner/name
        #[arg(long)]
        repo: String,
        /// Workflow file name or id.
        #[arg(long)]
        workflow: String,
        /// Branch or tag to run on.
        #[arg(long = "ref")]
        git_ref: Option<String>,
        /// Workflow input as key=value; repeatable.
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct EvidenceArgs {
    /// Only ensure the key on the platform.
    #[arg(long)]
    pub skip_github: bool,
}
