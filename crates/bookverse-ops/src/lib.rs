//! Operations tooling for the BookVerse demo on a JFrog Platform Deployment:
//! provisioning, discovery and cleanup, teardown, release helpers and GitHub
//! mirroring.

pub mod cli;
pub mod commands;
pub mod context;
pub mod exit;

use std::time::Instant;

use anyhow::Result;
use bvo_core::config::DEFAULT_PROJECT_KEY;
use bvo_telemetry::record_run_duration;
use tracing::Instrument;

use crate::cli::{
    Cli, Command, GithubCommand, ReportCommand, RolesCommand, ScanCommand, VersionsCommand,
};
use crate::commands::cleanup::CleanupOptions;
use crate::commands::{
    cleanup, discover, evidence, faulty, github, identity_mappings, project_roles, promotion,
    provision, report, rollback, teardown, versions,
};
use crate::context::OpsContext;
use crate::exit::Exit;

/// Metric and span label for a command.
pub fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Provision(_) => "provision",
        Command::Discover => "discover",
        Command::Cleanup(_) => "cleanup",
        Command::Report { .. } => "report",
        Command::Teardown(_) => "teardown",
        Command::IdentityMappings { .. } => "identity-mappings",
        Command::ProjectRoles { .. } => "project-roles",
        Command::Rollback(_) => "rollback",
        Command::Versions { .. } => "versions",
        Command::FaultyVersions(_) => "faulty-versions",
        Command::PromotionFailure(_) => "promotion-failure",
        Command::Github { .. } => "github",
        Command::EvidenceKey(_) => "evidence-key",
    }
}

pub async fn run(cli: Cli) -> Result<Exit> {
    let name = command_name(&cli.command);

    // Checked before any configuration so an unconfirmed teardown never
    // reaches the platform.
    if let Command::Teardown(args) = &cli.command {
        if !teardown::confirmed(args.confirm.as_deref()) {
            tracing::error!(
                "❌ teardown requires --confirm {} (or CONFIRM_CLEANUP={})",
                teardown::CONFIRMATION,
                teardown::CONFIRMATION
            );
            return Ok(Exit::Unconfirmed);
        }
    }
    if let Command::PromotionFailure(args) = &cli.command {
        let project = cli.global.project.as_deref().unwrap_or(DEFAULT_PROJECT_KEY);
        return promotion::run(args, project, cli.global.json);
    }

    let ctx = OpsContext::load(&cli.global, name)?;
    let span = ctx.labels.span();
    let started = Instant::now();
    let result = dispatch(&ctx, &cli.command).instrument(span).await;
    let success = matches!(result, Ok(Exit::Success));
    record_run_duration(&ctx.labels, success, started.elapsed().as_secs_f64());
    result
}

async fn dispatch(ctx: &OpsContext, command: &Command) -> Result<Exit> {
    match command {
        Command::Provision(args) => provision::run(ctx, args).await,
        Command::Discover => discover::run(ctx).await,
        Command::Cleanup(args) => {
            let options = CleanupOptions {
                dry_run: args.dry_run,
                keep_project: args.keep_project,
            };
            cleanup::run(ctx, options).await
        }
        Command::Report {
            command: ReportCommand::Validate { mark_stale },
        } => report::run(ctx, *mark_stale),
        Command::Teardown(args) => teardown::run(ctx, args).await,
        Command::IdentityMappings { command } => match command {
            ScanCommand::Discover => identity_mappings::run_discover(ctx).await,
            ScanCommand::Cleanup { dry_run } => identity_mappings::run_cleanup(ctx, *dry_run).await,
        },
        Command::ProjectRoles { command } => match command {
            RolesCommand::Discover { role_prefix } => {
                project_roles::run_discover(ctx, role_prefix.as_deref()).await
            }
            RolesCommand::Cleanup {
                role_prefix,
                dry_run,
            } => project_roles::run_cleanup(ctx, role_prefix.as_deref(), *dry_run).await,
        },
        Command::Rollback(args) => {
            rollback::run(ctx, &args.app, &args.version, args.dry_run).await
        }
        Command::Versions { command } => match command {
            VersionsCommand::Next {
                app,
                packages,
                version_map,
            } => versions::run_next(ctx, app, packages.as_deref(), version_map).await,
            VersionsCommand::SeedMap { version_map } => versions::run_seed_map(ctx, version_map),
        },
        Command::FaultyVersions(args) => {
            faulty::run(ctx, args.app_key.as_deref(), &args.tag, args.dry_run).await
        }
        Command::PromotionFailure(args) => promotion::run(args, ctx.project(), ctx.json),
        Command::Github { command } => match command {
            GithubCommand::Sync { service } => github::run_sync(ctx, service.as_deref()).await,
            GithubCommand::Dispatch {
                repo,
                event_type,
                payload,
                api_base,
            } => github::run_dispatch(ctx, repo, event_type, payload, api_base.as_deref()).await,
            GithubCommand::WorkflowRun {
                repo,
                workflow,
                git_ref,
                fields,
            } => github::run_workflow(ctx, repo, workflow, git_ref.as_deref(), fields).await,
        },
        Command::EvidenceKey(args) => evidence::run(ctx, args.skip_github).await,
    }
}
