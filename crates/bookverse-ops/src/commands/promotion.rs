use std::io::Read;

use anyhow::{Context, Result};
use bvo_core::promotion::PromotionFailure;
use bvo_core::report::format_timestamp;
use bvo_core::summary::ActionsFile;
use serde_json::json;
use time::OffsetDateTime;

use crate::cli::PromotionArgs;
use crate::exit::Exit;

/// The failure document: inline argument, then `--file`, then stdin.
pub fn read_input(args: &PromotionArgs, stdin: &mut dyn Read) -> Result<String> {
    if let Some(inline) = args.failure.as_deref().filter(|raw| !raw.trim().is_empty()) {
        return Ok(inline.to_string());
    }
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut raw = String::new();
    stdin
        .read_to_string(&mut raw)
        .context("failed to read promotion failure from stdin")?;
    Ok(raw)
}

pub fn render(raw: &str, project: &str, now: OffsetDateTime) -> Result<(PromotionFailure, String)> {
    let failure = PromotionFailure::parse(raw).context("promotion failure is not valid JSON")?;
    let markdown = failure.render_markdown(project, &format_timestamp(now));
    Ok((failure, markdown))
}

pub fn run(args: &PromotionArgs, project: &str, json_output: bool) -> Result<Exit> {
    let raw = read_input(args, &mut std::io::stdin())?;
    let (failure, markdown) = render(&raw, project, OffsetDateTime::now_utc())?;
    let policies = failure.violated_policies();
    if policies.is_empty() {
        tracing::warn!("⚠️ no violated policies found in the entry gate evaluation");
    } else {
        tracing::error!("❌ promotion blocked by {} policies", policies.len());
    }

    if args.summary && ActionsFile::step_summary().append(&markdown)? {
        tracing::info!("✅ appended failure summary to the step summary");
    }
    if let Some(path) = &args.output {
        std::fs::write(path, &markdown)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if json_output {
        let value = json!({ "violated_policies": policies, "markdown": markdown });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{markdown}");
    }
    Ok(Exit::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const FAILURE: &str = r#"{
        "application_key": "bookverse-web",
        "version": "1.4.0",
        "source_stage": "bookverse-DEV",
        "target_stage": "bookverse-QA",
        "evaluations": {
            "entry_gate": {
                "decision": "fail",
                "explanation": "violated policies: [BookVerse QA Entry Gate - SBOM Required]"
            }
        }
    }"#;

    #[test]
    fn inline_argument_wins_over_stdin() {
        let args = PromotionArgs {
            failure: Some(FAILURE.into()),
            ..PromotionArgs::default()
        };
        let mut stdin = "ignored".as_bytes();
        assert_eq!(read_input(&args, &mut stdin).unwrap(), FAILURE);
    }

    #[test]
    fn stdin_is_the_fallback() {
        let mut stdin = FAILURE.as_bytes();
        let raw = read_input(&PromotionArgs::default(), &mut stdin).unwrap();
        let (failure, markdown) = render(&raw, "bookverse", datetime!(2026-01-05 10:00 UTC)).unwrap();
        assert_eq!(failure.violated_policies(), ["BookVerse QA Entry Gate - SBOM Required"]);
        assert!(markdown.contains("SBOM Required"));
        assert!(markdown.contains("bookverse-web"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(render("{not json", "bookverse", OffsetDateTime::now_utc()).is_err());
    }
}
