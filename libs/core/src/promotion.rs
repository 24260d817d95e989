//! Markdown summary for application promotions rejected by policy gates.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]").expect("valid policy name regex"));

const VIOLATED_MARKER: &str = "violated policies:";
const GENERIC_DOCS: &str = "https://docs.bookverse.com/policies/overview";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PromotionFailure {
    #[serde(default)]
    pub application_key: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub source_stage: Option<String>,
    #[serde(default)]
    pub target_stage: Option<String>,
    #[serde(default)]
    pub promotion_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub evaluations: Evaluations,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Evaluations {
    #[serde(default)]
    pub exit_gate: Option<GateEvaluation>,
    #[serde(default)]
    pub entry_gate: Option<GateEvaluation>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GateEvaluation {
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub eval_id: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

struct PolicyGuidance {
    issue: &'static str,
    evidence: &'static str,
    actions: [&'static str; 4],
    docs: &'static str,
}

fn guidance_for(policy: &str) -> Option<PolicyGuidance> {
    let guidance = match policy {
        "BookVerse QA Entry Gate - Evidence Required" => PolicyGuidance {
            issue: "Requires evidence of successful DEV stage completion",
            evidence: "DEV.Exit AppTrust Gate Certification",
            actions: [
                "Ensure the application completed all DEV stage requirements",
                "Verify DEV stage exit gate evaluation passed",
                "Check AppTrust for DEV.Exit certification evidence",
                "If missing, complete DEV stage testing and validation",
            ],
            docs: "https://docs.bookverse.com/quality-gates/dev-completion",
        },
        "BookVerse QA Entry Gate - SBOM Required" => PolicyGuidance {
            issue: "Requires Software Bill of Materials (SBOM) evidence",
            evidence: "CycloneDX SBOM from build pipeline",
            actions: [
                "Check if SBOM was generated during the build process",
                "Verify build pipeline includes SBOM generation step",
                "Ensure SBOM is properly uploaded to AppTrust",
                "Re-run build if SBOM generation failed",
            ],
            docs: "https://docs.bookverse.com/security/sbom-requirements",
        },
        "BookVerse STAGING Entry - Integration Tests"
        | "BookVerse QA Entry - Custom Integration Tests" => PolicyGuidance {
            issue: "Requires custom integration test evidence",
            evidence: "Integration test results and coverage",
            actions: [
                "Run the complete integration test suite",
                "Ensure all integration tests pass",
                "Upload test results to evidence collection system",
                "Verify test coverage meets minimum requirements",
            ],
            docs: "https://docs.bookverse.com/testing/integration-tests",
        },
        _ => return None,
    };
    Some(guidance)
}

impl PromotionFailure {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Policy names listed after `violated policies:` in a failed entry gate.
    pub fn violated_policies(&self) -> Vec<String> {
        let Some(gate) = &self.evaluations.entry_gate else {
            return Vec::new();
        };
        if gate.decision.as_deref() != Some("fail") {
            return Vec::new();
        }
        let explanation = gate.explanation.as_deref().unwrap_or_default();
        let Some((_, tail)) = explanation.split_once(VIOLATED_MARKER) else {
            return Vec::new();
        };
        BRACKETED
            .captures_iter(tail)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    pub fn render_markdown(&self, project_key: &str, timestamp: &str) -> String {
        let unknown = "unknown";
        let app = self.application_key.as_deref().unwrap_or(unknown);
        let version = self.version.as_deref().unwrap_or(unknown);
        let source = self.source_stage.as_deref().unwrap_or(unknown);
        let target = self.target_stage.as_deref().unwrap_or(unknown);
        let message = self
            .message
            .as_deref()
            .unwrap_or("Promotion failed due to policy violations");

        let mut md = String::new();
        let _ = writeln!(md, "# 🚨 Promotion Failed: {app} v{version}\n");
        let _ = writeln!(md, "## 📋 Promotion Summary\n");
        let _ = writeln!(md, "- **Application:** {app}");
        let _ = writeln!(md, "- **Version:** {version}");
        let _ = writeln!(md, "- **Source Stage:** {source}");
        let _ = writeln!(md, "- **Target Stage:** {target}");
        let _ = writeln!(
            md,
            "- **Promotion Type:** {}",
            self.promotion_type.as_deref().unwrap_or("move")
        );
        let _ = writeln!(md, "- **Status:** ❌ **FAILED**");
        let _ = writeln!(md, "- **Timestamp:** {timestamp}\n");
        let _ = writeln!(md, "## ❌ Failure Details\n\n{message}\n\n**Evaluation Results:**");

        if let Some(gate) = &self.evaluations.exit_gate {
            write_gate(&mut md, gate, source, "Exit");
        }
        if let Some(gate) = &self.evaluations.entry_gate {
            write_gate(&mut md, gate, target, "Entry");
            if let Some(explanation) = gate.explanation.as_deref().filter(|e| !e.is_empty()) {
                let _ = writeln!(md, "- **Failure Reason:** {explanation}");
            }
        }

        let policies = self.violated_policies();
        if !policies.is_empty() {
            let _ = writeln!(
                md,
                "\n## 🔧 Required Actions\n\nThe following {} policies failed and must be addressed before promotion can succeed:",
                policies.len()
            );
            for policy in &policies {
                write_policy(&mut md, policy);
            }
        }

        let _ = writeln!(md, "\n## 📊 Stage Transition Information\n");
        let _ = writeln!(md, "### Source Stage: {source}");
        if let Some(info) = stage_info(project_key, source) {
            let _ = writeln!(md, "- **Purpose:** {}", info.0);
            let _ = writeln!(md, "- **Typical Evidence:** {}", info.1);
        }
        let _ = writeln!(md, "\n### Target Stage: {target}");
        if let Some(info) = stage_info(project_key, target) {
            let _ = writeln!(md, "- **Purpose:** {}", info.0);
            let _ = writeln!(md, "- **Entry Requirements:** {}", info.2);
        }

        md.push_str(
            "\n## 🎯 Next Steps\n\n\
             1. **Review Failed Policies:** Address each failed policy listed above\n\
             2. **Collect Evidence:** Ensure all required evidence is generated and uploaded\n\
             3. **Verify Compliance:** Check the AppTrust console for evidence validation\n\
             4. **Retry Promotion:** Once all issues are resolved, retry the promotion\n\n\
             ---\n\n\
             **⚠️ Important:** This failure is part of the normal quality gate process. \
             Promotion stays blocked until all requirements are met.\n",
        );
        md
    }
}

fn write_gate(md: &mut String, gate: &GateEvaluation, fallback_stage: &str, label: &str) {
    let decision = gate.decision.as_deref().unwrap_or("unknown");
    let emoji = if decision == "pass" { "✅" } else { "❌" };
    let _ = writeln!(
        md,
        "- **{} {label} Gate:** {emoji} {} (ID: {})",
        gate.stage.as_deref().unwrap_or(fallback_stage),
        decision.to_uppercase(),
        gate.eval_id.as_deref().unwrap_or("N/A")
    );
}

fn write_policy(md: &mut String, policy: &str) {
    let _ = writeln!(md, "\n### 🚨 {policy}\n");
    match guidance_for(policy) {
        Some(guidance) => {
            let _ = writeln!(md, "**Issue:** {}\n", guidance.issue);
            let _ = writeln!(md, "**Required Evidence:** {}\n", guidance.evidence);
            let _ = writeln!(md, "**Actions to Fix:**");
            for (index, action) in guidance.actions.iter().enumerate() {
                let _ = writeln!(md, "{}. {action}", index + 1);
            }
            let _ = writeln!(md, "\n📖 **Documentation:** {}", guidance.docs);
        }
        None => {
            let _ = writeln!(md, "**Issue:** Policy violation detected\n");
            let _ = writeln!(md, "**Actions to Fix:**");
            let _ = writeln!(md, "1. Review the policy requirements in the AppTrust console");
            let _ = writeln!(md, "2. Check what evidence is required for this policy");
            let _ = writeln!(md, "3. Ensure all required evidence is properly uploaded");
            let _ = writeln!(md, "\n📖 **Documentation:** {GENERIC_DOCS}");
        }
    }
}

/// (purpose, typical evidence, entry requirements)
fn stage_info(project_key: &str, stage: &str) -> Option<(&'static str, &'static str, &'static str)> {
    let short = stage
        .strip_prefix(project_key)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(stage);
    if short != "PROD" && short == stage {
        return None;
    }
    match short {
        "DEV" => Some((
            "Development stage for initial testing and validation",
            "Build artifacts, Unit tests, Security scans",
            "Successful build",
        )),
        "QA" => Some((
            "Quality assurance stage for comprehensive testing",
            "Integration tests, Performance tests, SBOM",
            "DEV stage complete, Evidence collection, Policy compliance",
        )),
        "STAGING" => Some((
            "Staging environment for final validation",
            "E2E tests, Load tests, UAT results",
            "QA stage complete, Full test coverage, Performance validation",
        )),
        "PROD" => Some((
            "Production stage for live deployment",
            "Production readiness, Deployment checklist, Monitoring setup",
            "All previous stages complete, Production readiness, Approval workflows",
        )),
        _ => None,
    }
}
