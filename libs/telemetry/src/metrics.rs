use metrics::{counter, histogram};

use crate::context::RunLabels;

/// Counts one provisioning or cleanup action by resource kind and outcome.
pub fn record_action(labels: &RunLabels, kind: &'static str, outcome: &'static str) {
    counter!(
        "bookverse_ops_actions_total",
        "command" => labels.command.clone(),
        "project" => labels.project.clone(),
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_run_duration(labels: &RunLabels, success: bool, seconds: f64) {
    histogram!(
        "bookverse_ops_run_seconds",
        "command" => labels.command.clone(),
        "status" => if success { "ok" } else { "failed" }
    )
    .record(seconds);
}
