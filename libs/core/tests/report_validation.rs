use bvo_core::report::{
    CleanupPlan, CleanupReport, ReportStatus, ResourceDescriptor, ValidationOptions,
    read_report_text, validate_report_text, write_report,
};
use serde_json::{Value, json};
use time::{Duration, macros::datetime};

fn fresh_report() -> CleanupReport {
    let plan = CleanupPlan {
        applications: vec![ResourceDescriptor::keyed("bookverse-web", Some("bookverse"))],
        stages: vec![ResourceDescriptor::named("bookverse-DEV", Some("bookverse"))],
        builds: vec![ResourceDescriptor::named("bookverse-web-ci", Some("bookverse"))],
        ..CleanupPlan::default()
    };
    CleanupReport::new("bookverse", plan, datetime!(2026-10-17 12:00 UTC))
}

fn options() -> ValidationOptions<'static> {
    ValidationOptions::new("bookverse", datetime!(2026-10-17 12:10 UTC))
}

fn failing_names(raw: &str, options: ValidationOptions<'_>) -> Vec<&'static str> {
    validate_report_text(raw, options)
        .unwrap()
        .failures()
        .map(|check| check.name)
        .collect()
}

fn mutate(edit: impl FnOnce(&mut Value)) -> String {
    let mut value = serde_json::to_value(fresh_report()).unwrap();
    edit(&mut value);
    value.to_string()
}

#[test]
fn fresh_report_is_valid() {
    let raw = fresh_report().to_json_pretty().unwrap();
    let validation = validate_report_text(&raw, options()).unwrap();
    assert!(validation.is_valid(), "{:?}", validation.checks);
    assert_eq!(validation.report.unwrap().metadata.total_items, 3);
}

#[test]
fn invalid_json_is_rejected() {
    assert_eq!(failing_names("{not json", options()), vec!["valid_json"]);
}

#[test]
fn missing_metadata_field_is_rejected() {
    let raw = mutate(|value| {
        value["metadata"].as_object_mut().unwrap().remove("total_items");
    });
    let names = failing_names(&raw, options());
    assert!(names.contains(&"schema"));
    assert!(names.contains(&"metadata_fields"));
}

#[test]
fn old_report_is_stale_only() {
    let raw = fresh_report().to_json_pretty().unwrap();
    let late = ValidationOptions::new("bookverse", datetime!(2026-10-17 12:31 UTC));
    let validation = validate_report_text(&raw, late).unwrap();
    assert!(!validation.is_valid());
    assert!(validation.is_stale_only());
}

#[test]
fn custom_age_limit_applies() {
    let raw = fresh_report().to_json_pretty().unwrap();
    let mut strict = options();
    strict.max_age = Duration::minutes(5);
    assert_eq!(failing_names(&raw, strict), vec!["fresh"]);
}

#[test]
fn future_timestamp_is_rejected() {
    let raw = mutate(|value| value["metadata"]["timestamp"] = json!("2026-10-17T13:00:00Z"));
    assert_eq!(failing_names(&raw, options()), vec!["not_future"]);
}

#[test]
fn future_timestamp_is_not_stale_only() {
    let raw = mutate(|value| value["metadata"]["timestamp"] = json!("2026-10-17T13:00:00Z"));
    let validation = validate_report_text(&raw, options()).unwrap();
    assert!(!validation.is_valid());
    assert!(!validation.is_stale_only());
}

#[test]
fn small_clock_skew_is_tolerated() {
    let raw = mutate(|value| value["metadata"]["timestamp"] = json!("2026-10-17T12:13:00Z"));
    assert!(failing_names(&raw, options()).is_empty());
}

#[test]
fn unparseable_timestamp_is_rejected() {
    let raw = mutate(|value| value["metadata"]["timestamp"] = json!("yesterday"));
    assert_eq!(failing_names(&raw, options()), vec!["timestamp"]);
}

#[test]
fn project_mismatch_is_rejected() {
    let raw = fresh_report().to_json_pretty().unwrap();
    let other = ValidationOptions::new("other", datetime!(2026-10-17 12:10 UTC));
    assert_eq!(failing_names(&raw, other), vec!["project"]);
}

#[test]
fn total_mismatch_is_rejected() {
    let raw = mutate(|value| value["metadata"]["total_items"] = json!(7));
    assert_eq!(failing_names(&raw, options()), vec!["totals"]);
}

#[test]
fn unknown_status_fails_schema() {
    let raw = mutate(|value| value["status"] = json!("done"));
    let names = failing_names(&raw, options());
    assert!(names.contains(&"schema"));
    assert!(names.contains(&"structure"));
}

#[test]
fn zeroed_report_validates_only_as_completed() {
    let mut report = fresh_report();
    report.zero_out(datetime!(2026-10-17 12:05 UTC));
    let raw = report.to_json_pretty().unwrap();
    let validation = validate_report_text(&raw, options()).unwrap();
    let names: Vec<_> = validation.failures().map(|check| check.name).collect();
    assert_eq!(names, vec!["status"]);
    assert_eq!(
        validation.report.as_ref().unwrap().status,
        ReportStatus::CleanupCompleted
    );
}

#[test]
fn write_then_read_roundtrips_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".github").join("cleanup-report.json");
    let mut report = fresh_report();
    report.mark_stale();
    write_report(&path, &report).unwrap();
    let raw = read_report_text(&path).unwrap();
    let parsed: CleanupReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.status, ReportStatus::StaleReport);
    assert_eq!(parsed.plan, report.plan);
}
