//! PROD rollback: quarantine one released version and, when it carried the
//! `latest` tag, hand that tag to the next highest released version.

use anyhow::Result;
use bvo_core::models::AppVersion;
use bvo_core::versioning::{compare_precedence, parse_lenient, sort_desc};
use bvo_jfrog::apptrust::ALL_VERSIONS_LIMIT;
use bvo_jfrog::{JfrogError, VersionPatch, VersionStore};
use serde::Serialize;

use crate::context::OpsContext;
use crate::exit::Exit;

pub const QUARANTINE_TAG: &str = "quarantine";
pub const LATEST_TAG: &str = "latest";
pub const ORIGINAL_TAG_BEFORE_LATEST: &str = "original_tag_before_latest";
pub const ORIGINAL_TAG_BEFORE_QUARANTINE: &str = "original_tag_before_quarantine";

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("version {version} of {application} is not released to PROD")]
    NotInProd {
        application: String,
        version: String,
    },
    #[error(transparent)]
    Platform(#[from] JfrogError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RollbackOutcome {
    pub application: String,
    pub quarantined: String,
    pub previous_tag: String,
    pub was_latest: bool,
    /// Version that now holds `latest`, if the tag moved.
    pub promoted: Option<String>,
    pub dry_run: bool,
}

/// `RELEASED` and `TRUSTED_RELEASE` versions, highest precedence first.
pub fn prod_versions(versions: Vec<AppVersion>) -> Vec<AppVersion> {
    let mut prod: Vec<AppVersion> = versions.into_iter().filter(AppVersion::is_prod).collect();
    sort_desc(&mut prod, |v| v.version.as_str());
    prod
}

fn same_version(a: &str, b: &str) -> bool {
    if a.trim() == b.trim() {
        return true;
    }
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(a), Some(b)) => compare_precedence(&a, &b).is_eq(),
        _ => false,
    }
}

/// Next holder of `latest` from a descending list: the highest version that
/// is neither `target` nor quarantined. Among versions of equal precedence a
/// trusted release wins.
pub fn pick_next_latest<'a>(sorted: &'a [AppVersion], target: &str) -> Option<&'a AppVersion> {
    let candidates: Vec<&AppVersion> = sorted
        .iter()
        .filter(|v| !same_version(&v.version, target))
        .filter(|v| !v.tag.eq_ignore_ascii_case(QUARANTINE_TAG))
        .collect();
    let first = *candidates.first()?;
    let Some(top) = parse_lenient(&first.version) else {
        return Some(first);
    };
    candidates
        .iter()
        .copied()
        .take_while(|v| parse_lenient(&v.version).is_some_and(|p| compare_precedence(&p, &top).is_eq()))
        .find(|v| v.is_trusted())
        .or(Some(first))
}

pub async fn rollback(
    store: &dyn VersionStore,
    application: &str,
    version: &str,
    dry_run: bool,
) -> Result<RollbackOutcome, RollbackError> {
    let prod = prod_versions(store.list_versions(application, ALL_VERSIONS_LIMIT).await?);
    let Some(target) = prod.iter().find(|v| v.version.trim() == version.trim()) else {
        return Err(RollbackError::NotInProd {
            application: application.to_string(),
            version: version.to_string(),
        });
    };

    let was_latest = target.tag == LATEST_TAG;
    let quarantine = VersionPatch::tag(QUARANTINE_TAG)
        .with_property(ORIGINAL_TAG_BEFORE_QUARANTINE, vec![target.tag.clone()]);
    if dry_run {
        tracing::info!("would tag {application}@{} as {QUARANTINE_TAG}", target.version);
    } else {
        store.patch_version(application, &target.version, &quarantine).await?;
        tracing::info!("✅ quarantined {application}@{}", target.version);
    }

    let mut promoted = None;
    if was_latest {
        match pick_next_latest(&prod, &target.version) {
            Some(next) => {
                let patch = VersionPatch::tag(LATEST_TAG)
                    .with_property(ORIGINAL_TAG_BEFORE_LATEST, vec![next.tag.clone()]);
                if dry_run {
                    tracing::info!("would tag {application}@{} as {LATEST_TAG}", next.version);
                } else {
                    store.patch_version(application, &next.version, &patch).await?;
                    tracing::info!("✅ {application}@{} is now {LATEST_TAG}", next.version);
                }
                promoted = Some(next.version.clone());
            }
            None => {
                tracing::warn!("⚠️ no remaining PROD version of {application}; nothing holds {LATEST_TAG}");
            }
        }
    }

    Ok(RollbackOutcome {
        application: application.to_string(),
        quarantined: target.version.clone(),
        previous_tag: target.tag.clone(),
        was_latest,
        promoted,
        dry_run,
    })
}

pub async fn run(ctx: &OpsContext, application: &str, version: &str, dry_run: bool) -> Result<Exit> {
    let client = ctx.client()?;
    let outcome = rollback(&client, application, version, dry_run).await?;
    ctx.emit(&outcome)?;
    Ok(Exit::Success)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Versions held in memory, newest first like the platform listing.
    struct MemoryStore {
        versions: Mutex<Vec<AppVersion>>,
        patches: Mutex<Vec<(String, VersionPatch)>>,
    }

    impl MemoryStore {
        fn new(versions: &[(&str, &str, &str)]) -> Self {
            Self {
                versions: Mutex::new(
                    versions
                        .iter()
                        .map(|(v, tag, status)| AppVersion::new(v, tag, status))
                        .collect(),
                ),
                patches: Mutex::new(Vec::new()),
            }
        }

        fn tag(&self, version: &str) -> String {
            self.versions
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.version == version)
                .map(|v| v.tag.clone())
                .unwrap()
        }

        fn properties(&self, version: &str) -> BTreeMap<String, Vec<String>> {
            self.versions
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.version == version)
                .map(|v| v.properties.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl VersionStore for MemoryStore {
        async fn list_versions(&self, _app: &str, limit: u32) -> Result<Vec<AppVersion>, JfrogError> {
            Ok(self
                .versions
                .lock()
                .unwrap()
                .iter()
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn patch_version(
            &self,
            _app: &str,
            version: &str,
            patch: &VersionPatch,
        ) -> Result<(), JfrogError> {
            self.patches
                .lock()
                .unwrap()
                .push((version.to_string(), patch.clone()));
            let mut versions = self.versions.lock().unwrap();
            let entry = versions.iter_mut().find(|v| v.version == version).unwrap();
            if let Some(tag) = &patch.tag {
                entry.tag = tag.clone();
            }
            if let Some(props) = &patch.properties {
                entry.properties.extend(props.clone());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn latest_moves_to_next_highest_version() {
        let store = MemoryStore::new(&[
            ("1.3.0", "latest", "RELEASED"),
            ("1.2.0", "release", "RELEASED"),
            ("1.1.0", "release", "RELEASED"),
            ("1.4.0-rc.1", "candidate", "PRE_RELEASE"),
        ]);
        let outcome = rollback(&store, "bookverse-web", "1.3.0", false).await.unwrap();

        assert!(outcome.was_latest);
        assert_eq!(outcome.promoted.as_deref(), Some("1.2.0"));
        assert_eq!(store.tag("1.3.0"), QUARANTINE_TAG);
        assert_eq!(store.properties("1.3.0")[ORIGINAL_TAG_BEFORE_QUARANTINE], ["latest"]);
        assert_eq!(store.tag("1.2.0"), LATEST_TAG);
        assert_eq!(store.properties("1.2.0")[ORIGINAL_TAG_BEFORE_LATEST], ["release"]);
        assert_eq!(store.tag("1.4.0-rc.1"), "candidate");
    }

    #[tokio::test]
    async fn non_latest_rollback_leaves_latest_alone() {
        let store = MemoryStore::new(&[
            ("2.0.0", "latest", "TRUSTED_RELEASE"),
            ("1.9.0", "release", "RELEASED"),
        ]);
        let outcome = rollback(&store, "app", "1.9.0", false).await.unwrap();

        assert!(!outcome.was_latest);
        assert_eq!(outcome.promoted, None);
        assert_eq!(store.tag("2.0.0"), LATEST_TAG);
        assert_eq!(store.tag("1.9.0"), QUARANTINE_TAG);
        assert_eq!(store.patches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn single_version_leaves_no_latest() {
        let store = MemoryStore::new(&[("1.0.0", "latest", "RELEASED")]);
        let outcome = rollback(&store, "app", "1.0.0", false).await.unwrap();

        assert_eq!(outcome.promoted, None);
        assert_eq!(store.tag("1.0.0"), QUARANTINE_TAG);
        let versions = store.versions.lock().unwrap();
        assert!(versions.iter().all(|v| v.tag != LATEST_TAG));
    }

    #[tokio::test]
    async fn quarantined_versions_are_not_promoted() {
        let store = MemoryStore::new(&[
            ("3.0.0", "latest", "RELEASED"),
            ("2.0.0", "quarantine", "RELEASED"),
            ("1.0.0", "release", "RELEASED"),
        ]);
        let outcome = rollback(&store, "app", "3.0.0", false).await.unwrap();
        assert_eq!(outcome.promoted.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn unknown_or_unreleased_target_is_rejected() {
        let store = MemoryStore::new(&[
            ("1.0.0", "latest", "RELEASED"),
            ("1.1.0", "", "PRE_RELEASE"),
        ]);
        let err = rollback(&store, "app", "1.1.0", false).await.unwrap_err();
        assert!(matches!(err, RollbackError::NotInProd { .. }));
        assert!(store.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_sends_no_patches() {
        let store = MemoryStore::new(&[
            ("1.1.0", "latest", "RELEASED"),
            ("1.0.0", "", "RELEASED"),
        ]);
        let outcome = rollback(&store, "app", "1.1.0", true).await.unwrap();
        assert_eq!(outcome.promoted.as_deref(), Some("1.0.0"));
        assert!(store.patches.lock().unwrap().is_empty());
        assert_eq!(store.tag("1.1.0"), LATEST_TAG);
    }

    #[test]
    fn duplicates_prefer_trusted_release() {
        let sorted = prod_versions(vec![
            AppVersion::new("2.0.0", "latest", "RELEASED"),
            AppVersion::new("1.5.0", "a", "RELEASED"),
            AppVersion::new("v1.5.0", "b", "TRUSTED_RELEASE"),
            AppVersion::new("1.4.0", "c", "TRUSTED_RELEASE"),
        ]);
        let next = pick_next_latest(&sorted, "2.0.0").unwrap();
        assert_eq!(next.tag, "b");
    }

    #[test]
    fn unparseable_versions_sort_last() {
        let sorted = prod_versions(vec![
            AppVersion::new("nightly", "", "RELEASED"),
            AppVersion::new(" v1.10.0 ", "", "RELEASED"),
            AppVersion::new("1.9.0", "", "RELEASED"),
        ]);
        let order: Vec<&str> = sorted.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order, [" v1.10.0 ", "1.9.0", "nightly"]);
    }
}
