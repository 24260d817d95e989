//! BookVerse platform operations core types.
//!
//! Everything here is free of network access: the blueprint describing the
//! demo, configuration resolution, the cleanup report hand-off, the HTTP
//! outcome taxonomy, SemVer helpers and the small renderers used for GitHub
//! step summaries.
pub mod blueprint;
pub mod config;
pub mod models;
pub mod outcome;
pub mod promotion;
pub mod provision;
pub mod report;
pub mod summary;
pub mod version_map;
pub mod versioning;

pub use blueprint::{Blueprint, BlueprintError, PackageKind, RepositoryPlan, ServiceSpec};
pub use config::{ConfigError, ConfigInputs, JfrogConnection, PlatformConfig};
pub use outcome::{ApiOutcome, is_retryable_status};
pub use provision::{ProvisionReport, ProvisionReportBuilder, ReportMode};
pub use report::{
    CleanupPlan, CleanupReport, ReportError, ReportStatus, ReportValidation, ResourceDescriptor,
    ResourceKind, ValidationOptions,
};
pub use version_map::{VersionMap, VersionMapError};
