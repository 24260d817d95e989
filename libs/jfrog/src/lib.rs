//! HTTP client for the JFrog Platform services the BookVerse tools drive:
//! Access, Artifactory, AppTrust, unified policies and events.
//!
//! Every call returns the raw status and body as an [`ApiResponse`]; callers
//! classify it through [`bvo_core::ApiOutcome`]. Transport failures, throttling
//! and server errors are retried according to the client's [`RetryPolicy`].

pub mod access;
pub mod apptrust;
pub mod artifactory;
pub mod client;
pub mod events;
pub mod oidc;
pub mod policy;
pub mod retry;

pub use apptrust::{VersionPatch, VersionStore};
pub use client::{ApiResponse, JfrogClient, JfrogError, RequestBody};
pub use retry::RetryPolicy;
