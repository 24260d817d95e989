//! GitHub side of the BookVerse tooling. Repository settings go through the
//! `gh` CLI behind the [`CommandRunner`] seam; repository dispatch uses the
//! REST API directly.

pub mod dispatch;
pub mod error;
pub mod gh;
pub mod runner;

pub use dispatch::DispatchClient;
pub use error::GithubError;
pub use gh::{GhCli, RepoCreation, RepoRef};
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};

#[cfg(any(test, feature = "test-support"))]
pub use runner::RecordingRunner;
