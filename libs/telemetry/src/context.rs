use tracing::Span;
use uuid::Uuid;

/// Labels shared by every log line and metric of one command invocation.
#[derive(Debug, Clone)]
pub struct RunLabels {
    pub run_id: Uuid,
    pub project: String,
    pub command: String,
}

impl RunLabels {
    pub fn new(project: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project: project.into(),
            command: command.into(),
        }
    }

    /// Root span for the run; enter it for the lifetime of the command.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "bookverse_run",
            run_id = %self.run_id,
            project = %self.project,
            command = %self.command,
        )
    }
}
