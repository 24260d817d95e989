use thiserror::Error;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("repository must look like owner/name, got `{0}`")]
    InvalidRepo(String),
    #[error("a GitHub token is required for {0}")]
    MissingToken(&'static str),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("`{command}` printed unexpected output: {source}")]
    Output {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("transport error calling GitHub: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("repository dispatch to {repo} returned HTTP {status}: {body}")]
    Dispatch {
        repo: String,
        status: u16,
        body: String,
    },
}
