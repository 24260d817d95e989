use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::GithubError;

/// One external command. `stdin` carries secret material and is never
/// printed by the `Debug` impl.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            stdin: None,
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// `program arg1 arg2`, suitable for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.args.len() && prefix.iter().zip(&self.args).all(|(p, a)| p == a)
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: &str) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, GithubError>;
}

/// Runs commands as child processes with piped I/O and a wall-clock limit.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, GithubError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| GithubError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        if let (Some(input), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            // the child may exit before reading everything
            let _ = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(GithubError::Spawn {
                    program: invocation.program.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(GithubError::Timeout {
                    command: invocation.display(),
                    secs: self.timeout.as_secs(),
                });
            }
        };
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::RecordingRunner;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use std::sync::Mutex;

    use super::*;

    /// Records every invocation and answers from scripted outputs matched
    /// by argument prefix. Unscripted commands succeed with empty output.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<Invocation>>,
        scripted: Mutex<Vec<(Vec<String>, CommandOutput)>>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, prefix: &[&str], output: CommandOutput) -> &Self {
            self.scripted
                .lock()
                .unwrap()
                .push((prefix.iter().map(|s| s.to_string()).collect(), output));
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_with(&self, prefix: &[&str]) -> Vec<Invocation> {
            self.calls()
                .into_iter()
                .filter(|call| call.starts_with(prefix))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, GithubError> {
            self.calls.lock().unwrap().push(invocation.clone());
            let scripted = self.scripted.lock().unwrap();
            let output = scripted
                .iter()
                .rev()
                .find(|(prefix, _)| {
                    let prefix: Vec<&str> = prefix.iter().map(String::as_str).collect();
                    invocation.starts_with(&prefix)
                })
                .map(|(_, output)| output.clone())
                .unwrap_or_default();
            Ok(output)
        }
    }
}
