//! GitHub Actions file hand-offs: `$GITHUB_STEP_SUMMARY` markdown and
//! `$GITHUB_ENV` exports. Both are no-ops outside of Actions.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;

static NON_ENV_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Z0-9_]+").expect("valid env key regex"));

/// An append-only file named by an environment variable.
#[derive(Clone, Debug, Default)]
pub struct ActionsFile {
    path: Option<PathBuf>,
}

impl ActionsFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn step_summary() -> Self {
        Self::from_var("GITHUB_STEP_SUMMARY")
    }

    pub fn github_env() -> Self {
        Self::from_var("GITHUB_ENV")
    }

    fn from_var(name: &str) -> Self {
        Self::new(
            std::env::var_os(name)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        )
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends `text`; returns whether anything was written.
    pub fn append(&self, text: &str) -> io::Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        Ok(true)
    }

    /// Writes `KEY=value` lines.
    pub fn export<'a, I>(&self, pairs: I) -> io::Result<bool>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let body: String = pairs
            .into_iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect();
        if body.is_empty() {
            return Ok(false);
        }
        self.append(&body)
    }
}

/// `DOCKER_TAG_` + `recommendations-worker` -> `DOCKER_TAG_RECOMMENDATIONS_WORKER`.
pub fn env_key(prefix: &str, name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    let cleaned = NON_ENV_CHARS.replace_all(&upper, "_");
    format!("{prefix}{}", cleaned.trim_matches('_'))
}

/// Markdown block with a heading and one bullet per line.
pub fn markdown_section(title: &str, lines: &[String]) -> String {
    let mut out = format!("## {title}\n\n");
    if lines.is_empty() {
        out.push_str("_nothing to report_\n");
    }
    for line in lines {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}
