// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Bounded execution of external Slurm commands.
//!
//! Every invocation is timed into [`Telemetry`]. Failures are recorded and
//! turned into empty output so that one broken command never aborts a scrape.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::error::RunError;
use crate::telemetry::Telemetry;

/// Default per-invocation timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of stderr bytes kept for logging
const STDERR_EXCERPT: usize = 512;

/// A pre-tokenized command line.
///
/// Arguments are stored individually, so an argument may contain spaces
/// (e.g. `sinfo -o "%n %G"` becomes the two arguments `-o` and `%n %G`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv slice whose first element is the program.
    pub fn from_argv(argv: &[&str]) -> Self {
        match argv.split_first() {
            Some((program, args)) => Self::new(*program, args.iter().copied()),
            None => Self::new("", Vec::<String>::new()),
        }
    }

}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Where an adapter's raw text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Run an external command
    Command(CommandLine),
    /// Read a file verbatim (fixture mode)
    Fixture(PathBuf),
}

impl Source {
    /// Label used for telemetry and logs
    pub fn label(&self) -> String {
        match self {
            Source::Command(cmd) => cmd.to_string(),
            Source::Fixture(path) => path.display().to_string(),
        }
    }
}

/// Runs commands under a timeout and records the outcome.
pub struct CommandRunner {
    timeout: Duration,
    telemetry: Arc<Telemetry>,
}

impl CommandRunner {
    pub fn new(timeout: Duration, telemetry: Arc<Telemetry>) -> Self {
        Self { timeout, telemetry }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Fetch raw text from a source. Failures are recorded and yield `""`.
    pub async fn fetch(&self, source: &Source) -> String {
        self.fetch_checked(source).await.unwrap_or_default()
    }

    /// Like [`fetch`](Self::fetch), but a failure (already logged and
    /// recorded) yields `None`, so it can be told apart from empty output.
    pub async fn fetch_checked(&self, source: &Source) -> Option<String> {
        match self.try_fetch(source).await {
            Ok(out) => Some(out),
            Err(e) => {
                self.report(&source.label(), &e);
                None
            }
        }
    }

    /// Like [`fetch`](Self::fetch) but hands the error back instead of recording it.
    pub async fn try_fetch(&self, source: &Source) -> Result<String, RunError> {
        match source {
            Source::Command(cmd) => self.try_run_with(cmd, self.timeout).await,
            Source::Fixture(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| RunError::Fixture {
                    path: path.clone(),
                    source,
                }),
        }
    }

    #[cfg(test)]
    /// Run a command with the default timeout. Failures are recorded and yield `""`.
    pub async fn run(&self, cmd: &CommandLine) -> String {
        self.run_with(cmd, self.timeout).await
    }

    /// Run a command with an explicit timeout. Failures are recorded and yield `""`.
    pub async fn run_with(&self, cmd: &CommandLine, timeout: Duration) -> String {
        match self.try_run_with(cmd, timeout).await {
            Ok(out) => out,
            Err(e) => {
                self.report(&cmd.to_string(), &e);
                String::new()
            }
        }
    }

    fn report(&self, label: &str, e: &RunError) {
        match e {
            RunError::ExitStatus { stderr, .. } => {
                tracing::warn!(source = label, error = %e, stderr = %stderr, "Command failed")
            }
            RunError::Fixture { .. } => tracing::warn!(source = label, error = %e, "Fixture read failed"),
            _ => tracing::warn!(source = label, error = %e, "Command failed"),
        }
        self.telemetry.record_error(label, &e.reason());
    }

    /// Execute `cmd`, killing it if it outlives `timeout`.
    ///
    /// The attempt's duration is always recorded; the error is not.
    pub async fn try_run_with(&self, cmd: &CommandLine, timeout: Duration) -> Result<String, RunError> {
        let started = Instant::now();
        let result = execute(cmd, timeout).await;
        let elapsed = started.elapsed();
        self.telemetry
            .observe_duration(&cmd.to_string(), elapsed.as_secs_f64());
        tracing::debug!(command = %cmd, elapsed_ms = elapsed.as_millis() as u64, ok = result.is_ok(), "Command finished");
        result
    }
}

async fn execute(cmd: &CommandLine, timeout: Duration) -> Result<String, RunError> {
    if cmd.program.is_empty() {
        return Err(RunError::EmptyCommand);
    }

    // kill_on_drop: when the timeout fires the wait future (and child) is
    // dropped, which sends SIGKILL. Same on scrape cancellation.
    let child = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(RunError::Launch)?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(RunError::Launch)?,
        Err(_) => return Err(RunError::Timeout(timeout)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
        return Err(RunError::ExitStatus {
            status: output.status,
            stderr: excerpt,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
