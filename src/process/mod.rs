//! Timeout-bounded external processes.
//!
//! [`ExternalCommand`] is the non-git sibling of
//! [`crate::git::command_builder::GitCommand`]: a fluent builder that runs a
//! program with captured output, logs under the `process` tracing target and
//! enforces a time budget. Children are killed when the future is dropped, so
//! cancelling a package run never leaves a stray hook or regenerator behind.
//!
//! A non-zero exit status is not an error at this layer. Callers inspect
//! [`ProcessOutput::success`] and map failures onto their own error variant.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::PROCESS_TIMEOUT;
use crate::core::UpdaterError;
use crate::utils::platform::get_shell_command;

/// Builder for an external command.
pub struct ExternalCommand {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Duration,
    context: Option<String>,
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// A one-line failure summary: exit status plus the most useful output.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        let status = self.code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit status {c}"));
        let output = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if output.is_empty() {
            status
        } else {
            format!("{status}: {output}")
        }
    }
}

impl ExternalCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: PROCESS_TIMEOUT,
            context: None,
        }
    }

    /// Runs `script` through the platform shell (`sh -c` / `cmd /C`).
    pub fn shell(script: &str) -> Self {
        let (shell, flag) = get_shell_command();
        Self::new(shell).arg(flag).arg(script)
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub const fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label used in log lines, typically the package name.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn display_command(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command to completion.
    ///
    /// Fails with [`UpdaterError::ProcessTimeout`] when the budget runs out and
    /// with an I/O error when the program cannot be started.
    pub async fn output(self) -> Result<ProcessOutput> {
        let start = Instant::now();
        let command_line = self.display_command();
        let ctx = self.context.as_deref().unwrap_or("-");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "process", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        tracing::debug!(target: "process", "({}) Executing command: {}", ctx, command_line);

        let output = match timeout(self.timeout_duration, cmd.output()).await {
            Ok(result) => result.with_context(|| format!("Failed to execute {command_line}"))?,
            Err(_) => {
                tracing::warn!(
                    target: "process",
                    "({}) Command timed out after {} seconds: {}",
                    ctx,
                    self.timeout_duration.as_secs(),
                    command_line
                );
                return Err(UpdaterError::ProcessTimeout {
                    command: command_line,
                    seconds: self.timeout_duration.as_secs(),
                }
                .into());
            }
        };

        let result = ProcessOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if result.success {
            if !result.stdout.trim().is_empty() {
                tracing::debug!(target: "process", "({}) {}", ctx, result.stdout.trim());
            }
        } else {
            tracing::debug!(
                target: "process",
                "({}) Command failed with exit code: {:?}",
                ctx,
                result.code
            );
            if !result.stderr.trim().is_empty() {
                tracing::debug!(target: "process", "({}) Error: {}", ctx, result.stderr.trim());
            }
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "process::perf", "({}) {} took {:.2}s", ctx, command_line, elapsed.as_secs_f64());
        }

        Ok(result)
    }
}
