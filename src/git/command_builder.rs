//! Type-safe git command builder.
//!
//! Every git invocation in vendup goes through [`GitCommand`]: it adds `-C`
//! for the working directory, disables interactive credential prompts, applies
//! a timeout, logs under the `git` target and maps failures onto
//! [`UpdaterError`] variants.
//!
//! ```rust,no_run
//! use vendup::git::command_builder::GitCommand;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let tags = GitCommand::ls_remote_tags("https://github.com/madler/zlib.git")
//!     .execute_stdout()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::{GIT_CLONE_TIMEOUT, GIT_FETCH_TIMEOUT, PROCESS_TIMEOUT};
use crate::core::UpdaterError;
use crate::utils::platform::get_git_command;

/// Builder for one git invocation.
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<std::path::PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    context: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            // Never block on a credential prompt
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            timeout_duration: Some(PROCESS_TIMEOUT),
            context: None,
        }
    }
}

/// Captured output of a successful git command.
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs git as if started in `dir` (`git -C <dir>`).
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// `None` disables the timeout.
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label used in log lines, typically the package name.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Runs the command and fails on a non-zero exit status.
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let git_command = get_git_command();
        let mut cmd = Command::new(git_command);

        let mut full_args = Vec::new();
        if let Some(ref dir) = self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());

        cmd.args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let ctx = self.context.as_deref().unwrap_or("-");
        tracing::debug!(
            target: "git",
            "({}) Executing command: {} {}",
            ctx,
            git_command,
            full_args.join(" ")
        );

        for (key, value) in &self.env_vars {
            tracing::trace!(target: "git", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        let output_future = cmd.output();
        let spawn_result = if let Some(duration) = self.timeout_duration {
            if let Ok(result) = timeout(duration, output_future).await {
                result
            } else {
                tracing::warn!(
                    target: "git",
                    "({}) Command timed out after {} seconds: git {}",
                    ctx,
                    duration.as_secs(),
                    full_args.join(" ")
                );
                return Err(UpdaterError::ProcessTimeout {
                    command: format!("git {}", self.operation()),
                    seconds: duration.as_secs(),
                }
                .into());
            }
        } else {
            output_future.await
        };

        let output = match spawn_result {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UpdaterError::GitNotFound.into());
            }
            Err(e) => {
                return Err(e).context(format!("Failed to execute git {}", full_args.join(" ")));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "({}) Command failed with exit code: {:?}",
                ctx,
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "git", "({}) Error: {}", ctx, stderr.trim());
            }

            let operation = match self.args.first().map(String::as_str) {
                Some("ls-remote" | "fetch" | "clone" | "apply" | "checkout") => {
                    self.args.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
                }
                _ => self.operation(),
            };
            return Err(UpdaterError::GitCommandError {
                operation,
                stderr: if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                },
            }
            .into());
        }

        if !stdout.is_empty() {
            tracing::trace!(target: "git", "({}) {}", ctx, stdout.trim());
        }
        if !stderr.is_empty() {
            tracing::debug!(target: "git", "({}) {}", ctx, stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "git::perf", "({}) Git {} took {:.2}s", ctx, self.operation(), elapsed.as_secs_f64());
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(target: "git::perf", "({}) Git {} took {}ms", ctx, self.operation(), elapsed.as_millis());
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Runs the command and returns trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

// Convenience builders for the operations vendup needs

impl GitCommand {
    /// The remote's default branch and its tip: `ls-remote --symref <url> HEAD`.
    pub fn ls_remote_head(url: &str) -> Self {
        Self::new()
            .args(["ls-remote", "--symref", url, "HEAD"])
            .with_timeout(Some(GIT_FETCH_TIMEOUT))
    }

    /// All tags of a remote without peeled entries.
    pub fn ls_remote_tags(url: &str) -> Self {
        Self::new()
            .args(["ls-remote", "--tags", "--refs", url])
            .with_timeout(Some(GIT_FETCH_TIMEOUT))
    }

    /// Every ref of a remote, peeled tags included.
    pub fn ls_remote_all(url: &str) -> Self {
        Self::new().args(["ls-remote", url]).with_timeout(Some(GIT_FETCH_TIMEOUT))
    }

    pub fn init() -> Self {
        Self::new().args(["init", "--quiet"])
    }

    /// Shallow fetch of a single revision into `FETCH_HEAD`.
    pub fn fetch_shallow(url: &str, rev: &str) -> Self {
        Self::new()
            .args(["fetch", "--quiet", "--depth", "1", url, rev])
            .with_timeout(Some(GIT_FETCH_TIMEOUT))
    }

    /// Fetch of a revision with its full history into `FETCH_HEAD`.
    pub fn fetch_history(url: &str, rev: &str) -> Self {
        Self::new()
            .args(["fetch", "--quiet", url, rev])
            .with_timeout(Some(GIT_CLONE_TIMEOUT))
    }

    /// Full clone without checkout, for servers that refuse fetching by hash.
    pub fn clone_no_checkout(url: &str, target: impl AsRef<Path>) -> Self {
        Self::new()
            .args(["clone", "--quiet", "--no-checkout", url])
            .arg(target.as_ref().display().to_string())
            .with_timeout(Some(GIT_CLONE_TIMEOUT))
    }

    pub fn checkout_detached(rev: &str) -> Self {
        Self::new().args(["checkout", "--quiet", "--detach", rev])
    }

    pub fn rev_parse(rev: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", "--quiet"]).arg(format!("{rev}^{{commit}}"))
    }

    /// `git apply` of a `-p1` patch relative to the working directory.
    pub fn apply(patch: impl AsRef<Path>) -> Self {
        Self::new()
            .args(["apply", "-p1", "--whitespace=nowarn"])
            .arg(patch.as_ref().display().to_string())
    }

    pub fn is_inside_work_tree() -> Self {
        Self::new().args(["rev-parse", "--is-inside-work-tree"])
    }

    pub fn add_all(pathspec: impl AsRef<Path>) -> Self {
        Self::new().args(["add", "--all", "--"]).arg(pathspec.as_ref().display().to_string())
    }

    pub fn commit(message: &str) -> Self {
        Self::new().args(["commit", "--quiet", "-m", message])
    }

    /// Starts (or resets) `branch` at `start_point`.
    pub fn checkout_branch(branch: &str, start_point: &str) -> Self {
        Self::new().args(["checkout", "--quiet", "-B", branch, start_point])
    }
}
