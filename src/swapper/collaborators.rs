//! External collaborators of the swap pipeline.
//!
//! Each collaborator has a narrow file contract: it receives tree paths, may
//! change files inside the new tree, and either succeeds or fails with a
//! descriptive error. The default implementations shell out through
//! [`ExternalCommand`] and [`GitCommand`]; tests substitute their own.

use anyhow::Result;
use futures::future::BoxFuture;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RegeneratorConfig;
use crate::core::{UpdaterError, classify};
use crate::git::command_builder::GitCommand;
use crate::process::ExternalCommand;

/// Applies one local patch to a tree.
pub trait PatchApplier: Send + Sync {
    /// Fails with [`UpdaterError::PatchApplyFailure`] when a hunk does not apply.
    fn apply<'a>(&'a self, tree: &'a Path, patch: &'a Path) -> BoxFuture<'a, Result<()>>;
}

/// Regenerates build descriptors that were produced by a tool.
pub trait DescriptorRegenerator: Send + Sync {
    /// Regenerates inside `new_tree` when `old_tree` asks for it.
    ///
    /// Returns whether a regeneration ran.
    fn regenerate<'a>(&'a self, old_tree: &'a Path, new_tree: &'a Path)
    -> BoxFuture<'a, Result<bool>>;
}

/// Runs the package's post-update hook.
pub trait PostUpdateHook: Send + Sync {
    fn run<'a>(
        &'a self,
        hook: &'a Path,
        old_tree: &'a Path,
        new_tree: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;
}

/// `git apply -p1` confined to the tree being patched.
pub struct GitPatchApplier {
    timeout: Duration,
}

impl GitPatchApplier {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
        }
    }
}

impl PatchApplier for GitPatchApplier {
    fn apply<'a>(&'a self, tree: &'a Path, patch: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let name = patch.file_name().map_or_else(
                || patch.display().to_string(),
                |n| n.to_string_lossy().into_owned(),
            );
            // Stop git from discovering the repository the package lives in
            let ceiling = tree.parent().unwrap_or(tree);

            let result = GitCommand::apply(patch)
                .current_dir(tree)
                .env("GIT_CEILING_DIRECTORIES", ceiling.display().to_string())
                .with_timeout(Some(self.timeout))
                .with_context(&name)
                .execute_success()
                .await;

            match result {
                Ok(()) => {
                    debug!("Applied {name}");
                    Ok(())
                }
                Err(e) => match classify(&e) {
                    UpdaterError::GitCommandError {
                        stderr, ..
                    } => Err(UpdaterError::PatchApplyFailure {
                        patch: name,
                        stderr,
                    }
                    .into()),
                    _ => Err(e),
                },
            }
        })
    }
}

/// Runs the first configured regenerator whose marker appears in the old
/// tree's descriptor.
pub struct CommandRegenerator {
    rules: Vec<RegeneratorConfig>,
    timeout: Duration,
}

impl CommandRegenerator {
    #[must_use]
    pub const fn new(rules: Vec<RegeneratorConfig>, timeout: Duration) -> Self {
        Self {
            rules,
            timeout,
        }
    }

    /// The rule that applies to `old_tree`, if any.
    #[must_use]
    pub fn matching_rule(&self, old_tree: &Path) -> Option<&RegeneratorConfig> {
        self.rules.iter().find(|rule| {
            std::fs::read_to_string(old_tree.join(&rule.descriptor)).is_ok_and(|content| {
                content.lines().take(rule.marker_lines).any(|line| line.contains(&rule.marker))
            })
        })
    }
}

impl DescriptorRegenerator for CommandRegenerator {
    fn regenerate<'a>(
        &'a self,
        old_tree: &'a Path,
        new_tree: &'a Path,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let Some(rule) = self.matching_rule(old_tree) else {
                return Ok(false);
            };
            info!("Regenerating {} with '{}'", rule.descriptor, rule.command);

            let output = ExternalCommand::shell(&rule.command)
                .current_dir(new_tree)
                .with_timeout(self.timeout)
                .with_context(&rule.descriptor)
                .output()
                .await?;
            if !output.success {
                return Err(UpdaterError::RegenerationFailure {
                    command: rule.command.clone(),
                    reason: output.failure_summary(),
                }
                .into());
            }
            if !new_tree.join(&rule.descriptor).is_file() {
                return Err(UpdaterError::RegenerationFailure {
                    command: rule.command.clone(),
                    reason: format!("{} was not produced", rule.descriptor),
                }
                .into());
            }
            Ok(true)
        })
    }
}

/// Runs the hook as `<hook> <old_tree> <new_tree>`, through `sh` unless it is
/// executable.
pub struct ShellHook {
    timeout: Duration,
}

impl ShellHook {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

impl PostUpdateHook for ShellHook {
    fn run<'a>(
        &'a self,
        hook: &'a Path,
        old_tree: &'a Path,
        new_tree: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let command = if is_executable(hook) {
                ExternalCommand::new(hook)
            } else {
                ExternalCommand::new("sh").arg(hook)
            };
            let output = command
                .arg(old_tree)
                .arg(new_tree)
                .current_dir(new_tree)
                .with_timeout(self.timeout)
                .with_context("post-update")
                .output()
                .await?;

            if output.success {
                Ok(())
            } else {
                Err(UpdaterError::PostHookFailure {
                    hook: hook.display().to_string(),
                    reason: output.failure_summary(),
                }
                .into())
            }
        })
    }
}
