//! Git plumbing for commit-tracked upstreams.
//!
//! vendup never keeps a clone of an upstream around. Remote state is read with
//! `git ls-remote`, and content is materialized by fetching exactly one
//! revision into an empty directory, after which the `.git` directory is
//! removed so that only the upstream files remain.

pub mod command_builder;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::{UpdaterError, classify};
use crate::git::command_builder::GitCommand;
use crate::process::ExternalCommand;
use crate::utils::fs::{TempDir, remove_dir_all};
use crate::utils::platform::get_git_command;

/// One line of `git ls-remote` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Full ref name, e.g. `refs/tags/v1.0` or `refs/tags/v1.0^{}`.
    pub name: String,
    /// Object id the ref points to.
    pub object: String,
}

impl RemoteRef {
    /// Tag name for `refs/tags/*` refs, without any `^{}` peel marker.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        self.name.strip_prefix("refs/tags/").map(|t| t.trim_end_matches("^{}"))
    }
}

/// Tip of the remote's default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHead {
    /// Branch `HEAD` points to, when the server advertises it.
    pub branch: Option<String>,
    pub commit: String,
}

/// Parses `git ls-remote` output, skipping `ref:` symref lines.
#[must_use]
pub fn parse_ls_remote(output: &str) -> Vec<RemoteRef> {
    output
        .lines()
        .filter(|line| !line.starts_with("ref:"))
        .filter_map(|line| {
            let (object, name) = line.split_once('\t')?;
            Some(RemoteRef {
                name: name.trim().to_string(),
                object: object.trim().to_string(),
            })
        })
        .collect()
}

fn parse_symref_head(output: &str) -> Result<RemoteHead> {
    let branch = output.lines().find_map(|line| {
        let rest = line.strip_prefix("ref:")?;
        let (target, name) = rest.trim().split_once('\t')?;
        (name.trim() == "HEAD").then(|| target.trim().trim_start_matches("refs/heads/").to_string())
    });
    let commit = parse_ls_remote(output)
        .into_iter()
        .find(|r| r.name == "HEAD")
        .map(|r| r.object)
        .ok_or_else(|| anyhow::anyhow!("remote did not advertise HEAD"))?;
    Ok(RemoteHead {
        branch,
        commit,
    })
}

/// Reads the tip of the remote's default branch.
pub async fn remote_head(url: &str, context: &str) -> Result<RemoteHead> {
    let output = GitCommand::ls_remote_head(url).with_context(context).execute_stdout().await?;
    parse_symref_head(&output).with_context(|| format!("Unexpected ls-remote output from {url}"))
}

/// Lists the tag names of a remote.
pub async fn remote_tags(url: &str, context: &str) -> Result<Vec<String>> {
    let output = GitCommand::ls_remote_tags(url).with_context(context).execute_stdout().await?;
    Ok(parse_ls_remote(&output).iter().filter_map(|r| r.tag_name().map(str::to_string)).collect())
}

/// Lists every ref of a remote, including peeled tag entries.
pub async fn remote_refs(url: &str, context: &str) -> Result<Vec<RemoteRef>> {
    let output = GitCommand::ls_remote_all(url).with_context(context).execute_stdout().await?;
    Ok(parse_ls_remote(&output))
}

/// Whether `commit` can be fetched from `url`.
///
/// Cheap when the commit is a branch tip or tag target; otherwise tries a
/// shallow fetch into a scratch repository. Only a server answer saying the
/// object is unknown counts as `false`; any other failure is returned.
pub async fn commit_exists(url: &str, commit: &str, context: &str) -> Result<bool> {
    let refs = remote_refs(url, context).await?;
    if refs.iter().any(|r| r.object == commit) {
        return Ok(true);
    }

    let scratch = TempDir::new("probe")?;
    GitCommand::init().current_dir(scratch.path()).with_context(context).execute_success().await?;
    let fetched = GitCommand::fetch_shallow(url, commit)
        .current_dir(scratch.path())
        .with_context(context)
        .execute_success()
        .await;
    match fetched {
        Ok(()) => Ok(true),
        Err(e) => match classify(&e) {
            UpdaterError::GitCommandError {
                stderr, ..
            } if is_missing_object(&stderr) => {
                debug!("{url} does not serve {commit}: {stderr}");
                Ok(false)
            }
            _ => Err(e),
        },
    }
}

/// Whether git's complaint means the requested object does not exist remotely.
fn is_missing_object(stderr: &str) -> bool {
    const MARKERS: &[&str] = &[
        "not our ref",
        "couldn't find remote ref",
        "no such remote ref",
        "unadvertised object",
        "not a valid object",
    ];
    let stderr = stderr.to_lowercase();
    MARKERS.iter().any(|marker| stderr.contains(marker))
}

/// Whether `descendant` has `ancestor` in its history on `url`.
///
/// Fetches the history of `descendant` into a scratch repository. An
/// `ancestor` that is not part of that history is not an ancestor.
pub async fn is_ancestor(url: &str, ancestor: &str, descendant: &str, context: &str) -> Result<bool> {
    if ancestor == descendant {
        return Ok(true);
    }

    let scratch = TempDir::new("ancestry")?;
    GitCommand::init().current_dir(scratch.path()).with_context(context).execute_success().await?;
    GitCommand::fetch_history(url, descendant)
        .current_dir(scratch.path())
        .with_context(context)
        .execute_success()
        .await?;

    // `merge-base --is-ancestor` answers with its exit code
    let output = ExternalCommand::new(get_git_command())
        .args(["merge-base", "--is-ancestor", ancestor, "FETCH_HEAD"])
        .current_dir(scratch.path())
        .with_context(context)
        .output()
        .await?;
    match output.code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ if output.stderr.to_lowercase().contains("not a valid") => Ok(false),
        _ => Err(UpdaterError::GitCommandError {
            operation: "merge-base --is-ancestor".to_string(),
            stderr: output.failure_summary(),
        }
        .into()),
    }
}

/// Materializes revision `rev` of `url` into the existing empty directory `dest`.
///
/// Tries a shallow fetch first and falls back to a full clone for servers that
/// refuse to serve arbitrary revisions. The resulting tree contains no `.git`
/// directory and no `.gitmodules` files.
pub async fn fetch_tree(url: &str, rev: &str, dest: &Path, context: &str) -> Result<()> {
    GitCommand::init().current_dir(dest).with_context(context).execute_success().await?;

    let shallow = GitCommand::fetch_shallow(url, rev)
        .current_dir(dest)
        .with_context(context)
        .execute_success()
        .await;

    match shallow {
        Ok(()) => {
            GitCommand::checkout_detached("FETCH_HEAD")
                .current_dir(dest)
                .with_context(context)
                .execute_success()
                .await?;
        }
        Err(e) => {
            warn!("Shallow fetch of {rev} from {url} failed, cloning instead: {e}");
            remove_dir_all(&dest.join(".git"))?;
            GitCommand::clone_no_checkout(url, dest).with_context(context).execute_success().await?;
            GitCommand::checkout_detached(rev)
                .current_dir(dest)
                .with_context(context)
                .execute_success()
                .await?;
        }
    }

    strip_vcs_metadata(dest)?;
    debug!("Fetched {url}@{rev} into {}", dest.display());
    Ok(())
}

/// Removes the top-level `.git` directory and every `.gitmodules` file.
pub fn strip_vcs_metadata(dir: &Path) -> Result<()> {
    remove_dir_all(&dir.join(".git"))?;

    let gitmodules: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == ".gitmodules")
        .map(walkdir::DirEntry::into_path)
        .collect();
    for path in gitmodules {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Whether `dir` is inside a git work tree.
pub async fn is_inside_work_tree(dir: &Path) -> bool {
    GitCommand::is_inside_work_tree()
        .current_dir(dir)
        .execute_stdout()
        .await
        .is_ok_and(|out| out == "true")
}
