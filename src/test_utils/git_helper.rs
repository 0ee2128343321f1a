//! Git test helper utilities
//!
//! Builds throwaway repositories that serve as local upstreams, so that tests
//! exercise real `git ls-remote` and `git fetch` without network access.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git command wrapper for tests.
///
/// Use this instead of raw `std::process::Command` for git operations in tests.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run_git_command(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }

        Ok(output)
    }

    /// Create a new TestGit instance for the given repository path
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Return the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Create the directory and initialize a repository on branch `main`
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.repo_path)
            .with_context(|| format!("Failed to create {}", self.repo_path.display()))?;
        self.run_git_command(&["init", "--quiet"], "Failed to initialize git repository")?;
        self.run_git_command(
            &["symbolic-ref", "HEAD", "refs/heads/main"],
            "Failed to set default branch",
        )?;
        self.config_user()
    }

    /// Configure a test identity and disable signing
    pub fn config_user(&self) -> Result<()> {
        for (key, value) in [
            ("user.email", "test@vendup.example"),
            ("user.name", "Test User"),
            ("commit.gpgsign", "false"),
            ("tag.gpgsign", "false"),
        ] {
            self.run_git_command(
                &["config", key, value],
                &format!("Failed to configure {key}"),
            )?;
        }
        Ok(())
    }

    /// Initialize and create a first commit containing `README.md`
    pub fn init_with_commit(&self) -> Result<()> {
        self.init()?;
        self.commit_file("README.md", "# test upstream\n")
    }

    /// Write `path` and commit it
    pub fn commit_file(&self, path: &str, content: &str) -> Result<()> {
        let full = self.repo_path.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)
            .with_context(|| format!("Failed to write {}", full.display()))?;
        self.add_all()?;
        self.commit(&format!("Update {path}"))
    }

    /// Add all files to staging
    pub fn add_all(&self) -> Result<()> {
        self.run_git_command(&["add", "--all"], "Failed to add files to git")?;
        Ok(())
    }

    /// Create a commit with the given message
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_git_command(&["commit", "--quiet", "-m", message], "Failed to create git commit")?;
        Ok(())
    }

    /// Create a lightweight tag
    pub fn tag(&self, tag_name: &str) -> Result<()> {
        self.run_git_command(&["tag", tag_name], &format!("Failed to create tag: {tag_name}"))?;
        Ok(())
    }

    /// Current commit SHA
    pub fn head(&self) -> Result<String> {
        let output = self.run_git_command(&["rev-parse", "HEAD"], "Failed to get commit hash")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<String> {
        let output = self
            .run_git_command(&["branch", "--show-current"], "Failed to get current branch name")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Get porcelain status output
    pub fn status_porcelain(&self) -> Result<String> {
        let output =
            self.run_git_command(&["status", "--porcelain"], "Failed to get git status")?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Subject of the latest commit
    pub fn last_subject(&self) -> Result<String> {
        let output =
            self.run_git_command(&["log", "-1", "--format=%s"], "Failed to read git log")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
