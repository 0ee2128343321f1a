//! Shared fixtures for the vendup integration tests
//!
//! Every test gets its own temporary workspace containing a local git
//! upstream and a source root holding vendored packages, so no test touches
//! the network or the user's configuration.

// Not every helper is used by every test module
#![allow(dead_code)]

use anyhow::{Context, Result};
use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vendup::test_utils::{TestGit, write_package};

/// Patch that applies cleanly on top of upstream `v2.0`.
pub const PATCH_OK: &str =
    "--- a/src.c\n+++ b/src.c\n@@ -1 +1 @@\n-int version = 2;\n+int version = 2; /* local */\n";

/// Patch whose context matches no upstream version.
pub const PATCH_BAD: &str =
    "--- a/src.c\n+++ b/src.c\n@@ -1 +1 @@\n-int version = 7;\n+int version = 8;\n";

/// A temporary source root plus a local upstream repository.
///
/// The upstream has tags `v1.0` and `v2.0`; `src.c` and `LICENSE` differ
/// between them.
pub struct TestWorkspace {
    temp: TempDir,
    root: PathBuf,
    upstream: TestGit,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new().context("Failed to create temp dir")?;
        let root = temp.path().join("src");
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(temp.path().join("home"))?;

        let upstream = TestGit::new(temp.path().join("upstream"));
        std::fs::create_dir_all(upstream.repo_path())?;
        upstream.init_with_commit()?;
        upstream.commit_file("src.c", "int version = 1;\n")?;
        upstream.commit_file("LICENSE", "upstream license v1\n")?;
        upstream.tag("v1.0")?;
        upstream.commit_file("src.c", "int version = 2;\n")?;
        upstream.commit_file("LICENSE", "upstream license v2\n")?;
        upstream.tag("v2.0")?;

        Ok(Self {
            temp,
            root,
            upstream,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upstream(&self) -> &TestGit {
        &self.upstream
    }

    pub fn upstream_url(&self) -> String {
        self.upstream.repo_path().display().to_string()
    }

    /// Vendors the upstream's `v1.0` content at `relative`, recorded as `version`.
    pub fn add_package(&self, relative: &str, version: &str) -> Result<PathBuf> {
        let package = self.root.join(relative);
        write_package(&package, version, "GIT", &self.upstream_url())?;
        std::fs::write(package.join("README.md"), "# test upstream\n")?;
        std::fs::write(package.join("src.c"), "int version = 1;\n")?;
        std::fs::write(package.join("LICENSE"), "vendored license\n")?;
        Ok(package)
    }

    /// Adds a local patch to `package`.
    pub fn add_patch(&self, package: &Path, name: &str, content: &str) -> Result<()> {
        let dir = package.join("patches");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(name), content)?;
        Ok(())
    }

    /// The `vendup` binary, isolated from the caller's environment.
    pub fn vendup(&self) -> Command {
        let mut cmd = Command::cargo_bin("vendup").expect("vendup binary");
        cmd.current_dir(&self.root)
            .env("HOME", self.temp.path().join("home"))
            .env("VENDUP_NO_PROGRESS", "1")
            .env("NO_COLOR", "1")
            .env_remove("VENDUP_CONFIG")
            .env_remove("VENDUP_ROOT")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Names of the entries next to `package`.
    pub fn siblings(&self, package: &Path) -> Vec<String> {
        let parent = package.parent().expect("package has a parent");
        let mut names: Vec<String> = std::fs::read_dir(parent)
            .expect("readable parent")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
