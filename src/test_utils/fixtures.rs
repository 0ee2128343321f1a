//! Package fixtures.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::METADATA_FILE;

/// A minimal `METADATA.toml` with a single URL entry.
#[must_use]
pub fn metadata_toml(version: &str, kind: &str, url: &str) -> String {
    format!(
        r#"name = "fixture"
description = "Vendored test package"

[third_party]
version = "{version}"

[[third_party.url]]
type = "{kind}"
value = '{url}'
"#
    )
}

/// Creates `dir` (and parents) with a metadata record.
pub fn write_package(dir: &Path, version: &str, kind: &str, url: &str) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(dir.join(METADATA_FILE), metadata_toml(version, kind, url))
        .with_context(|| format!("Failed to write metadata in {}", dir.display()))
}

/// Every path under `dir` with its content; directories map to `None`.
///
/// Two equal snapshots mean the trees are byte-identical.
#[must_use]
pub fn tree_snapshot(dir: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .map(|entry| {
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path()).to_path_buf();
            let content = entry.file_type().is_file().then(|| std::fs::read(entry.path()).unwrap_or_default());
            (relative, content)
        })
        .collect()
}
