//! Carries local files from the old tree into the new one.

use anyhow::Result;
use glob::Pattern;
use std::path::Path;
use tracing::debug;

use crate::core::UpdaterError;
use crate::utils::fs::copy_entry;

/// Copies top-level entries of `old` matching `patterns` into `new`.
///
/// An entry is only copied when `new` has nothing at that name; content
/// shipped by upstream always wins. Returns the copied names in sorted order.
pub fn carry_over(old: &Path, new: &Path, patterns: &[String]) -> Result<Vec<String>> {
    let patterns = patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| UpdaterError::ConfigError {
                message: format!("invalid preservation pattern '{p}': {e}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut names: Vec<String> = std::fs::read_dir(old)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| patterns.iter().any(|p| p.matches(name)))
        .collect();
    names.sort();

    let mut copied = Vec::new();
    for name in names {
        let target = new.join(&name);
        if target.symlink_metadata().is_ok() {
            debug!("Keeping upstream {name}");
            continue;
        }
        copy_entry(&old.join(&name), &target)?;
        copied.push(name);
    }
    Ok(copied)
}
