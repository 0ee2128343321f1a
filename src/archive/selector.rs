//! Picks the release asset that best matches the previously used one.
//!
//! Releases often publish several platform or format variants. Choosing the
//! name closest to the previous asset (by edit distance) keeps following the
//! same variant across version bumps without relying on stable asset names.

use strsim::levenshtein;

use crate::upstream::Asset;

/// Archive suffixes recognized as a single extension.
const COMPOUND_EXTENSIONS: &[&str] =
    &[".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".zip", ".tar", ".crate"];

/// Extension of an asset file name, with compound archive suffixes kept whole.
#[must_use]
pub fn archive_extension(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if let Some(ext) = COMPOUND_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext)) {
        return (*ext).to_string();
    }
    lower.rfind('.').map(|i| lower[i..].to_string()).unwrap_or_default()
}

pub struct ArchiveSelector;

impl ArchiveSelector {
    /// Index of the candidate closest to `previous`.
    ///
    /// Minimum edit distance wins; ties go to a candidate with the same
    /// extension as `previous`, then to the earliest in listing order.
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn select_index<S: AsRef<str>>(previous: &str, candidates: &[S]) -> Option<usize> {
        let previous_ext = archive_extension(previous);
        candidates
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let name = name.as_ref();
                let distance = levenshtein(previous, name);
                let other_ext = archive_extension(name) != previous_ext;
                ((distance, other_ext), index)
            })
            .min_by_key(|(key, _)| *key)
            .map(|(_, index)| index)
    }

    /// Name of the candidate closest to `previous`.
    #[must_use]
    pub fn select<'a, S: AsRef<str>>(previous: &str, candidates: &'a [S]) -> Option<&'a str> {
        Self::select_index(previous, candidates).map(|i| candidates[i].as_ref())
    }

    /// Asset whose name is closest to `previous`.
    #[must_use]
    pub fn select_asset<'a>(previous: &str, assets: &'a [Asset]) -> Option<&'a Asset> {
        let names: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
        Self::select_index(previous, &names).map(|i| &assets[i])
    }
}
