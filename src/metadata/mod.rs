//! The per-package metadata record.
//!
//! Every vendored package carries a `METADATA.toml` at its root describing
//! where it came from and which upstream version it currently holds:
//!
//! ```toml
//! name = "zlib"
//!
//! [third_party]
//! version = "v1.3.1"
//! last_upgrade_date = "2024-01-15"
//!
//! [[third_party.url]]
//! type = "GIT"
//! value = "https://github.com/madler/zlib.git"
//! ```
//!
//! [`MetadataStore::load`] parses and validates the record once per run.
//! [`MetadataStore::write_update`] writes the updated record into the staged
//! tree before it replaces the package, so a record that cannot be rewritten
//! aborts the update while the old tree is still in place. The rewrite goes through `toml_edit`, so comments, notes and key
//! order of the hand-maintained file survive; only the version, the date and
//! (for archive upstreams) the URL entry change.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Item, value};
use tracing::debug;

use crate::constants::METADATA_FILE;
use crate::core::UpdaterError;
use crate::utils::fs::atomic_write;

/// Kind of a URL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    /// A git repository; the package tracks a commit or a tag.
    Git,
    /// A downloadable release archive.
    Archive,
    /// A project homepage; only crates.io homepages are updatable.
    Homepage,
    /// Anything else, kept verbatim and ignored.
    Other(String),
}

impl UrlKind {
    fn parse(text: &str) -> Self {
        match text.to_ascii_uppercase().as_str() {
            "GIT" => Self::Git,
            "ARCHIVE" => Self::Archive,
            "HOMEPAGE" => Self::Homepage,
            _ => Self::Other(text.to_string()),
        }
    }
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git => write!(f, "GIT"),
            Self::Archive => write!(f, "ARCHIVE"),
            Self::Homepage => write!(f, "HOMEPAGE"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// One `[[third_party.url]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamLocation {
    pub kind: UrlKind,
    pub address: String,
}

/// A parsed and validated metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// Path of the `METADATA.toml` this was read from.
    pub path: PathBuf,
    pub name: Option<String>,
    pub description: Option<String>,
    /// URL entries in file order. The first one of a supported kind is
    /// authoritative.
    pub urls: Vec<UpstreamLocation>,
    /// Version of the vendored content as recorded by the last update.
    pub version: String,
    pub last_upgrade_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub license_type: Option<String>,
}

impl PackageMetadata {
    /// Directory holding the record, i.e. the package root.
    #[must_use]
    pub fn package_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Display name: the `name` field, else the package directory name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.package_dir()
                .file_name()
                .map_or_else(|| "<unknown>".to_string(), |n| n.to_string_lossy().into_owned())
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: Option<String>,
    description: Option<String>,
    third_party: Option<RawThirdParty>,
}

#[derive(Debug, Deserialize)]
struct RawThirdParty {
    version: Option<String>,
    last_upgrade_date: Option<toml::Value>,
    notes: Option<String>,
    license_type: Option<String>,
    #[serde(default)]
    url: Vec<RawUrl>,
}

#[derive(Debug, Deserialize)]
struct RawUrl {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

/// Changes applied to the record after a successful swap.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    /// New recorded version.
    pub version: String,
    /// New date; `None` leaves the field untouched.
    pub date: Option<NaiveDate>,
    /// `(old, new)` address of the URL entry to rewrite.
    pub replace_url: Option<(String, String)>,
}

/// Reads and writes `METADATA.toml` records.
pub struct MetadataStore;

impl MetadataStore {
    /// Path of the record for the package rooted at `package_dir`.
    #[must_use]
    pub fn path_for(package_dir: &Path) -> PathBuf {
        package_dir.join(METADATA_FILE)
    }

    /// Loads and validates the record of the package at `package_dir`.
    ///
    /// A missing, unreadable or invalid record is a
    /// [`UpdaterError::MetadataError`].
    pub fn load(package_dir: &Path) -> Result<PackageMetadata, UpdaterError> {
        let path = Self::path_for(package_dir);
        let content = std::fs::read_to_string(&path).map_err(|e| UpdaterError::MetadataError {
            path: path.display().to_string(),
            reason: if e.kind() == std::io::ErrorKind::NotFound {
                "file not found".to_string()
            } else {
                e.to_string()
            },
        })?;
        Self::parse(&path, &content)
    }

    /// Parses record text; `path` is used for error messages only.
    pub fn parse(path: &Path, content: &str) -> Result<PackageMetadata, UpdaterError> {
        let invalid = |reason: String| UpdaterError::MetadataError {
            path: path.display().to_string(),
            reason,
        };

        let raw: RawMetadata = toml::from_str(content).map_err(|e| invalid(e.message().to_string()))?;
        let third_party =
            raw.third_party.ok_or_else(|| invalid("missing [third_party] table".to_string()))?;

        let version = third_party.version.map(|v| v.trim().to_string()).unwrap_or_default();
        if version.is_empty() {
            return Err(invalid("third_party.version is empty".to_string()));
        }
        if third_party.url.is_empty() {
            return Err(invalid("no [[third_party.url]] entries".to_string()));
        }

        let last_upgrade_date = match third_party.last_upgrade_date {
            None => None,
            Some(v) => Some(parse_date(&v).map_err(invalid)?),
        };

        Ok(PackageMetadata {
            path: path.to_path_buf(),
            name: raw.name,
            description: raw.description,
            urls: third_party
                .url
                .into_iter()
                .map(|u| UpstreamLocation {
                    kind: UrlKind::parse(&u.kind),
                    address: u.value.trim().to_string(),
                })
                .collect(),
            version,
            last_upgrade_date,
            notes: third_party.notes,
            license_type: third_party.license_type,
        })
    }

    /// Applies `update` to the record at `from` and writes the result to `to`.
    ///
    /// The write is atomic; `from` and `to` may name the same file.
    pub fn write_update(from: &Path, to: &Path, update: &MetadataUpdate) -> Result<()> {
        let content = std::fs::read_to_string(from)
            .with_context(|| format!("Failed to read {}", from.display()))?;
        let rewritten =
            Self::apply_update(&content, update).map_err(|reason| UpdaterError::MetadataError {
                path: from.display().to_string(),
                reason,
            })?;

        atomic_write(to, rewritten.as_bytes())
            .with_context(|| format!("Failed to write {}", to.display()))?;
        debug!("Recorded version {} in {}", update.version, to.display());
        Ok(())
    }

    /// Applies `update` to record text, keeping formatting and comments.
    pub fn apply_update(content: &str, update: &MetadataUpdate) -> Result<String, String> {
        let mut doc: DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| e.to_string())?;
        let third_party = doc
            .get_mut("third_party")
            .and_then(Item::as_table_like_mut)
            .ok_or_else(|| "missing [third_party] table".to_string())?;

        third_party.insert("version", value(update.version.as_str()));

        if let Some(date) = update.date {
            // Keep a structured {year, month, day} date structured
            let structured = third_party
                .get_mut("last_upgrade_date")
                .and_then(Item::as_table_like_mut);
            if let Some(table) = structured {
                table.insert("year", value(i64::from(date.year())));
                table.insert("month", value(i64::from(date.month())));
                table.insert("day", value(i64::from(date.day())));
            } else {
                third_party
                    .insert("last_upgrade_date", value(date.format("%Y-%m-%d").to_string()));
            }
        }

        if let Some((old, new)) = &update.replace_url {
            let urls = third_party.get_mut("url").ok_or_else(|| "missing url entries".to_string())?;
            if !replace_url_value(urls, old, new) {
                return Err(format!("no url entry with value '{old}'"));
            }
        }

        Ok(doc.to_string())
    }
}

fn replace_url_value(urls: &mut Item, old: &str, new: &str) -> bool {
    let matches = |v: Option<&str>| v.map(str::trim) == Some(old);

    if let Some(tables) = urls.as_array_of_tables_mut() {
        for table in tables.iter_mut() {
            if matches(table.get("value").and_then(Item::as_str)) {
                table.insert("value", value(new));
                return true;
            }
        }
    } else if let Some(array) = urls.as_array_mut() {
        for entry in array.iter_mut() {
            if let Some(table) = entry.as_inline_table_mut()
                && matches(table.get("value").and_then(|v| v.as_str()))
            {
                table.insert("value", new.into());
                return true;
            }
        }
    }
    false
}

fn parse_date(v: &toml::Value) -> Result<NaiveDate, String> {
    let bad = || format!("invalid last_upgrade_date: {v}");
    match v {
        toml::Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| bad()),
        toml::Value::Datetime(dt) => {
            let date = dt.date.ok_or_else(bad)?;
            NaiveDate::from_ymd_opt(
                i32::from(date.year),
                u32::from(date.month),
                u32::from(date.day),
            )
            .ok_or_else(bad)
        }
        toml::Value::Table(t) => {
            let field = |name: &str| t.get(name).and_then(toml::Value::as_integer).ok_or_else(bad);
            let (y, m, d) = (field("year")?, field("month")?, field("day")?);
            NaiveDate::from_ymd_opt(
                i32::try_from(y).map_err(|_| bad())?,
                u32::try_from(m).map_err(|_| bad())?,
                u32::try_from(d).map_err(|_| bad())?,
            )
            .ok_or_else(bad)
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"# Vendored zlib
name = "zlib"
description = "General purpose compression library"

[third_party]
version = "v1.3.0"
last_upgrade_date = "2023-08-18"
# keep in sync with the tarball
notes = "Patched for Android"

[[third_party.url]]
type = "HOMEPAGE"
value = "https://zlib.net"

[[third_party.url]]
type = "ARCHIVE"
value = "https://github.com/madler/zlib/releases/download/v1.3.0/zlib-1.3.0.tar.gz"
"#;

    #[test]
    fn test_parse_sample() {
        let meta = MetadataStore::parse(Path::new("METADATA.toml"), SAMPLE).unwrap();
        assert_eq!(meta.name.as_deref(), Some("zlib"));
        assert_eq!(meta.version, "v1.3.0");
        assert_eq!(meta.last_upgrade_date, NaiveDate::from_ymd_opt(2023, 8, 18));
        assert_eq!(meta.urls.len(), 2);
        assert_eq!(meta.urls[0].kind, UrlKind::Homepage);
        assert_eq!(meta.urls[1].kind, UrlKind::Archive);
        assert_eq!(meta.notes.as_deref(), Some("Patched for Android"));
    }

    #[test]
    fn test_parse_structured_and_native_dates() {
        let structured = r#"
[third_party]
version = "1.0"
last_upgrade_date = { year = 2022, month = 2, day = 3 }
url = [{ type = "GIT", value = "https://example.com/a.git" }]
"#;
        let meta = MetadataStore::parse(Path::new("m"), structured).unwrap();
        assert_eq!(meta.last_upgrade_date, NaiveDate::from_ymd_opt(2022, 2, 3));

        let native = r#"
[third_party]
version = "1.0"
last_upgrade_date = 2021-12-31
url = [{ type = "git", value = "https://example.com/a.git" }]
"#;
        let meta = MetadataStore::parse(Path::new("m"), native).unwrap();
        assert_eq!(meta.last_upgrade_date, NaiveDate::from_ymd_opt(2021, 12, 31));
        assert_eq!(meta.urls[0].kind, UrlKind::Git);
    }

    #[test]
    fn test_parse_rejects_incomplete_records() {
        let cases = [
            ("name = \"x\"", "missing [third_party]"),
            ("[third_party]\nversion = \"\"\nurl = [{type = \"GIT\", value = \"u\"}]", "empty"),
            ("[third_party]\nversion = \"1\"", "no [[third_party.url]]"),
            ("[third_party\n", ""),
        ];
        for (content, expected) in cases {
            match MetadataStore::parse(Path::new("METADATA.toml"), content) {
                Err(UpdaterError::MetadataError {
                    reason,
                    ..
                }) => assert!(reason.contains(expected), "{reason}"),
                other => panic!("expected MetadataError, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = MetadataStore::load(temp.path()).unwrap_err();
        assert!(matches!(err, UpdaterError::MetadataError { .. }));
    }

    #[test]
    fn test_apply_update_preserves_comments_and_notes() {
        let update = MetadataUpdate {
            version: "v1.3.1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 22),
            replace_url: Some((
                "https://github.com/madler/zlib/releases/download/v1.3.0/zlib-1.3.0.tar.gz"
                    .to_string(),
                "https://github.com/madler/zlib/releases/download/v1.3.1/zlib-1.3.1.tar.gz"
                    .to_string(),
            )),
        };
        let out = MetadataStore::apply_update(SAMPLE, &update).unwrap();

        assert!(out.starts_with("# Vendored zlib"));
        assert!(out.contains("# keep in sync with the tarball"));
        assert!(out.contains("notes = \"Patched for Android\""));

        let meta = MetadataStore::parse(Path::new("m"), &out).unwrap();
        assert_eq!(meta.version, "v1.3.1");
        assert_eq!(meta.last_upgrade_date, NaiveDate::from_ymd_opt(2024, 1, 22));
        assert!(meta.urls[1].address.ends_with("zlib-1.3.1.tar.gz"));
        assert_eq!(meta.urls[0].address, "https://zlib.net");
    }

    #[test]
    fn test_apply_update_without_date_keeps_date() {
        let update = MetadataUpdate {
            version: "v1.3.1".to_string(),
            ..Default::default()
        };
        let out = MetadataStore::apply_update(SAMPLE, &update).unwrap();
        assert!(out.contains("last_upgrade_date = \"2023-08-18\""));
    }

    #[test]
    fn test_apply_update_structured_date_stays_structured() {
        let content = r#"
[third_party]
version = "1.0"
url = [{ type = "GIT", value = "https://example.com/a.git" }]

[third_party.last_upgrade_date]
year = 2020
month = 1
day = 1
"#;
        let update = MetadataUpdate {
            version: "1.1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 6),
            replace_url: None,
        };
        let out = MetadataStore::apply_update(content, &update).unwrap();
        let meta = MetadataStore::parse(Path::new("m"), &out).unwrap();
        assert_eq!(meta.last_upgrade_date, NaiveDate::from_ymd_opt(2024, 5, 6));
        assert!(out.contains("month = 5"));
    }

    #[test]
    fn test_apply_update_inline_url_array() {
        let content = r#"
[third_party]
version = "1.0"
url = [{ type = "ARCHIVE", value = "https://example.com/a-1.0.zip" }]
"#;
        let update = MetadataUpdate {
            version: "1.1".to_string(),
            date: None,
            replace_url: Some((
                "https://example.com/a-1.0.zip".to_string(),
                "https://example.com/a-1.1.zip".to_string(),
            )),
        };
        let out = MetadataStore::apply_update(content, &update).unwrap();
        assert!(out.contains("https://example.com/a-1.1.zip"));
    }

    #[test]
    fn test_write_update_into_other_tree() {
        let old = TempDir::new().unwrap();
        let new = TempDir::new().unwrap();
        let from = MetadataStore::path_for(old.path());
        let to = MetadataStore::path_for(new.path());
        std::fs::write(&from, SAMPLE).unwrap();
        std::fs::write(&to, "name = \"shipped by upstream\"\n").unwrap();

        MetadataStore::write_update(
            &from,
            &to,
            &MetadataUpdate {
                version: "v1.3.1".to_string(),
                date: None,
                replace_url: None,
            },
        )
        .unwrap();

        assert_eq!(MetadataStore::load(new.path()).unwrap().version, "v1.3.1");
        // The source record is left alone
        assert_eq!(std::fs::read_to_string(&from).unwrap(), SAMPLE);
    }

    #[test]
    fn test_display_name_falls_back_to_directory() {
        let content = "[third_party]\nversion = \"1\"\nurl = [{type = \"GIT\", value = \"u\"}]";
        let meta = MetadataStore::parse(Path::new("/src/external/libfoo/METADATA.toml"), content)
            .unwrap();
        assert_eq!(meta.display_name(), "libfoo");
    }
}
