//! Release archives: selection, download, verification and unpacking.
//!
//! Supported formats are gzip tarballs (`.tar.gz`, `.tgz`, and `.crate`
//! files, which are gzip tarballs too), plain `.tar` and `.zip`. Archives
//! that wrap everything in a single top-level directory, as source archives
//! usually do, are unwrapped so that the package tree starts at the project
//! root.

pub mod selector;

pub use selector::{ArchiveSelector, archive_extension};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::UpdaterError;
use crate::upstream::{Asset, UpstreamClient, check_status};
use crate::utils::fs::TempDir;

/// Extensions that [`unpack`] can handle.
const SUPPORTED_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar", ".zip", ".crate"];

/// Whether `name` is an archive format vendup can unpack.
#[must_use]
pub fn is_supported_archive(name: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&archive_extension(name).as_str())
}

/// Downloads `asset` and returns its bytes. `file://` URLs are read locally.
pub async fn download(client: &UpstreamClient, asset: &Asset) -> Result<Vec<u8>> {
    if let Some(path) = asset.url.strip_prefix("file://") {
        return tokio::fs::read(path).await.map_err(|e| {
            UpdaterError::FetchFailure {
                location: asset.url.clone(),
                reason: e.to_string(),
            }
            .into()
        });
    }

    debug!("Downloading {}", asset.url);
    let unreachable = |e: reqwest::Error| UpdaterError::UpstreamUnreachable {
        upstream: asset.url.clone(),
        reason: e.to_string(),
    };
    let response = client.http().get(&asset.url).send().await.map_err(unreachable)?;
    check_status(&asset.url, response.status())?;
    let bytes = response.bytes().await.map_err(unreachable)?;
    Ok(bytes.to_vec())
}

/// Checks `bytes` against a published digest of the form `sha256:<hex>`.
///
/// Digests in other algorithms are not verified.
pub fn verify_digest(asset: &Asset, bytes: &[u8]) -> Result<(), UpdaterError> {
    let Some(digest) = &asset.digest else {
        return Ok(());
    };
    let Some(expected) = digest.strip_prefix("sha256:") else {
        warn!("Skipping verification of {}: unsupported digest {digest}", asset.name);
        return Ok(());
    };

    let actual = hex::encode(Sha256::digest(bytes));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(UpdaterError::FetchFailure {
            location: asset.url.clone(),
            reason: format!("sha256 mismatch: expected {expected}, got {actual}"),
        })
    }
}

/// Unpacks the archive at `archive` into `dest`, choosing the format from `name`.
pub fn unpack(archive: &Path, name: &str, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let ext = archive_extension(name);

    let result = match ext.as_str() {
        ".tar.gz" | ".tgz" | ".crate" => {
            let mut tarball = tar::Archive::new(GzDecoder::new(file));
            tarball.set_preserve_permissions(true);
            tarball.unpack(dest)
        }
        ".tar" => {
            let mut tarball = tar::Archive::new(file);
            tarball.set_preserve_permissions(true);
            tarball.unpack(dest)
        }
        ".zip" => zip::ZipArchive::new(file)
            .and_then(|mut zip| zip.extract(dest))
            .map_err(std::io::Error::other),
        _ => {
            return Err(UpdaterError::FetchFailure {
                location: name.to_string(),
                reason: format!("unsupported archive format '{ext}'"),
            }
            .into());
        }
    };
    result.map_err(|e| UpdaterError::FetchFailure {
        location: name.to_string(),
        reason: format!("failed to unpack: {e}"),
    })?;
    Ok(())
}

/// The directory holding the project: `dir`'s only entry when that entry is a
/// directory, otherwise `dir` itself.
pub fn find_archive_root(dir: &Path) -> Result<PathBuf> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;

    if entries.len() == 1 {
        let only = entries.remove(0);
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(dir.to_path_buf())
}

/// Downloads, verifies and unpacks `asset` so that its content ends up
/// directly inside the existing empty directory `dest`.
///
/// Scratch files are kept next to `dest` so the final moves are renames on
/// the same filesystem.
pub async fn fetch_into(client: &UpstreamClient, asset: &Asset, dest: &Path) -> Result<()> {
    let bytes = download(client, asset).await?;
    verify_digest(asset, &bytes)?;

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let scratch = TempDir::new_in(parent, "unpack")?;
    let archive_path = scratch.path().join("download");
    tokio::fs::write(&archive_path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", archive_path.display()))?;

    let unpacked = scratch.path().join("tree");
    let name = asset.name.clone();
    let unpack_dir = unpacked.clone();
    // The blocking task owns the scratch directory. If this future is dropped
    // mid-unpack, the directory is removed once the task stops writing to it.
    let scratch = tokio::task::spawn_blocking(move || {
        std::fs::create_dir(&unpack_dir)?;
        unpack(&archive_path, &name, &unpack_dir)?;
        Ok::<_, anyhow::Error>(scratch)
    })
    .await
    .context("Unpack task failed")??;

    let root = find_archive_root(&unpacked)?;
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        std::fs::rename(entry.path(), &target).with_context(|| {
            format!("Failed to move {} to {}", entry.path().display(), target.display())
        })?;
    }
    debug!("Unpacked {} into {}", asset.name, dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in files {
            zip.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_supported_archives() {
        assert!(is_supported_archive("a-1.0.tar.gz"));
        assert!(is_supported_archive("a-1.0.ZIP"));
        assert!(is_supported_archive("a-1.0.crate"));
        assert!(!is_supported_archive("a-1.0.tar.xz"));
        assert!(!is_supported_archive("a-1.0.exe"));
    }

    #[test]
    fn test_unpack_tar_gz_and_find_root() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.tar.gz");
        write_tar_gz(&archive, &[("proj-1.0/src/lib.c", "int x;"), ("proj-1.0/README", "hi")]);

        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        unpack(&archive, "proj-1.0.tar.gz", &dest).unwrap();

        let root = find_archive_root(&dest).unwrap();
        assert_eq!(root, dest.join("proj-1.0"));
        assert_eq!(std::fs::read_to_string(root.join("src/lib.c")).unwrap(), "int x;");
    }

    #[test]
    fn test_unpack_zip_without_wrapper() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.zip");
        write_zip(&archive, &[("a.txt", "a"), ("b.txt", "b")]);

        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        unpack(&archive, "a.zip", &dest).unwrap();

        assert_eq!(find_archive_root(&dest).unwrap(), dest);
        assert_eq!(std::fs::read_to_string(dest.join("b.txt")).unwrap(), "b");
    }

    #[test]
    fn test_unpack_rejects_unknown_format() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.rar");
        std::fs::write(&archive, b"junk").unwrap();
        let err = unpack(&archive, "a.rar", temp.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported archive format"));
    }

    #[test]
    fn test_verify_digest() {
        let mut asset = Asset {
            name: "a.zip".to_string(),
            url: "file:///a.zip".to_string(),
            digest: Some(format!("sha256:{}", hex::encode(Sha256::digest(b"payload")))),
        };
        assert!(verify_digest(&asset, b"payload").is_ok());
        assert!(matches!(
            verify_digest(&asset, b"tampered"),
            Err(UpdaterError::FetchFailure { .. })
        ));

        asset.digest = Some("md5:abc".to_string());
        assert!(verify_digest(&asset, b"anything").is_ok());
    }

    #[tokio::test]
    async fn test_fetch_into_from_file_url() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("proj-1.0.tar.gz");
        write_tar_gz(&archive, &[("proj-1.0/main.c", "int main;")]);

        let dest = temp.path().join("staging");
        std::fs::create_dir(&dest).unwrap();
        let asset = Asset {
            name: "proj-1.0.tar.gz".to_string(),
            url: format!("file://{}", archive.display()),
            digest: None,
        };
        let client = UpstreamClient::new(&NetworkConfig::default()).unwrap();
        fetch_into(&client, &asset, &dest).await.unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("main.c")).unwrap(), "int main;");
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".vendup_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_leaves_no_scratch() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("big-1.0.tar.gz");
        let names: Vec<String> = (0..400).map(|i| format!("big-1.0/src/file{i}.c")).collect();
        let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "int x;\n")).collect();
        write_tar_gz(&archive, &files);
        let asset = Asset {
            name: "big-1.0.tar.gz".to_string(),
            url: format!("file://{}", archive.display()),
            digest: None,
        };
        let client = UpstreamClient::new(&NetworkConfig::default()).unwrap();

        for (i, millis) in [0u64, 1, 3, 10, 30].into_iter().enumerate() {
            let dest = temp.path().join(format!("staging{i}"));
            std::fs::create_dir(&dest).unwrap();
            let _ = tokio::time::timeout(
                std::time::Duration::from_millis(millis),
                fetch_into(&client, &asset, &dest),
            )
            .await;
        }

        // Detached unpack tasks clean up once they finish
        let scratch_left = || {
            std::fs::read_dir(temp.path())
                .unwrap()
                .filter_map(Result::ok)
                .any(|e| e.file_name().to_string_lossy().starts_with(".vendup_unpack"))
        };
        for _ in 0..100 {
            if !scratch_left() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert!(!scratch_left());
    }
}
