//! Directory helpers.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Creates `path` and its parents if missing; fails if it exists as a file.
pub fn ensure_dir(path: &Path) -> Result<()> {
    let safe_path = crate::utils::platform::windows_long_path(path);

    if !safe_path.exists() {
        fs::create_dir_all(&safe_path).with_context(|| {
            let platform_help = if crate::utils::platform::is_windows() {
                "On Windows: Check that the path length is < 260 chars or that long path support is enabled"
            } else {
                "Check directory permissions and path validity"
            };

            format!("Failed to create directory: {}\n\n{}", path.display(), platform_help)
        })?;
    } else if !safe_path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Copies a file, directory tree or symlink from `src` to `dst`.
///
/// Symlinks are recreated as symlinks rather than followed, so a vendored tree
/// keeps its shape. File permissions are carried over by [`fs::copy`].
pub fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    let file_type = fs::symlink_metadata(src)
        .with_context(|| format!("Failed to stat {}", src.display()))?
        .file_type();

    if file_type.is_symlink() {
        copy_symlink(src, dst)
    } else if file_type.is_dir() {
        copy_dir(src, dst)
    } else {
        fs::copy(src, dst).with_context(|| {
            format!("Failed to copy file from {} to {}", src.display(), dst.display())
        })?;
        Ok(())
    }
}

/// Recursively copies the contents of `src` into `dst`.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        copy_entry(&entry.path(), &dst.join(entry.file_name()))?;
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target =
        fs::read_link(src).with_context(|| format!("Failed to read link {}", src.display()))?;
    std::os::unix::fs::symlink(&target, dst)
        .with_context(|| format!("Failed to create symlink {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    // Windows symlinks need privileges; copy the target content instead
    if src.is_dir() {
        copy_dir(src, dst)
    } else {
        fs::copy(src, dst)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
        Ok(())
    }
}

/// Removes a directory tree; a missing directory is not an error.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to remove directory: {}", path.display()))
        }
    }
}

/// Removes whatever is at `path`: file, symlink or directory tree.
pub fn remove_entry(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_dir_all(path),
        Ok(_) => fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir() {
        let temp = tempdir().unwrap();
        let test_dir = temp.path().join("test_dir");

        assert!(!test_dir.exists());
        ensure_dir(&test_dir).unwrap();
        assert!(test_dir.is_dir());
    }

    #[test]
    fn test_ensure_dir_on_file() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("file.txt");
        fs::write(&file_path, "content").unwrap();

        assert!(ensure_dir(&file_path).is_err());
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");

        fs::create_dir_all(src.join("subdir")).unwrap();
        fs::write(src.join("file1.txt"), "content1").unwrap();
        fs::write(src.join("subdir/file2.txt"), "content2").unwrap();

        copy_dir(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("file1.txt")).unwrap(), "content1");
        assert_eq!(fs::read_to_string(dst.join("subdir/file2.txt")).unwrap(), "content2");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_entry_keeps_symlink() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("target.txt"), "x").unwrap();
        std::os::unix::fs::symlink("target.txt", temp.path().join("link")).unwrap();

        copy_entry(&temp.path().join("link"), &temp.path().join("link2")).unwrap();

        let meta = fs::symlink_metadata(temp.path().join("link2")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_link(temp.path().join("link2")).unwrap(), Path::new("target.txt"));
    }

    #[test]
    fn test_remove_helpers_tolerate_missing() {
        let temp = tempdir().unwrap();
        remove_dir_all(&temp.path().join("missing")).unwrap();
        remove_entry(&temp.path().join("missing")).unwrap();

        let file = temp.path().join("f");
        fs::write(&file, "").unwrap();
        remove_entry(&file).unwrap();
        assert!(!file.exists());
    }
}
