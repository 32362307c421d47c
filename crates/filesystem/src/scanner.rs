//! Walks the local mirror and lists the files it holds.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use s3watcher_common::{to_posix_path, PARTIAL_DOWNLOAD_SUFFIX};
use walkdir::WalkDir;

use crate::error::FileSystemError;

/// Result of scanning the local tree.
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    /// Relative POSIX paths of every regular file below the root.
    pub files: HashSet<String>,
    /// Number of directories walked (root excluded).
    pub dirs_scanned: u64,
    /// Entries that could not be read and were skipped.
    pub skipped: u64,
}

impl LocalSnapshot {
    /// Whether `relative_path` exists locally.
    pub fn contains(&self, relative_path: &str) -> bool {
        self.files.contains(relative_path)
    }
}

/// Scanner for the local mirror directory.
#[derive(Debug, Clone)]
pub struct LocalScanner {
    root: PathBuf,
}

impl LocalScanner {
    /// Create a scanner rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recursively list every regular file under the root.
    ///
    /// Symlinks are not followed. Unreadable entries below the root are
    /// logged and skipped; an unreadable root is an error.
    ///
    /// # Errors
    /// Returns `NotADirectory` if the root does not exist or is a file.
    pub fn scan(&self) -> Result<LocalSnapshot, FileSystemError> {
        if !self.root.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: self.root.display().to_string(),
            });
        }

        let mut snapshot = LocalSnapshot::default();

        for entry in WalkDir::new(&self.root).follow_links(false).into_iter() {
            let entry: walkdir::DirEntry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(FileSystemError::IoError {
                        path: self.root.display().to_string(),
                        source: e.into(),
                    });
                }
                Err(e) => {
                    log::warn!("Skipping unreadable entry during scan: {}", e);
                    snapshot.skipped += 1;
                    continue;
                }
            };

            let path: &Path = entry.path();
            if path == self.root {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                snapshot.dirs_scanned += 1;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let relative: &Path = match path.strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let relative: String = to_posix_path(relative);
            if relative.ends_with(PARTIAL_DOWNLOAD_SUFFIX) {
                continue;
            }
            snapshot.files.insert(relative);
        }

        log::debug!(
            "Scanned {}: {} files in {} directories",
            self.root.display(),
            snapshot.files.len(),
            snapshot.dirs_scanned
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_scan_lists_nested_files() {
        let dir: TempDir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), "x").unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), "y").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let snapshot: LocalSnapshot = LocalScanner::new(dir.path()).scan().unwrap();

        assert_eq!(snapshot.files.len(), 2);
        assert!(snapshot.contains("top.txt"));
        assert!(snapshot.contains("a/b/deep.txt"));
        assert_eq!(snapshot.dirs_scanned, 3);
    }

    #[test]
    fn test_scan_ignores_partial_downloads() {
        let dir: TempDir = TempDir::new().unwrap();
        fs::write(dir.path().join("file.bin.s3watcher-part"), "half").unwrap();

        let snapshot: LocalSnapshot = LocalScanner::new(dir.path()).scan().unwrap();
        assert!(snapshot.files.is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let dir: TempDir = TempDir::new().unwrap();
        let result = LocalScanner::new(dir.path().join("nope")).scan();
        assert!(matches!(result, Err(FileSystemError::NotADirectory { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_does_not_follow_symlinks() {
        let dir: TempDir = TempDir::new().unwrap();
        let outside: TempDir = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let snapshot: LocalSnapshot = LocalScanner::new(dir.path()).scan().unwrap();
        assert!(snapshot.files.is_empty());
    }
}
