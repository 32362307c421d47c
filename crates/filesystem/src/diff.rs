//! Comparing a remote listing against the local mirror.

use s3watcher_common::{key_to_relative_path, normalize_relative_path};

use crate::scanner::LocalSnapshot;

/// A remote object with no local counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
    /// Full object key.
    pub key: String,
    /// Path relative to the mirror root (POSIX format).
    pub relative_path: String,
}

/// Result of diffing a remote listing against a local snapshot.
#[derive(Debug, Clone, Default)]
pub struct RemoteDiff {
    /// Remote objects absent locally, in listing order.
    pub missing: Vec<MissingEntry>,
    /// Remote objects already present locally.
    pub present: u64,
    /// Keys that do not map to a local file (folder markers, bare prefix).
    pub skipped: Vec<String>,
}

impl RemoteDiff {
    /// Whether the mirror is complete.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Find remote keys with no local file.
///
/// Presence is by normalized relative path only; contents and timestamps
/// are not compared. Keys that map to the same local file are reported once.
///
/// # Arguments
/// * `remote_keys` - Keys listed under the watched prefix
/// * `prefix` - Watched sub-prefix (may be empty)
/// * `local` - Snapshot of the local tree
pub fn diff_remote<'a, I>(remote_keys: I, prefix: &str, local: &LocalSnapshot) -> RemoteDiff
where
    I: IntoIterator<Item = &'a str>,
{
    let mut diff = RemoteDiff::default();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    for key in remote_keys {
        let relative_path: String = match key_to_relative_path(key, prefix)
            .and_then(|relative| normalize_relative_path(&relative))
        {
            Ok(relative) => relative,
            Err(_) => {
                diff.skipped.push(key.to_string());
                continue;
            }
        };

        if local.contains(&relative_path) {
            diff.present += 1;
        } else if seen.insert(relative_path.clone()) {
            diff.missing.push(MissingEntry {
                key: key.to_string(),
                relative_path,
            });
        }
    }

    diff
}
