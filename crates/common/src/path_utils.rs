//! Mapping between object keys and the local mirror of the key hierarchy.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Lexical path normalization without filesystem access.
///
/// Removes `.` components and resolves `..` components lexically.
/// Does not access the filesystem or resolve symlinks.
///
/// # Arguments
/// * `path` - Path to normalize
///
/// # Returns
/// Normalized path with `.` and `..` resolved lexically.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Pop if we can and it's not a ParentDir or RootDir
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::ParentDir) | Some(Component::RootDir)
                    )
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Convert a path to POSIX-style string (forward slashes).
///
/// Local scans report paths in this form so they compare directly against
/// object keys.
pub fn to_posix_path(path: &Path) -> String {
    path.components()
        .map(|c: Component| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a path is within a root directory.
///
/// Uses lexical comparison, does not access filesystem.
pub fn is_within_root(path: &Path, root: &Path) -> bool {
    let norm_path: PathBuf = lexical_normalize(path);
    let norm_root: PathBuf = lexical_normalize(root);
    norm_path.starts_with(&norm_root)
}

/// Strip the configured bucket sub-prefix from an object key.
///
/// Keys outside the prefix are kept whole. A key that names the prefix itself,
/// or a "directory" placeholder ending in `/`, does not name a file and is
/// rejected.
///
/// # Arguments
/// * `key` - Decoded object key
/// * `prefix` - Bucket sub-prefix (may be empty, slashes are ignored)
///
/// # Returns
/// Key relative to the prefix, without leading slashes.
pub fn key_to_relative_path(key: &str, prefix: &str) -> Result<String, PathError> {
    let prefix: &str = prefix.trim_matches('/');

    let relative: &str = if prefix.is_empty() {
        key
    } else {
        match key.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => key,
        }
    };

    let relative: &str = relative.trim_start_matches('/');
    if relative.is_empty() || relative.ends_with('/') {
        return Err(PathError::InvalidKey {
            key: key.to_string(),
        });
    }

    Ok(relative.to_string())
}

/// Collapse a POSIX relative path to its canonical form.
///
/// Empty and `.` segments are dropped and `..` is resolved lexically. Two
/// keys that land on the same local file normalize to the same string.
pub fn normalize_relative_path(relative: &str) -> Result<String, PathError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::PathOutsideRoot {
                        path: relative.to_string(),
                        root: ".".to_string(),
                    });
                }
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(PathError::InvalidKey {
            key: relative.to_string(),
        });
    }
    Ok(segments.join("/"))
}

/// Convert a POSIX relative path to a host path under `root`.
///
/// The path is normalized with [`normalize_relative_path`]; the result must
/// name something strictly below `root`.
pub fn relative_to_local_path(relative: &str, root: &Path) -> Result<PathBuf, PathError> {
    let relative: String = normalize_relative_path(relative)?;
    let result: PathBuf = root.join(&relative);

    let normalized: PathBuf = lexical_normalize(&result);
    if normalized == lexical_normalize(root) || !is_within_root(&normalized, root) {
        return Err(PathError::PathOutsideRoot {
            path: normalized.display().to_string(),
            root: root.display().to_string(),
        });
    }

    Ok(normalized)
}

/// Derive the local destination for an object key.
///
/// # Arguments
/// * `root` - Local download root
/// * `key` - Decoded object key
/// * `prefix` - Bucket sub-prefix stripped before mirroring
pub fn local_path_for_key(root: &Path, key: &str, prefix: &str) -> Result<PathBuf, PathError> {
    let relative: String = key_to_relative_path(key, prefix)?;
    relative_to_local_path(&relative, root)
}
