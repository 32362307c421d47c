//! Ownership applied to downloaded files.

use std::ffi::CString;
use std::path::Path;

use crate::error::FileSystemError;

/// Numeric owner and group to assign to files written into the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    /// Parse `user:group`, where each side is a name or a numeric id.
    pub fn parse(spec: &str) -> Result<Self, FileSystemError> {
        let (user, group) = spec
            .split_once(':')
            .filter(|(u, g)| !u.is_empty() && !g.is_empty() && !g.contains(':'))
            .ok_or_else(|| FileSystemError::InvalidOwnership {
                spec: spec.to_string(),
            })?;

        Ok(Self {
            uid: resolve_user(user)?,
            gid: resolve_group(group)?,
        })
    }

    /// Change owner and group of `path`. Symlinks are not followed.
    pub fn apply(&self, path: &Path) -> Result<(), FileSystemError> {
        std::os::unix::fs::lchown(path, Some(self.uid), Some(self.gid)).map_err(|e| {
            FileSystemError::IoError {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        log::debug!("Set ownership of {} to {}:{}", path.display(), self.uid, self.gid);
        Ok(())
    }
}

fn principal_name(kind: &'static str, name: &str) -> Result<CString, FileSystemError> {
    CString::new(name).map_err(|_| FileSystemError::UnknownPrincipal {
        kind,
        name: name.to_string(),
    })
}

fn resolve_user(user: &str) -> Result<u32, FileSystemError> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(uid);
    }
    let name: CString = principal_name("user", user)?;
    // SAFETY: `name` is a valid NUL-terminated string; the returned record is
    // read immediately, before any other passwd lookup can overwrite it.
    let entry = unsafe { libc::getpwnam(name.as_ptr()) };
    if entry.is_null() {
        return Err(FileSystemError::UnknownPrincipal {
            kind: "user",
            name: user.to_string(),
        });
    }
    // SAFETY: checked non-null above.
    Ok(unsafe { (*entry).pw_uid })
}

fn resolve_group(group: &str) -> Result<u32, FileSystemError> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }
    let name: CString = principal_name("group", group)?;
    // SAFETY: as in `resolve_user`.
    let entry = unsafe { libc::getgrnam(name.as_ptr()) };
    if entry.is_null() {
        return Err(FileSystemError::UnknownPrincipal {
            kind: "group",
            name: group.to_string(),
        });
    }
    // SAFETY: checked non-null above.
    Ok(unsafe { (*entry).gr_gid })
}
