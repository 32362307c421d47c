//! Local mirror operations for s3watcher.
//!
//! - `LocalScanner` - lists the files already present under the mirror root
//! - `diff_remote()` - finds remote objects with no local counterpart
//! - `Ownership` - `user:group` applied to downloaded files

pub mod diff;
pub mod error;
pub mod ownership;
pub mod scanner;

pub use diff::{diff_remote, MissingEntry, RemoteDiff};
pub use error::FileSystemError;
pub use ownership::Ownership;
pub use scanner::{LocalScanner, LocalSnapshot};
