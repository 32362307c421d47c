//! Shared types and utilities for s3watcher.
//!
//! This crate provides common functionality used across all s3watcher crates:
//! - Object key to local path mapping (prefix stripping, root containment)
//! - Shared defaults for polling, history and session lifetime
//! - Shared path error type

pub mod constants;
pub mod error;
pub mod path_utils;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use path_utils::{
    is_within_root, key_to_relative_path, lexical_normalize, local_path_for_key,
    normalize_relative_path, relative_to_local_path, to_posix_path,
};
