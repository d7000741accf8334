//! Error types for blobcache.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced across component boundaries.
///
/// `AlreadyExists` and `NotFound` reach the HTTP layer as 409/404;
/// `CorruptEntry` and `DanglingAlias` are contained by the maintenance
/// pass; `Io` is fatal to the current request only.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A write or alias would overwrite an existing entity.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A read or alias source does not resolve to an entry.
    #[error("{0} is not found in the cache")]
    NotFound(String),

    /// An entry directory is missing its payload or has unreadable metadata.
    #[error("the entry {path:?} is incomplete: {reason}")]
    CorruptEntry { path: PathBuf, reason: String },

    /// A symlink whose target is absent from the rebuilt index.
    #[error("the alias {0:?} points at nothing")]
    DanglingAlias(PathBuf),

    /// Unexpected filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
