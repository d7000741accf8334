//! blobcache: a file-caching HTTP service.
//!
//! Clients upload opaque blobs keyed by (product, version, platform, key),
//! download them by the same tuple, and may create aliases so a second key
//! resolves to the same blob. Each (product, platform) slot holds at most
//! fifteen entries; usage decays with a seven-day half-life, and an hourly
//! maintenance pass rebuilds the index from disk and prunes what decayed.

pub mod api;
pub mod error;
pub mod maintenance;
pub mod storage;

pub use error::{CacheError, Result};
