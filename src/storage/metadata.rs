//! Per-entry accounting with half-life usage decay.
//!
//! Every cache entry directory carries a `metadata.json` next to its payload
//! `file`. The aged use count halves every seven days of inactivity; a read
//! decays it to the present and then adds one, so recent traffic dominates
//! the eviction ranking.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Payload file name inside an entry directory.
pub const PAYLOAD_FILE: &str = "file";
/// Metadata file name inside an entry directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Timestamp format used in `metadata.json` (local time, second resolution).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Half-life of the aged use count, in seconds (7 days).
const HALF_LIFE_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Accounting for one cache entry.
///
/// Serialized as `{post_time, use_count, aged_use_count, last_time}` with
/// timestamps in [`DATE_FORMAT`]. `post_time` is never mutated after
/// creation; `use_count` only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(with = "datetime_format")]
    post_time: NaiveDateTime,
    use_count: u64,
    aged_use_count: f64,
    #[serde(with = "datetime_format")]
    last_time: NaiveDateTime,
}

impl EntryMetadata {
    /// Fresh metadata for an entry committed at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            post_time: now,
            use_count: 1,
            aged_use_count: 1.0,
            last_time: now,
        }
    }

    pub fn post_time(&self) -> NaiveDateTime {
        self.post_time
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn aged_use_count(&self) -> f64 {
        self.aged_use_count
    }

    pub fn last_time(&self) -> NaiveDateTime {
        self.last_time
    }

    /// The aged use count decayed to the instant `now`.
    ///
    /// A non-positive gap leaves the count untouched: clock skew must never
    /// amplify usage.
    pub fn aged_at(&self, now: NaiveDateTime) -> f64 {
        let delta = (now - self.last_time).num_seconds();
        if delta > 0 {
            self.aged_use_count * (-(delta as f64) / HALF_LIFE_SECS).exp2()
        } else {
            self.aged_use_count
        }
    }

    /// The eviction ranking metric: exactly the decayed aged use count.
    pub fn usage_metric(&self, now: NaiveDateTime) -> f64 {
        self.aged_at(now)
    }

    /// Record a successful read at `now`: decay, then reinforce by one.
    pub fn touch(&mut self, now: NaiveDateTime) {
        self.aged_use_count = self.aged_at(now) + 1.0;
        self.use_count += 1;
        self.last_time = now;
    }

    /// Load metadata from an entry directory.
    ///
    /// The directory must contain both the payload [`PAYLOAD_FILE`] and a
    /// parseable [`METADATA_FILE`]; anything else is a corrupt entry.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.join(PAYLOAD_FILE).is_file() {
            return Err(CacheError::CorruptEntry {
                path: dir.to_path_buf(),
                reason: "payload file is missing".into(),
            });
        }

        let raw = fs::read_to_string(dir.join(METADATA_FILE)).map_err(|e| {
            CacheError::CorruptEntry {
                path: dir.to_path_buf(),
                reason: format!("cannot read metadata: {e}"),
            }
        })?;

        serde_json::from_str(&raw).map_err(|e| CacheError::CorruptEntry {
            path: dir.to_path_buf(),
            reason: format!("cannot parse metadata: {e}"),
        })
    }

    /// Persist metadata into an entry directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::CorruptEntry {
            path: dir.to_path_buf(),
            reason: format!("cannot serialize metadata: {e}"),
        })?;
        fs::write(dir.join(METADATA_FILE), json)?;
        Ok(())
    }
}

/// Serde codec for [`DATE_FORMAT`] timestamps. Whitespace is trimmed on read.
mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    use super::DATE_FORMAT;

    pub fn serialize<S>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}
