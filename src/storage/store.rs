//! Filesystem-backed cache store: disk layout, request operations, recovery.
//!
//! On-disk layout under the cache root:
//!
//! ```text
//! <root>/<product>/<platform>/<version>_<key>/
//!     file              <- payload (opaque bytes)
//!     metadata.json     <- entry accounting
//! <root>/<product>/<platform>/<version>_<keyAlias>  <- symlink to "<version>_<key>"
//! ```
//!
//! Alias symlinks are relative (link text is the canonical directory
//! basename) so the whole root can be relocated.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::storage::eviction::{evict_outdated, Evicted, MAX_SLOT_ENTRIES};
use crate::storage::index::CacheIndex;
use crate::storage::metadata::{EntryMetadata, PAYLOAD_FILE};
use crate::storage::slot::Slot;

/// The cache store: an in-memory [`CacheIndex`] mirroring a directory tree.
///
/// All methods take `now` where the wall clock matters, so callers sample it
/// exactly once per operation and tests control it outright.
pub struct Store {
    root: PathBuf,
    index: CacheIndex,
}

impl Store {
    /// A store rooted at `root`. No I/O happens until the first operation;
    /// call [`Store::refresh`] to populate the index from disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: CacheIndex::default(),
        }
    }

    /// Store `data` as a new entry for the tuple.
    ///
    /// Fails with `AlreadyExists` when the tuple resolves (directly or via
    /// one alias hop) to an existing entry. On success the slot is evicted
    /// down to [`MAX_SLOT_ENTRIES`], using the new entry's commit instant as
    /// the decay basis.
    pub fn insert(
        &mut self,
        product: &str,
        platform: &str,
        version: &str,
        key: &str,
        data: &[u8],
        now: NaiveDateTime,
    ) -> Result<()> {
        let basename = entry_basename(version, key);
        if self
            .index
            .slot(product, platform)
            .and_then(|slot| slot.resolve(&basename))
            .is_some()
        {
            return Err(CacheError::AlreadyExists(tuple_label(
                product, platform, version, key,
            )));
        }

        let platform_dir = self.platform_dir(product, platform);
        let entry_dir = platform_dir.join(&basename);
        fs::create_dir_all(&entry_dir)?;
        fs::write(entry_dir.join(PAYLOAD_FILE), data)?;

        let meta = EntryMetadata::new(now);
        meta.save(&entry_dir)?;

        let slot = self.index.ensure_slot(product, platform);
        slot.insert(basename, meta);

        let evicted = evict_outdated(slot, now, MAX_SLOT_ENTRIES);
        purge_evicted(&platform_dir, &evicted);
        Ok(())
    }

    /// Read the payload for the tuple and credit the usage.
    ///
    /// Resolution follows at most one alias hop; the touch always lands on
    /// the canonical entry and is persisted before returning.
    pub fn fetch(
        &mut self,
        product: &str,
        platform: &str,
        version: &str,
        key: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<u8>> {
        let basename = entry_basename(version, key);
        let canonical = self
            .index
            .slot(product, platform)
            .and_then(|slot| slot.resolve(&basename))
            .map(str::to_owned)
            .ok_or_else(|| CacheError::NotFound(tuple_label(product, platform, version, key)))?;

        let entry_dir = self.platform_dir(product, platform).join(&canonical);
        let data = fs::read(entry_dir.join(PAYLOAD_FILE))?;

        if let Some(meta) = self
            .index
            .slot_mut(product, platform)
            .and_then(|slot| slot.get_mut(&canonical))
        {
            meta.touch(now);
            meta.save(&entry_dir)?;
        }

        Ok(data)
    }

    /// Create the alias `key_alias` for the entry the source tuple resolves
    /// to, within the same (product, platform, version).
    ///
    /// The alias must not collide with an entry, another alias, or any
    /// existing filesystem object in the slot directory.
    pub fn add_alias(
        &mut self,
        product: &str,
        platform: &str,
        version: &str,
        key: &str,
        key_alias: &str,
    ) -> Result<()> {
        let source = entry_basename(version, key);
        let alias = entry_basename(version, key_alias);
        let platform_dir = self.platform_dir(product, platform);

        let slot = self
            .index
            .slot_mut(product, platform)
            .ok_or_else(|| CacheError::NotFound(tuple_label(product, platform, version, key)))?;
        let canonical = slot
            .resolve(&source)
            .map(str::to_owned)
            .ok_or_else(|| CacheError::NotFound(tuple_label(product, platform, version, key)))?;

        let alias_path = platform_dir.join(&alias);
        if alias_path.symlink_metadata().is_ok() {
            return Err(CacheError::AlreadyExists(alias));
        }

        slot.add_alias(alias.clone(), &canonical)?;
        if let Err(err) = make_symlink(&canonical, &alias_path) {
            slot.remove_alias(&alias);
            return Err(err.into());
        }
        debug!(alias = %alias, target = %canonical, "created alias link");
        Ok(())
    }

    /// A JSON dump of the whole index:
    /// `{product: {platform: {basename: {metadata..., "aliases": [...]?}}}}`.
    ///
    /// The `aliases` array lists alias basenames under their target entry
    /// and is present only when non-empty.
    pub fn dump(&self) -> Value {
        let mut products = Map::new();
        for (product, platforms) in self.index.iter() {
            let mut platform_map = Map::new();
            for (platform, slot) in platforms {
                let mut entry_map = Map::new();
                for (basename, meta) in slot.entries() {
                    let mut object = match serde_json::to_value(meta) {
                        Ok(Value::Object(object)) => object,
                        _ => Map::new(),
                    };
                    let aliases = slot.aliases_of(basename);
                    if !aliases.is_empty() {
                        object.insert("aliases".into(), json!(aliases));
                    }
                    entry_map.insert(basename.clone(), Value::Object(object));
                }
                platform_map.insert(platform.clone(), Value::Object(entry_map));
            }
            products.insert(product.clone(), Value::Object(platform_map));
        }
        Value::Object(products)
    }

    /// Rebuild the index from disk and prune what no longer belongs.
    ///
    /// Corrupt entry directories are removed, dangling or chained alias
    /// links are unlinked, decayed entries are evicted with no floor
    /// protection, and empty platform/product directories are deleted.
    /// Every per-entry failure is contained and logged; the pass is
    /// idempotent modulo decay.
    pub fn refresh(&mut self, now: NaiveDateTime) -> Result<()> {
        debug!(root = %self.root.display(), "rebuilding the cache index");
        fs::create_dir_all(&self.root)?;
        self.index.clear();

        for product_dir in subdirectories(&self.root)? {
            let product = dir_name(&product_dir);
            let platform_dirs = match subdirectories(&product_dir) {
                Ok(dirs) => dirs,
                Err(err) => {
                    warn!(path = %product_dir.display(), error = %err, "skipping unreadable product directory");
                    continue;
                }
            };

            let mut kept = 0usize;
            for platform_dir in platform_dirs {
                let platform = dir_name(&platform_dir);
                let slot = rebuild_slot(&platform_dir, now);
                if slot.is_empty() {
                    remove_tree_logged(&platform_dir);
                } else {
                    info!("found {product}/{platform}, count: {}", slot.len());
                    self.index.put_slot(&product, &platform, slot);
                    kept += 1;
                }
            }

            if kept == 0 {
                remove_tree_logged(&product_dir);
            }
        }

        if self.index.is_empty() {
            info!("the storage is empty");
        }
        Ok(())
    }

    fn platform_dir(&self, product: &str, platform: &str) -> PathBuf {
        self.root.join(product).join(platform)
    }
}

/// The canonical directory basename for a (version, key) pair.
fn entry_basename(version: &str, key: &str) -> String {
    format!("{version}_{key}")
}

fn tuple_label(product: &str, platform: &str, version: &str, key: &str) -> String {
    format!("{product}/{version}/{platform}/{key}")
}

/// Rebuild one slot from a platform directory.
///
/// Entry directories load first; symlinks are resolved against the loaded
/// entries afterwards, so a link is kept only when its text names a real
/// sibling entry. Finishes with a floorless eviction pass.
fn rebuild_slot(platform_dir: &Path, now: NaiveDateTime) -> Slot {
    let mut slot = Slot::default();
    let mut links: Vec<String> = Vec::new();

    let children = match fs::read_dir(platform_dir) {
        Ok(children) => children,
        Err(err) => {
            warn!(path = %platform_dir.display(), error = %err, "cannot read platform directory");
            return slot;
        }
    };

    for child in children {
        let child = match child {
            Ok(child) => child,
            Err(err) => {
                warn!(path = %platform_dir.display(), error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let file_type = match child.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                warn!(path = %child.path().display(), error = %err, "skipping entry with unknown type");
                continue;
            }
        };
        let name = child.file_name().to_string_lossy().into_owned();

        if file_type.is_symlink() {
            links.push(name);
        } else if file_type.is_dir() {
            match EntryMetadata::load(&child.path()) {
                Ok(meta) => {
                    slot.insert(name, meta);
                }
                Err(err) => {
                    warn!("{err}, removing it");
                    remove_tree_logged(&child.path());
                }
            }
        }
    }

    for link in links {
        let link_path = platform_dir.join(&link);
        match restore_alias(&mut slot, &link, &link_path) {
            Ok(target) => debug!(alias = %link, target = %target, "restored alias"),
            Err(err) => {
                warn!("{err}, removing it");
                if let Err(err) = fs::remove_file(&link_path) {
                    warn!(path = %link_path.display(), error = %err, "failed to remove alias link");
                }
            }
        }
    }

    let evicted = evict_outdated(&mut slot, now, 0);
    purge_evicted(platform_dir, &evicted);
    slot
}

/// Re-register one alias link found on disk.
///
/// The link text must be the bare basename of a loaded sibling entry;
/// absolute targets, paths, and links onto other links are dangling.
fn restore_alias(slot: &mut Slot, name: &str, link_path: &Path) -> Result<String> {
    let target = fs::read_link(link_path)?;
    let target = match target.to_str() {
        Some(target) if slot.has_entry(target) => target.to_string(),
        _ => return Err(CacheError::DanglingAlias(link_path.to_path_buf())),
    };
    slot.add_alias(name.to_string(), &target)?;
    Ok(target)
}

/// Delete evicted entry directories and their alias links.
///
/// Failures are logged and swallowed: the index already dropped the entry
/// and the next maintenance pass reconciles any leftover directory.
fn purge_evicted(platform_dir: &Path, evicted: &[Evicted]) {
    for entry in evicted {
        remove_tree_logged(&platform_dir.join(&entry.basename));
        for alias in &entry.aliases {
            let link_path = platform_dir.join(alias);
            if let Err(err) = fs::remove_file(&link_path) {
                warn!(path = %link_path.display(), error = %err, "failed to remove alias link");
            }
        }
    }
}

fn remove_tree_logged(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %err, "failed to remove directory");
    }
}

/// Immediate subdirectories of `dir`, symlinks excluded, sorted by name.
fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => dirs.push(entry.path()),
            Ok(_) => {}
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "skipping entry with unknown type");
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
