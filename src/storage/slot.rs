//! One (product, platform) slot: canonical entries plus alias links.

use std::collections::BTreeMap;

use crate::error::{CacheError, Result};
use crate::storage::metadata::EntryMetadata;

/// In-memory index for a single (product, platform) pair.
///
/// `entries` maps canonical directory basenames (`<version>_<key>`) to their
/// metadata; `aliases` maps alias basenames to canonical basenames. Every
/// alias target must be a key of `entries`, and aliases never chain.
#[derive(Debug, Default)]
pub struct Slot {
    entries: BTreeMap<String, EntryMetadata>,
    aliases: BTreeMap<String, String>,
}

impl Slot {
    /// Insert a canonical entry.
    pub fn insert(&mut self, basename: String, meta: EntryMetadata) {
        self.entries.insert(basename, meta);
    }

    pub fn get(&self, basename: &str) -> Option<&EntryMetadata> {
        self.entries.get(basename)
    }

    pub fn get_mut(&mut self, basename: &str) -> Option<&mut EntryMetadata> {
        self.entries.get_mut(basename)
    }

    pub fn has_entry(&self, basename: &str) -> bool {
        self.entries.contains_key(basename)
    }

    /// Remove a canonical entry, cascading to every alias that targets it.
    ///
    /// Returns the removed metadata together with the removed alias
    /// basenames so the disk layer can unlink them.
    pub fn remove(&mut self, basename: &str) -> Option<(EntryMetadata, Vec<String>)> {
        let meta = self.entries.remove(basename)?;
        let removed: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == basename)
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in &removed {
            self.aliases.remove(alias);
        }
        Some((meta, removed))
    }

    /// Register `alias` as a link to the canonical entry `canonical`.
    ///
    /// Fails with `AlreadyExists` when the alias name collides with an entry
    /// or another alias, and with `NotFound` when the target entry is absent.
    pub fn add_alias(&mut self, alias: String, canonical: &str) -> Result<()> {
        if self.entries.contains_key(&alias) || self.aliases.contains_key(&alias) {
            return Err(CacheError::AlreadyExists(alias));
        }
        if !self.entries.contains_key(canonical) {
            return Err(CacheError::NotFound(canonical.to_string()));
        }
        self.aliases.insert(alias, canonical.to_string());
        Ok(())
    }

    /// Unregister an alias (rollback path when the link cannot be created).
    pub fn remove_alias(&mut self, alias: &str) -> bool {
        self.aliases.remove(alias).is_some()
    }

    /// Resolve a requested basename to a canonical one, permitting at most
    /// one alias hop. A chained alias resolves to nothing.
    pub fn resolve(&self, basename: &str) -> Option<&str> {
        if self.entries.contains_key(basename) {
            return self.entries.get_key_value(basename).map(|(k, _)| k.as_str());
        }
        let target = self.aliases.get(basename)?;
        self.entries.contains_key(target).then_some(target.as_str())
    }

    /// Alias basenames targeting the given canonical entry, in order.
    pub fn aliases_of(&self, canonical: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|(_, target)| target.as_str() == canonical)
            .map(|(alias, _)| alias.as_str())
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &EntryMetadata)> {
        self.entries.iter()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&String, &String)> {
        self.aliases.iter()
    }

    /// Number of canonical entries (aliases are not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn meta() -> EntryMetadata {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        EntryMetadata::new(now)
    }

    #[test]
    fn test_insert_and_get() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        assert!(slot.get("1.0_k").is_some());
        assert!(slot.get("1.0_other").is_none());
        assert_eq!(slot.len(), 1);
    }

    #[test]
    fn test_resolve_entry_directly() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        assert_eq!(slot.resolve("1.0_k"), Some("1.0_k"));
        assert_eq!(slot.resolve("1.0_missing"), None);
    }

    #[test]
    fn test_resolve_via_alias() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        slot.add_alias("1.0_k2".into(), "1.0_k").unwrap();
        assert_eq!(slot.resolve("1.0_k2"), Some("1.0_k"));
    }

    #[test]
    fn test_alias_requires_existing_target() {
        let mut slot = Slot::default();
        let err = slot.add_alias("1.0_a".into(), "1.0_missing").unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
    }

    #[test]
    fn test_alias_cannot_shadow_entry() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        slot.insert("1.0_other".into(), meta());
        let err = slot.add_alias("1.0_k".into(), "1.0_other").unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists(_)));
    }

    #[test]
    fn test_alias_cannot_be_redefined() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        slot.add_alias("1.0_a".into(), "1.0_k").unwrap();
        let err = slot.add_alias("1.0_a".into(), "1.0_k").unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists(_)));
    }

    #[test]
    fn test_remove_cascades_aliases() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        slot.insert("1.0_other".into(), meta());
        slot.add_alias("1.0_a".into(), "1.0_k").unwrap();
        slot.add_alias("1.0_b".into(), "1.0_k").unwrap();
        slot.add_alias("1.0_c".into(), "1.0_other").unwrap();

        let (_, removed) = slot.remove("1.0_k").unwrap();
        assert_eq!(removed, vec!["1.0_a".to_string(), "1.0_b".to_string()]);
        assert_eq!(slot.resolve("1.0_a"), None);
        assert_eq!(slot.resolve("1.0_b"), None);
        // Aliases of other entries are untouched.
        assert_eq!(slot.resolve("1.0_c"), Some("1.0_other"));
    }

    #[test]
    fn test_alias_target_integrity() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        slot.add_alias("1.0_a".into(), "1.0_k").unwrap();
        for (_, target) in slot.aliases() {
            assert!(slot.has_entry(target));
        }
    }

    #[test]
    fn test_aliases_of() {
        let mut slot = Slot::default();
        slot.insert("1.0_k".into(), meta());
        slot.add_alias("1.0_b".into(), "1.0_k").unwrap();
        slot.add_alias("1.0_a".into(), "1.0_k").unwrap();
        assert_eq!(slot.aliases_of("1.0_k"), vec!["1.0_a", "1.0_b"]);
        assert!(slot.aliases_of("1.0_missing").is_empty());
    }
}
