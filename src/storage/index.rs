//! Two-level cache index: product → platform → slot.

use std::collections::BTreeMap;

use crate::storage::slot::Slot;

/// The full in-memory index over every (product, platform) slot.
///
/// Products with no slots and slots with no entries are pruned, so an empty
/// index means an empty cache.
#[derive(Debug, Default)]
pub struct CacheIndex {
    products: BTreeMap<String, BTreeMap<String, Slot>>,
}

impl CacheIndex {
    /// Drop everything; used by the maintenance rebuild.
    pub fn clear(&mut self) {
        self.products.clear();
    }

    pub fn slot(&self, product: &str, platform: &str) -> Option<&Slot> {
        self.products.get(product)?.get(platform)
    }

    pub fn slot_mut(&mut self, product: &str, platform: &str) -> Option<&mut Slot> {
        self.products.get_mut(product)?.get_mut(platform)
    }

    /// The slot for (product, platform), created empty if absent.
    pub fn ensure_slot(&mut self, product: &str, platform: &str) -> &mut Slot {
        self.products
            .entry(product.to_string())
            .or_default()
            .entry(platform.to_string())
            .or_default()
    }

    /// Insert a fully built slot (maintenance path). Empty slots are ignored.
    pub fn put_slot(&mut self, product: &str, platform: &str, slot: Slot) {
        if slot.is_empty() {
            return;
        }
        self.products
            .entry(product.to_string())
            .or_default()
            .insert(platform.to_string(), slot);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, Slot>)> {
        self.products.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
