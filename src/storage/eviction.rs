//! Two-rule slot eviction: hard capacity cap plus an adaptive usage floor.

use chrono::NaiveDateTime;
use tracing::info;

use crate::storage::slot::Slot;

/// Hard cap on canonical entries per (product, platform) slot.
pub const MAX_SLOT_ENTRIES: usize = 15;

/// Usage-metric floor at slot occupancy 1 and at [`MAX_SLOT_ENTRIES`].
const USAGE_FLOOR_RANGE: (f64, f64) = (0.2, 0.4);

/// An entry removed by eviction, with the alias basenames that cascaded
/// with it. The disk layer deletes the directory and unlinks the aliases.
#[derive(Debug)]
pub struct Evicted {
    pub basename: String,
    pub aliases: Vec<String>,
}

/// The minimum usage metric tolerated at the given slot occupancy.
///
/// A nearly empty slot tolerates weakly used entries; a nearly full one
/// expels them before the hard cap is hit.
pub fn usage_floor(count: usize) -> f64 {
    let (lo, hi) = USAGE_FLOOR_RANGE;
    let filling = (count - 1) as f64 / (MAX_SLOT_ENTRIES - 1) as f64;
    lo + filling * (hi - lo)
}

/// Evict entries from `slot` until it satisfies both rules.
///
/// While more than `min_keep` entries remain, the entry with the smallest
/// usage metric at `now` (ties broken by smallest basename) is evicted if
/// the slot is over [`MAX_SLOT_ENTRIES`], or if its metric is below the
/// occupancy-dependent floor. `now` is sampled once by the caller and never
/// re-sampled inside the loop.
pub fn evict_outdated(slot: &mut Slot, now: NaiveDateTime, min_keep: usize) -> Vec<Evicted> {
    let mut evicted = Vec::new();

    while slot.len() > min_keep {
        let Some((victim, metric)) = weakest_entry(slot, now) else {
            break;
        };

        if slot.len() > MAX_SLOT_ENTRIES {
            info!(
                entry = %victim,
                usage_metric = metric,
                "exceeded max items count, removing the least actual item"
            );
        } else if metric < usage_floor(slot.len()) {
            info!(
                entry = %victim,
                usage_metric = metric,
                "an item has been outdated, removing it"
            );
        } else {
            break;
        }

        if let Some((_, aliases)) = slot.remove(&victim) {
            evicted.push(Evicted {
                basename: victim,
                aliases,
            });
        }
    }

    evicted
}

/// The entry with the minimum usage metric at `now`.
///
/// Scans in basename order and replaces the candidate only on a strictly
/// smaller metric, so equal metrics keep the lexicographically smallest
/// basename.
fn weakest_entry(slot: &Slot, now: NaiveDateTime) -> Option<(String, f64)> {
    let mut weakest: Option<(&String, f64)> = None;
    for (basename, meta) in slot.entries() {
        let metric = meta.usage_metric(now);
        match weakest {
            Some((_, best)) if metric >= best => {}
            _ => weakest = Some((basename, metric)),
        }
    }
    weakest.map(|(basename, metric)| (basename.clone(), metric))
}
