//! Short-lived UID → last-seen map with a presence TTL.
//!
//! Generalises a flat `reader_connected`/`card_present`/`last_data_read`
//! tracking style into a proper map keyed by UID, so more than one card
//! can be tracked at a time.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::uid::Uid;

struct Entry {
    hash: u64,
    last_seen_at: Instant,
}

/// Internally synchronised; a
/// `RwLock` over a plain `HashMap` rather than a concurrent map, matching
/// the single-worker-per-device scale this core targets.
pub struct TagCache {
    entries: RwLock<HashMap<Uid, Entry>>,
    presence_ttl: Duration,
}

impl TagCache {
    pub fn new(presence_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            presence_ttl,
        }
    }

    pub fn hash_payload(bytes: &[u8]) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        bytes.hash(&mut hasher);
        hasher.finish()
    }

    /// True if `uid` is unseen, or its stored hash differs from `hash`.
    /// Updates the stored hash and `last_seen_at` either way.
    pub fn has_changed(&self, uid: &Uid, hash: u64) -> bool {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(uid) {
            Some(entry) => {
                let changed = entry.hash != hash;
                entry.hash = hash;
                entry.last_seen_at = Instant::now();
                changed
            }
            None => {
                entries.insert(
                    uid.clone(),
                    Entry {
                        hash,
                        last_seen_at: Instant::now(),
                    },
                );
                true
            }
        }
    }

    /// Refresh `last_seen_at` without touching the stored hash.
    pub fn touch(&self, uid: &Uid) {
        let mut entries = self.entries.write().unwrap();
        entries
            .entry(uid.clone())
            .or_insert_with(|| Entry {
                hash: 0,
                last_seen_at: Instant::now(),
            })
            .last_seen_at = Instant::now();
    }

    /// True iff exactly one UID is within the presence TTL.
    pub fn is_present(&self) -> bool {
        self.present_uids().len() == 1
    }

    /// Every UID currently within the presence TTL.
    pub fn present_uids(&self) -> Vec<Uid> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|(_, e)| e.last_seen_at.elapsed() < self.presence_ttl)
            .map(|(uid, _)| uid.clone())
            .collect()
    }

    /// The single present UID, if exactly one is within the TTL.
    pub fn get_last_scanned(&self) -> Option<Uid> {
        let present = self.present_uids();
        if present.len() == 1 {
            present.into_iter().next()
        } else {
            None
        }
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> Uid {
        Uid::from_hex(s)
    }

    #[test]
    fn has_changed_true_on_first_sighting_then_false_on_same_hash() {
        let cache = TagCache::new(Duration::from_millis(200));
        assert!(cache.has_changed(&uid("04AA"), 42));
        assert!(!cache.has_changed(&uid("04AA"), 42));
        assert!(cache.has_changed(&uid("04AA"), 43));
    }

    #[test]
    fn is_present_true_only_for_exactly_one_uid_within_ttl() {
        let cache = TagCache::new(Duration::from_millis(200));
        assert!(!cache.is_present());
        cache.touch(&uid("04AA"));
        assert!(cache.is_present());
        cache.touch(&uid("04BB"));
        assert!(!cache.is_present());
    }

    #[test]
    fn presence_expires_after_ttl() {
        let cache = TagCache::new(Duration::from_millis(10));
        cache.touch(&uid("04AA"));
        assert!(cache.is_present());
        std::thread::sleep(Duration::from_millis(30));
        assert!(!cache.is_present());
    }

    #[test]
    fn clear_drops_all_entries() {
        let cache = TagCache::new(Duration::from_millis(200));
        cache.touch(&uid("04AA"));
        cache.clear();
        assert!(cache.get_last_scanned().is_none());
    }
}
