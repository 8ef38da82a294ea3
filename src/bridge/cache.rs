//! Generic bounded-lifetime cache.
//!
//! One abstraction covers every pending-response shape the bridge needs:
//! get-or-create (abort handles keyed by message id), single-use
//! get-and-delete (interaction replies), and size-capped dedupe sets.
//! Entries expire after a max age; a periodic sweep reclaims them.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// A key→value store bounded by entry age and, optionally, entry count.
///
/// Lookups on absent or expired keys return `None`, never an error.
/// Expired entries linger until `sweep` (or a `take`) removes them, but
/// are invisible to every accessor.
pub struct BoundedCache<K, V> {
    max_age: Duration,
    max_size: Option<usize>,
    entries: HashMap<K, CacheEntry<V>>,
    /// Insertion order, oldest first, for size-cap eviction.
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Age-bounded cache with no entry cap.
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            max_size: None,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Age-bounded cache that also evicts its oldest entry beyond a hard cap.
    pub fn with_max_size(max_age: Duration, max_size: usize) -> Self {
        Self {
            max_age,
            max_size: Some(max_size.max(1)),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        entry.inserted_at.elapsed() > self.max_age
    }

    /// Insert a value, replacing any previous entry for the key and
    /// evicting the oldest entry if the size cap is hit.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.order.push_back(key);

        if let Some(cap) = self.max_size {
            while self.entries.len() > cap {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                } else {
                    break;
                }
            }
        }
    }

    /// Look a value up. Expired entries read as absent.
    pub fn get(&self, key: &K) -> Option<&V> {
        let entry = self.entries.get(key)?;
        if self.is_expired(entry) {
            return None;
        }
        Some(&entry.value)
    }

    /// Get-or-create: returns the live value for the key, inserting the
    /// result of `create` when absent or expired.
    pub fn ensure_with(&mut self, key: K, create: impl FnOnce() -> V) -> &mut V {
        let needs_insert = match self.entries.get(&key) {
            Some(entry) => self.is_expired(entry),
            None => true,
        };
        if needs_insert {
            self.insert(key.clone(), create());
        }
        // The entry was just inserted (or verified live).
        &mut self.entries.get_mut(&key).unwrap().value
    }

    /// Single-use lookup: removes and returns the value. Expired entries
    /// are removed but read as absent.
    pub fn take(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        if entry.inserted_at.elapsed() > self.max_age {
            return None;
        }
        Some(entry.value)
    }

    /// Remove entries older than the max age. Returns how many were removed.
    pub fn sweep(&mut self) -> usize {
        let max_age = self.max_age;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= max_age);
        let removed = before - self.entries.len();
        if removed > 0 {
            let entries = &self.entries;
            self.order.retain(|k| entries.contains_key(k));
        }
        removed
    }

    /// Number of stored entries, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
