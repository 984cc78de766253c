//! Response cache for completed harvests
//!
//! Entries are keyed by normalized keyword and page budget and expire purely
//! by age. The cache is bounded; when full, the entry closest to expiry is
//! evicted to make room.

use crate::source::Record;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Builds the cache key for a keyword and page budget
///
/// The keyword is trimmed and lowercased, so `" Desk Lamp "` and
/// `"desk lamp"` share an entry.
pub fn cache_key(keyword: &str, max_pages: u32) -> String {
    format!("search:{}:pages:{}", keyword.trim().to_lowercase(), max_pages)
}

/// A cached harvest result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,

    /// Validated, de-duplicated records
    pub records: Vec<Record>,

    /// Where the records were persisted, if anywhere
    pub locator: Option<String>,

    pub pages_scraped: u32,

    /// Records collected before validation
    pub total_found: usize,

    pub quality_score: f64,
}

/// A stored entry and the instant it stops being served
#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Time- and size-bounded harvest cache
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, Slot>>,
}

impl ResponseCache {
    /// Creates an empty cache
    ///
    /// # Arguments
    ///
    /// * `ttl` - Lifetime of every entry
    /// * `max_entries` - Maximum number of live entries (at least 1)
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a live entry for `key`, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        match entries.get(key) {
            Some(slot) if slot.is_expired(now) => {
                tracing::debug!("Cache entry '{}' expired", key);
                entries.remove(key);
                None
            }
            Some(slot) => Some(slot.entry.clone()),
            None => None,
        }
    }

    /// Returns when the live entry for `key` expires
    pub fn expires_at(&self, key: &str) -> Option<Instant> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        entries
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.expires_at)
    }

    /// Stores a harvest result under its key, expiring one TTL from now
    pub fn insert(&self, entry: CacheEntry) {
        let now = Instant::now();
        let expires_at = now + self.ttl;

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, existing| !existing.is_expired(now));

        if !entries.contains_key(&entry.key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, slot)| slot.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                tracing::debug!("Cache full; evicting '{}'", oldest);
                entries.remove(&oldest);
            }
        }

        entries.insert(entry.key.clone(), Slot { entry, expires_at });
    }

    /// Removes every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, slot| !slot.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
