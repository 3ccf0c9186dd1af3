use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache entry envelope as persisted in its storage slot.
///
/// Serialised as `{ "data": ..., "timestamp": <ms>, "ttl": <ms> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Creation time, milliseconds since epoch.
    pub timestamp: i64,
    /// Time-to-live in milliseconds.
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp: i64, ttl: Duration) -> Self {
        Self {
            data,
            timestamp,
            ttl: ttl.as_millis() as u64,
        }
    }

    /// An entry is live while `now - timestamp <= ttl`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        is_expired(self.timestamp, self.ttl, now)
    }
}

pub(crate) fn is_expired(timestamp: i64, ttl: u64, now: i64) -> bool {
    now.saturating_sub(timestamp) as i128 > ttl as i128
}

/// Envelope header without the payload, enough for sweeps and eviction.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct EntryHeader {
    pub timestamp: i64,
    pub ttl: u64,
}

impl EntryHeader {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        is_expired(self.timestamp, self.ttl, now)
    }
}

/// Manifest of every key the cache believes it holds.
///
/// `total_size` is additive bookkeeping; only a reconciling sweep or an
/// eviction pass recomputes it from the slots themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheIndex {
    pub keys: Vec<String>,
    pub total_size: usize,
    pub last_cleanup: i64,
}

impl CacheIndex {
    pub fn empty(now: i64) -> Self {
        Self {
            keys: Vec::new(),
            total_size: 0,
            last_cleanup: now,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn remove_key(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
    }

    /// Adds `key` if missing and grows `total_size` by `size`.
    ///
    /// The previous size of an overwritten key is not subtracted.
    pub fn record_write(&mut self, key: &str, size: usize) {
        if !self.contains(key) {
            self.keys.push(key.to_string());
        }
        self.total_size += size;
    }
}
