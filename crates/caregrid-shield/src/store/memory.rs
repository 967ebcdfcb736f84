//! In-process block store backed by a TTL map.
//!
//! Entries expire lazily on read and are swept when the map grows past its
//! bound, so an attacker cycling identities cannot exhaust memory. Suitable
//! for single-worker deployments and tests; multi-worker deployments point
//! [`BlockStore`] at the platform cache instead.

use super::{BlockStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Maximum entries before a forced sweep of expired keys.
pub const MAX_ENTRIES: usize = 100_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe in-memory TTL store.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. The background housekeeping task calls this;
    /// writes also trigger it when the map exceeds [`MAX_ENTRIES`].
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, entry| entry.live(now));
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove everything. Primarily for tests.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn sweep_if_full(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        if entries.len() >= MAX_ENTRIES {
            entries.retain(|_, entry| entry.live(now));
        }
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        self.sweep_if_full(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        self.sweep_if_full(&mut entries, now);

        match entries.get_mut(key).filter(|entry| entry.live(now)) {
            Some(entry) => {
                let count: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| StoreError::NotACounter(key.to_string()))?;
                let count = count + 1;
                entry.value = count.to_string();
                // expires_at stays put: the window opened on the first hit
                Ok(count)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        }
    }
}
