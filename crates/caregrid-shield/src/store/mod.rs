//! Cross-process block state.
//!
//! The [`BlockStore`] is the single source of truth shared by every worker:
//! once one worker writes a block entry, all workers honor it on their next
//! read. Deployments point this trait at the platform's distributed cache;
//! [`MemoryBlockStore`] serves single-process setups and tests.
//!
//! Writes are idempotent set-with-TTL operations. Races between concurrent
//! writers are harmless: last write wins and the TTL simply resets.

mod memory;

pub use memory::MemoryBlockStore;

use async_trait::async_trait;
use std::time::Duration;

/// Key builders for the block/counter namespaces.
pub mod keys {
    /// Flood or hammering block for an identity
    pub fn ddos_block(identity: &str) -> String {
        format!("ddos_block:{}", identity)
    }

    /// Login brute-force block for an identity
    pub fn login_block(identity: &str) -> String {
        format!("login_block:{}", identity)
    }

    /// Full 24h escalation block for an identity
    pub fn ip_block(identity: &str) -> String {
        format!("ip_block:{}", identity)
    }

    /// Rolling injection-attempt counter for an identity
    pub fn sql_attempts(identity: &str) -> String {
        format!("sql_injection_attempt:{}", identity)
    }
}

/// Shared TTL-keyed store holding authoritative block flags and attempt
/// counters across worker processes.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Fetch a live value; expired or absent keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value with a TTL, replacing any existing entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Increment an integer counter and return the new value. A fresh or
    /// expired key starts at 1 with the given TTL; the TTL is fixed at
    /// first increment and does not slide on later ones.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;
}

/// Failures talking to the shared store
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Transport failure or backend down
    #[error("block store unavailable: {0}")]
    Unavailable(String),
    /// Increment hit a key holding a non-integer value
    #[error("counter value for {0} is not an integer")]
    NotACounter(String),
}
