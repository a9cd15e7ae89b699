// crates/workload-trust-core/src/runtime/key_cache.rs
// ============================================================================
// Module: Key Cache
// Description: Time-bounded cache of released keys keyed by hardware UUID.
// Purpose: Avoid repeat broker round trips for hosts that re-attest.
// Dependencies: time
// ============================================================================

//! ## Overview
//! One entry per host, holding the last key released to it. Expiry is lazy:
//! readers compare `expired` against their clock, and stale entries stay until
//! overwritten or purged.
//! Invariants:
//! - Entries are immutable once stored; `get` returns a copy.
//! - A cached key is never served without a fresh attestation (enforced by
//!   the key release gate, not by the cache).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use time::OffsetDateTime;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Key previously released to a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKey {
    /// Key identifier the bytes belong to.
    pub id: String,
    /// Raw key bytes.
    pub bytes: Vec<u8>,
    /// Time the key was fetched from the broker.
    pub created: OffsetDateTime,
    /// Time after which the entry must not be served.
    pub expired: OffsetDateTime,
}

impl CachedKey {
    /// Returns true once `now` has reached the expiry time.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expired
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Mutex-guarded map from hardware UUID to the last released key.
#[derive(Debug, Default)]
pub struct KeyCache {
    /// Entries keyed by hardware UUID.
    entries: Mutex<HashMap<String, CachedKey>>,
}

impl KeyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry for a host, expired or not.
    #[must_use]
    pub fn get(&self, hardware_uuid: &str) -> Option<CachedKey> {
        self.lock().get(hardware_uuid).cloned()
    }

    /// Stores or replaces the entry for a host.
    pub fn store(&self, hardware_uuid: &str, key: CachedKey) {
        self.lock().insert(hardware_uuid.to_string(), key);
    }

    /// Drops every entry expired at `now` and returns how many were removed.
    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, key| !key.is_expired(now));
        before - entries.len()
    }

    /// Number of entries, including expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Locks the entry map; entries are plain values so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedKey>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
