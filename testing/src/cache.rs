//! In-memory coordination cache.
//!
//! Entries expire lazily against [`tokio::time::Instant`], so a test running
//! with paused time (`#[tokio::test(start_paused = true)]`) can push a claim
//! marker past its TTL with `tokio::time::advance`.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use table_orders_core::{CoordinationCache, LedgerError, Result};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`CoordinationCache`] with TTLs and fault injection.
///
/// Clones share the same entries and switches.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoordinationCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
    fail_compare_and_set: Arc<AtomicBool>,
}

impl InMemoryCoordinationCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `CacheUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `compare_and_set` (only) fail with `CacheUnavailable`.
    pub fn set_fail_compare_and_set(&self, fail: bool) {
        self.fail_compare_and_set.store(fail, Ordering::SeqCst);
    }

    /// Remaining TTL of a live entry.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Raw value of a live entry, bypassing the fault switches.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    /// Overwrite an entry, e.g. to plant a marker left by a crashed claimant.
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove an entry regardless of its value.
    pub fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// `true` if no entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::CacheUnavailable("in-memory cache switched off".into()));
        }
        Ok(())
    }

    /// Live entry under `key`, dropping it first if it has expired.
    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

impl CoordinationCache for InMemoryCoordinationCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;

        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;

        let mut entries = self.entries.lock().unwrap();
        Ok(Self::live(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn compare_and_set(&self, key: &str, expected: &str, new_value: &str) -> Result<bool> {
        self.check_available()?;
        if self.fail_compare_and_set.load(Ordering::SeqCst) {
            return Err(LedgerError::CacheUnavailable(
                "in-memory cache rejects compare_and_set".into(),
            ));
        }

        let mut entries = self.entries.lock().unwrap();
        match Self::live(&mut entries, key) {
            Some(entry) if entry.value == expected => {
                entry.value = new_value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.check_available()?;

        let mut entries = self.entries.lock().unwrap();
        let matches = Self::live(&mut entries, key).is_some_and(|e| e.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}
