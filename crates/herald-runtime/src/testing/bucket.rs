use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use herald_core::transport::BoxFuture;
use herald_core::{KeyValueStore, KvError};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    revision: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    last_revision: u64,
}

/// In-process lease bucket.
///
/// Revisions come from one bucket-wide sequence. Leases are measured on
/// the tokio clock, so paused-time tests expire keys deterministically.
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryBucket {
    state: Arc<Mutex<State>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryBucket {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`KvError::Unavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Live value and revision for `key`.
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, u64)> {
        let state = self.lock();
        state
            .entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| (e.value.clone(), e.revision))
    }

    /// Drop `key` immediately, as if its lease had run out.
    pub fn expire(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("bucket offline".to_string()));
        }
        Ok(())
    }

    fn create_now(&self, key: &str, value: &[u8], ttl: Duration) -> Result<u64, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.lock();

        if let Some(existing) = state.entries.get(key) {
            if existing.expires_at > now {
                return Err(KvError::Conflict(key.to_string()));
            }
        }

        state.last_revision += 1;
        let revision = state.last_revision;
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                revision,
                expires_at: now + ttl,
            },
        );

        Ok(revision)
    }

    fn update_now(
        &self,
        key: &str,
        value: &[u8],
        expected: u64,
        ttl: Duration,
    ) -> Result<u64, KvError> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.lock();

        match state.entries.get(key) {
            None => return Err(KvError::Conflict(key.to_string())),
            Some(entry) if entry.expires_at <= now => {
                return Err(KvError::Expired(key.to_string()))
            }
            Some(entry) if entry.revision != expected => {
                return Err(KvError::Conflict(key.to_string()))
            }
            Some(_) => {}
        }

        state.last_revision += 1;
        let revision = state.last_revision;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.value = value.to_vec();
            entry.revision = revision;
            entry.expires_at = now + ttl;
        }

        Ok(revision)
    }
}

impl KeyValueStore for MemoryBucket {
    fn create<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        ttl: Duration,
    ) -> BoxFuture<'a, Result<u64, KvError>> {
        Box::pin(async move { self.create_now(key, value, ttl) })
    }

    fn update<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        revision: u64,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<u64, KvError>> {
        Box::pin(async move { self.update_now(key, value, revision, ttl) })
    }
}
