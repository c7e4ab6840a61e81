//! Nullable store: thread-safe in-memory key-value storage for testing.

use relay_store::{KvStore, StoreError};
use relay_types::{Clock, Timestamp};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::NullClock;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Timestamp>,
}

/// An in-memory [`KvStore`] with TTL support driven by a [`NullClock`].
///
/// Every successful `set` is appended to a write log so tests can assert
/// exactly which keys were written, and how often.
pub struct NullStore {
    entries: Mutex<HashMap<String, Entry>>,
    writes: Mutex<Vec<String>>,
    failing_keys: Mutex<HashSet<String>>,
    clock: Arc<NullClock>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(NullClock::new(0)))
    }

    pub fn with_clock(clock: Arc<NullClock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            failing_keys: Mutex::new(HashSet::new()),
            clock,
        }
    }

    pub fn clock(&self) -> &NullClock {
        &self.clock
    }

    /// Make every future `set` of `key` fail with a backend error.
    pub fn fail_writes_to(&self, key: impl Into<String>) {
        self.failing_keys.lock().unwrap().insert(key.into());
    }

    /// Keys of every successful `set`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// How many successful `set` calls targeted `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }

    pub fn clear_write_log(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Whether `key` is stored at all, ignoring expiry.
    pub fn contains_raw(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    /// Remaining TTL of `key` in seconds, `None` for no expiry or no entry.
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|deadline| now.elapsed_since(deadline))
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for NullStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| !e.expires_at.is_some_and(|deadline| deadline.is_reached(now)))
            .map(|e| e.value.clone()))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(StoreError::Backend(format!("injected write failure for {key}")));
        }
        let expires_at = ttl.map(|ttl| self.clock.now().plus_secs(ttl.as_secs()));
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        self.writes.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
