//! Nullable cluster lock: in-memory leases for testing.

use relay_store::{ClusterLock, LockError};
use relay_types::{Clock, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::NullClock;

/// An in-memory [`ClusterLock`].
///
/// Leases expire against a [`NullClock`]. [`NullLock::busy_for`] makes the
/// next N acquisition attempts fail regardless of state, to exercise retry.
pub struct NullLock {
    leases: Mutex<HashMap<String, (String, Timestamp)>>,
    busy_attempts: AtomicUsize,
    attempts: AtomicUsize,
    renewals: AtomicUsize,
    clock: Arc<NullClock>,
}

impl NullLock {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(NullClock::new(0)))
    }

    pub fn with_clock(clock: Arc<NullClock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            busy_attempts: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            renewals: AtomicUsize::new(0),
            clock,
        }
    }

    /// Report the lock as taken for the next `attempts` calls to `try_acquire`.
    pub fn busy_for(&self, attempts: usize) {
        self.busy_attempts.store(attempts, Ordering::SeqCst);
    }

    /// Total `try_acquire` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Total `renew` calls so far.
    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    /// Current holder of `name`, ignoring expiry.
    pub fn holder(&self, name: &str) -> Option<String> {
        self.leases
            .lock()
            .unwrap()
            .get(name)
            .map(|(holder, _)| holder.clone())
    }

    /// Drop a lease as if it had been taken over by someone else.
    pub fn steal(&self, name: &str, thief: &str) {
        let until = self.clock.now().plus_secs(u64::MAX / 2);
        self.leases
            .lock()
            .unwrap()
            .insert(name.to_string(), (thief.to_string(), until));
    }
}

impl Default for NullLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterLock for NullLock {
    fn try_acquire(&self, name: &str, holder: &str, lease: Duration) -> Result<bool, LockError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let busy = self.busy_attempts.load(Ordering::SeqCst);
        if busy > 0 {
            self.busy_attempts.store(busy - 1, Ordering::SeqCst);
            return Ok(false);
        }

        let now = self.clock.now();
        let mut leases = self.leases.lock().unwrap();
        if let Some((current, until)) = leases.get(name) {
            if current != holder && !until.is_reached(now) {
                return Ok(false);
            }
        }
        leases.insert(
            name.to_string(),
            (holder.to_string(), now.plus_secs(lease.as_secs())),
        );
        Ok(true)
    }

    fn renew(&self, name: &str, holder: &str, lease: Duration) -> Result<bool, LockError> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let mut leases = self.leases.lock().unwrap();
        match leases.get_mut(name) {
            Some((current, until)) if current == holder => {
                *until = now.plus_secs(lease.as_secs());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
        let mut leases = self.leases.lock().unwrap();
        let held = matches!(leases.get(name), Some((current, _)) if current == holder);
        if !held {
            return Err(LockError::NotHeld {
                name: name.to_string(),
                holder: holder.to_string(),
            });
        }
        leases.remove(name);
        Ok(())
    }
}
