//! Cluster-wide mutual exclusion trait.

use std::time::Duration;

use crate::LockError;

/// A named, lease-based lock shared by every process of a deployment.
///
/// Acquisition is non-blocking here; waiting with backoff is the caller's
/// job. A lease that is not renewed before it runs out may be taken over by
/// another holder.
pub trait ClusterLock: Send + Sync {
    /// Try to take `name` for `holder`. Returns `false` if someone else holds
    /// a live lease. Re-acquiring a lease you already hold refreshes it.
    fn try_acquire(&self, name: &str, holder: &str, lease: Duration) -> Result<bool, LockError>;

    /// Extend a lease `holder` already owns. Returns `false` if the lease was
    /// lost (expired and taken, or released).
    fn renew(&self, name: &str, holder: &str, lease: Duration) -> Result<bool, LockError>;

    /// Give up the lease. Fails with [`LockError::NotHeld`] if `holder` does
    /// not own it.
    fn release(&self, name: &str, holder: &str) -> Result<(), LockError>;
}
