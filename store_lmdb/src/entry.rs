//! On-disk framing for values with an optional expiry.

use relay_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::LmdbError;

/// A stored value and the moment it stops being readable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub expires_at: Option<Timestamp>,
    pub value: Vec<u8>,
}

impl StoredEntry {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|deadline| deadline.is_reached(now))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LmdbError> {
        bincode::serialize(self).map_err(|e| LmdbError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LmdbError> {
        bincode::deserialize(bytes).map_err(|e| LmdbError::Serialization(e.to_string()))
    }
}

/// A cluster lock lease.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub holder: String,
    pub expires_at: Timestamp,
}

impl LeaseRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, LmdbError> {
        bincode::serialize(self).map_err(|e| LmdbError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LmdbError> {
        bincode::deserialize(bytes).map_err(|e| LmdbError::Serialization(e.to_string()))
    }
}
