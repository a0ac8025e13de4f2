//! Core types for eventbench
//!
//! - EventKey: opaque contention key (UUID v4 text)
//! - CompositeKey: the (namespace, entity, check) uniqueness triple
//! - Payload: shared immutable serialized event bytes
//! - Observation: the (status, timestamp) pair fed to the history upsert

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// Status value that means "ok"
///
/// Any other status is treated as not ok by the history rules.
pub const STATUS_OK: i64 = 0;

/// Opaque contention key
///
/// Cloning is cheap; workers share one key set for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey(Arc<str>);

impl EventKey {
    /// Create a new random key from a UUID v4
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Key text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shared handle to the key text
    pub fn as_shared(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }
}

impl From<&str> for EventKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for EventKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite uniqueness key of an event row
///
/// The benchmark reuses one generated token for all three parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    /// Namespace part
    pub namespace: Arc<str>,
    /// Entity part
    pub entity: Arc<str>,
    /// Check part
    pub check: Arc<str>,
}

impl CompositeKey {
    /// Build a key from explicit parts
    pub fn new(
        namespace: impl Into<Arc<str>>,
        entity: impl Into<Arc<str>>,
        check: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            entity: entity.into(),
            check: check.into(),
        }
    }

    /// Use the event key as namespace, entity and check
    pub fn from_event_key(key: &EventKey) -> Self {
        let shared = key.as_shared();
        Self {
            namespace: Arc::clone(&shared),
            entity: Arc::clone(&shared),
            check: shared,
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.entity, self.check)
    }
}

/// Serialized event payload
///
/// Produced once per run and shared by every worker without copying.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    /// Wrap serialized bytes
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Self(Arc::from(v))
    }
}

impl From<&[u8]> for Payload {
    fn from(v: &[u8]) -> Self {
        Self(Arc::from(v))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

/// One check result: the status and when it was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Check status, [`STATUS_OK`] means ok
    pub status: i64,
    /// Observation time (seconds)
    pub timestamp: i64,
}

impl Observation {
    /// Create an observation
    pub fn new(status: i64, timestamp: i64) -> Self {
        Self { status, timestamp }
    }

    /// Whether the status is ok
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}
