//! Contention key set generation

use crate::types::EventKey;

/// Generate `count` distinct contention keys
///
/// Keys are random UUID v4 values, so collisions are negligible. Indexing is
/// stable: workers address the returned slice by position for the whole run.
pub fn generate_key_set(count: usize) -> Vec<EventKey> {
    (0..count).map(|_| EventKey::generate()).collect()
}
