//! In-memory events table
//!
//! Rows are keyed by their composite key in a DashMap, so the uniqueness
//! constraint is the map's key uniqueness. Every mutating method returns the
//! prior image of the row so callers can keep an undo log.
//!
//! The table itself takes only shard locks for the duration of one call.
//! Row locks that span a transaction live in the backend's lock table.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use eventbench_core::{CompositeKey, Error, EventRecord, Observation, Payload, Result};

/// The `events` table
#[derive(Debug, Default)]
pub struct EventTable {
    rows: DashMap<CompositeKey, EventRecord>,
}

impl EventTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the row for `key`
    pub fn get(&self, key: &CompositeKey) -> Option<EventRecord> {
        self.rows.get(key).map(|r| r.value().clone())
    }

    /// Insert a new row
    ///
    /// # Errors
    ///
    /// `Error::DuplicateKey` if a row with the same composite key exists.
    pub fn insert(&self, key: CompositeKey, record: EventRecord) -> Result<()> {
        match self.rows.entry(key) {
            Entry::Occupied(e) => Err(Error::DuplicateKey(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(record);
                Ok(())
            }
        }
    }

    /// Replace the row's payload, returning the prior image
    ///
    /// Returns `None` (zero rows affected) if the row does not exist.
    pub fn update_serialized(&self, key: &CompositeKey, payload: Payload) -> Option<EventRecord> {
        let mut row = self.rows.get_mut(key)?;
        let prior = row.clone();
        row.serialized = payload;
        Some(prior)
    }

    /// Insert-or-merge with history in one step
    ///
    /// Returns the prior image (`None` if the row was created) and the new row.
    pub fn upsert(
        &self,
        key: CompositeKey,
        payload: Payload,
        obs: Observation,
    ) -> (Option<EventRecord>, EventRecord) {
        match self.rows.entry(key) {
            Entry::Occupied(mut e) => {
                let prior = e.get().clone();
                e.get_mut().upsert(payload, obs);
                (Some(prior), e.get().clone())
            }
            Entry::Vacant(e) => {
                let row = EventRecord::first_observation(payload, obs);
                e.insert(row.clone());
                (None, row)
            }
        }
    }

    /// Restore a prior image: `None` removes the row
    pub fn restore(&self, key: CompositeKey, prior: Option<EventRecord>) {
        match prior {
            Some(record) => {
                self.rows.insert(key, record);
            }
            None => {
                self.rows.remove(&key);
            }
        }
    }

    /// Remove every row, returning how many were removed
    pub fn clear(&self) -> u64 {
        let count = self.rows.len() as u64;
        self.rows.clear();
        count
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
