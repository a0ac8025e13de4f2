//! Event record and the history-tracking merge rules
//!
//! `CheckState` is the derived state the atomic upsert maintains next to the
//! payload. The rules are a flap detector: `occurrences` is the current
//! same-status streak and `occurrences_wm` its high-water mark.
//!
//! ## Merge Rules
//!
//! On every write after the first, computed from the *previous* values:
//!
//! ```text
//! last_ok        = new ok ? ts : last_ok
//! occurrences    = status unchanged ? occurrences + 1 : 1
//! occurrences_wm = prev ok && new not ok          -> 1
//!                  status changed                 -> occurrences_wm
//!                  occurrences < occurrences_wm   -> occurrences_wm
//!                  otherwise                      -> occurrences_wm + 1
//! history[(history_index % 20) + 1] = (ts, status); history_index advances to that slot
//! ```
//!
//! The high-water mark resets only on an ok -> not-ok transition, never on
//! not-ok -> ok.

use crate::types::{Observation, Payload, STATUS_OK};

/// Number of slots in the history ring
pub const HISTORY_LEN: usize = 20;

/// Fixed-length circular buffer of `(timestamp, status)` observations
///
/// Slots are 1-indexed. `index` names the slot written most recently, so the
/// next write lands in `(index % HISTORY_LEN) + 1`. The backing arrays grow
/// until all slots are populated, then wrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRing {
    index: usize,
    timestamps: Vec<i64>,
    statuses: Vec<i64>,
}

impl HistoryRing {
    /// Ring holding a single observation in slot 1
    pub fn first(obs: Observation) -> Self {
        let mut timestamps = Vec::with_capacity(HISTORY_LEN);
        let mut statuses = Vec::with_capacity(HISTORY_LEN);
        timestamps.push(obs.timestamp);
        statuses.push(obs.status);
        Self {
            index: 1,
            timestamps,
            statuses,
        }
    }

    /// Slot the next observation will be written to
    #[inline]
    pub fn next_slot(&self) -> usize {
        (self.index % HISTORY_LEN) + 1
    }

    /// Write an observation into the next slot and advance the index
    pub fn record(&mut self, obs: Observation) {
        let slot = self.next_slot();
        debug_assert!(slot <= self.timestamps.len() + 1, "history slots are written in order");
        if slot > self.timestamps.len() {
            self.timestamps.push(obs.timestamp);
            self.statuses.push(obs.status);
        } else {
            self.timestamps[slot - 1] = obs.timestamp;
            self.statuses[slot - 1] = obs.status;
        }
        self.index = slot;
    }

    /// Slot of the most recent write, in `[1, HISTORY_LEN]`
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of populated slots
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no slot is populated (never true for a constructed ring)
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Observation stored in a 1-indexed slot
    pub fn slot(&self, slot: usize) -> Option<Observation> {
        if slot == 0 {
            return None;
        }
        let ts = *self.timestamps.get(slot - 1)?;
        let status = *self.statuses.get(slot - 1)?;
        Some(Observation::new(status, ts))
    }

    /// Timestamps in slot order
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// Statuses in slot order
    pub fn statuses(&self) -> &[i64] {
        &self.statuses
    }
}

/// Derived check state maintained by the atomic upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckState {
    /// Status of the most recent observation
    pub status: i64,
    /// Timestamp of the most recent ok observation, 0 if none
    pub last_ok: i64,
    /// Current consecutive same-status streak
    pub occurrences: i64,
    /// Streak high-water mark
    pub occurrences_wm: i64,
    /// Last [`HISTORY_LEN`] observations
    pub history: HistoryRing,
}

impl CheckState {
    /// State of a row created by its first observation
    pub fn first(obs: Observation) -> Self {
        Self {
            status: obs.status,
            last_ok: if obs.is_ok() { obs.timestamp } else { 0 },
            occurrences: 1,
            occurrences_wm: 1,
            history: HistoryRing::first(obs),
        }
    }

    /// Merge a new observation into the state
    ///
    /// Every field is computed from the previous values before any is
    /// assigned, matching a single-statement `SET (...) = (...)`.
    pub fn observe(&mut self, obs: Observation) {
        let prev_status = self.status;
        let status_changed = prev_status != obs.status;

        let last_ok = if obs.is_ok() {
            obs.timestamp
        } else {
            self.last_ok
        };

        let occurrences = if status_changed {
            1
        } else {
            self.occurrences + 1
        };

        let occurrences_wm = if prev_status == STATUS_OK && !obs.is_ok() {
            1
        } else if status_changed {
            self.occurrences_wm
        } else if self.occurrences < self.occurrences_wm {
            self.occurrences_wm
        } else {
            self.occurrences_wm + 1
        };

        self.status = obs.status;
        self.last_ok = last_ok;
        self.occurrences = occurrences;
        self.occurrences_wm = occurrences_wm;
        self.history.record(obs);
    }
}

/// A persisted event row (without its key)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Current serialized payload
    pub serialized: Payload,
    /// Payload held before the most recent upsert
    pub previous_serialized: Option<Payload>,
    /// History-tracking state; absent for rows written by plain insert/update
    pub check: Option<CheckState>,
}

impl EventRecord {
    /// Row created by a plain insert
    pub fn new(serialized: Payload) -> Self {
        Self {
            serialized,
            previous_serialized: None,
            check: None,
        }
    }

    /// Row created by the first upsert for its key
    pub fn first_observation(serialized: Payload, obs: Observation) -> Self {
        Self {
            serialized,
            previous_serialized: None,
            check: Some(CheckState::first(obs)),
        }
    }

    /// Apply an upsert conflict: merge the observation, keep the old payload
    pub fn upsert(&mut self, serialized: Payload, obs: Observation) {
        match self.check.as_mut() {
            Some(state) => state.observe(obs),
            None => self.check = Some(CheckState::first(obs)),
        }
        let previous = std::mem::replace(&mut self.serialized, serialized);
        self.previous_serialized = Some(previous);
    }
}
