//! Persistence strategies
//!
//! A strategy turns one `(key, payload)` write into backend calls. The
//! worker pool is generic over [`PersistenceStrategy`], so the two variants
//! (and test doubles) are interchangeable:
//!
//! - [`TransactionalStrategy`]: lookup then insert-or-update inside a transaction
//! - [`UpsertStrategy`]: one atomic insert-or-merge maintaining a history ring

mod transactional;
mod upsert;

pub use transactional::{with_transaction, TransactionalStrategy};
pub use upsert::UpsertStrategy;

use crate::config::StrategyChoice;
use eventbench_core::{
    CancellationToken, Capabilities, Error, EventKey, Payload, Result, Row, SqlValue,
    StatementKind,
};
use std::fmt;

/// One write per call
pub trait PersistenceStrategy: Send + Sync {
    /// Persist `payload` under `key`
    ///
    /// # Errors
    ///
    /// Any backend error. The caller decides whether it is benign by looking
    /// at the cancellation token, not at the error.
    fn apply(
        &self,
        key: &EventKey,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome>;
}

/// What a successful write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The lookup found no row; a new row was inserted
    Inserted,
    /// The lookup found the row; its payload was replaced
    Updated,
    /// The atomic upsert ran; the post-update row
    Upserted(UpsertOutcome),
}

/// Row returned by the atomic upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// History ring timestamps, slot 1 first
    pub history_ts: Vec<i64>,
    /// History ring statuses, slot 1 first
    pub history_status: Vec<i64>,
    /// Timestamp of the latest ok observation
    pub last_ok: i64,
    /// Current same-status streak
    pub occurrences: i64,
    /// Streak high-water mark
    pub occurrences_wm: i64,
    /// Payload the row held before this write, `None` on first insert
    pub previous_serialized: Option<Payload>,
}

impl UpsertOutcome {
    /// Decode the upsert's returned row
    pub fn from_row(row: &Row) -> Result<Self> {
        if row.len() != 6 {
            return Err(Error::UnexpectedRow(format!(
                "upsert returned {} columns, expected 6",
                row.len()
            )));
        }
        Ok(Self {
            history_ts: row.get_int_array(0)?,
            history_status: row.get_int_array(1)?,
            last_ok: row.get_int(2)?,
            occurrences: row.get_int(3)?,
            occurrences_wm: row.get_int(4)?,
            previous_serialized: row.get_blob(5)?,
        })
    }
}

/// A concrete strategy, after resolving `auto`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Transactional read-modify-write
    Transactional,
    /// Atomic upsert with history
    Upsert,
}

impl StrategyKind {
    /// Pick the strategy for a backend
    ///
    /// # Errors
    ///
    /// `Error::Config` when the backend lacks what the requested strategy needs.
    pub fn resolve(choice: StrategyChoice, caps: Capabilities) -> Result<Self> {
        match choice {
            StrategyChoice::Auto if caps.native_upsert => Ok(StrategyKind::Upsert),
            StrategyChoice::Auto | StrategyChoice::Transactional => {
                if caps.transactions {
                    Ok(StrategyKind::Transactional)
                } else {
                    Err(Error::config("backend does not support transactions"))
                }
            }
            StrategyChoice::Upsert if caps.native_upsert => Ok(StrategyKind::Upsert),
            StrategyChoice::Upsert => Err(Error::config(
                "backend has no native upsert; use the transactional strategy",
            )),
        }
    }

    /// Statements the strategy executes
    pub fn statements(&self) -> &'static [StatementKind] {
        match self {
            StrategyKind::Transactional => &[
                StatementKind::Lookup,
                StatementKind::Insert,
                StatementKind::Update,
            ],
            StrategyKind::Upsert => &[StatementKind::Upsert],
        }
    }

    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Transactional => "transactional",
            StrategyKind::Upsert => "upsert",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(namespace, entity, check)` parameters for a key
pub(crate) fn key_params(key: &EventKey) -> [SqlValue; 3] {
    [key.into(), key.into(), key.into()]
}
