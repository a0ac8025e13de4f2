//! Atomic upsert with bounded history
//!
//! One statement per write and no application transaction: the backend
//! merges the observation into the row's counters and 20-slot history ring
//! in a single indivisible step and returns the post-update state.

use super::{PersistenceStrategy, UpsertOutcome, WriteOutcome};
use crate::config::ObservationConfig;
use crate::statements::StatementSet;
use eventbench_core::{
    Backend, CancellationToken, Error, EventKey, Payload, Result, SqlValue, StatementKind,
};

/// Single-statement insert-or-merge
pub struct UpsertStrategy<'s, B: Backend> {
    backend: &'s B,
    upsert: &'s B::Statement,
    observation: ObservationConfig,
}

impl<'s, B: Backend> UpsertStrategy<'s, B> {
    /// Bind to a prepared upsert statement
    pub fn new(
        backend: &'s B,
        statements: &'s StatementSet<'_, B>,
        observation: ObservationConfig,
    ) -> Result<Self> {
        let upsert = statements
            .get(StatementKind::Upsert)
            .ok_or(Error::Unsupported {
                backend: backend.name(),
                statement: StatementKind::Upsert.as_str(),
            })?;
        Ok(Self {
            backend,
            upsert,
            observation,
        })
    }
}

impl<B: Backend> PersistenceStrategy for UpsertStrategy<'_, B> {
    fn apply(
        &self,
        key: &EventKey,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        let obs = self.observation.observe();
        let params = [
            key.into(),
            key.into(),
            key.into(),
            SqlValue::Int(obs.status),
            SqlValue::Int(obs.timestamp),
            SqlValue::from(payload),
        ];
        let row = self
            .backend
            .query_row(self.upsert, &params, cancel)?
            .ok_or_else(|| Error::UnexpectedRow("upsert returned no row".to_string()))?;
        Ok(WriteOutcome::Upserted(UpsertOutcome::from_row(&row)?))
    }
}
