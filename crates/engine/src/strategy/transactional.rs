//! Transactional read-modify-write
//!
//! ```text
//! BEGIN
//!   SELECT serialized WHERE key = K     (locks K, present or absent)
//!   not found -> INSERT K
//!   found     -> UPDATE K
//! COMMIT                                (ROLLBACK on any error)
//! ```
//!
//! Correct only if the lookup takes a lock that serializes a concurrent
//! lookup-then-insert on the same key. The memory backend locks the key
//! whether or not the row exists; SQLite takes the database write lock at
//! `BEGIN IMMEDIATE`. PostgreSQL and MySQL row locks only cover existing
//! rows, so those backends take a per-key lock (advisory or named) before
//! the lookup runs.

use super::{key_params, PersistenceStrategy, WriteOutcome};
use crate::statements::StatementSet;
use eventbench_core::{
    Backend, CancellationToken, Error, EventKey, Payload, Result, SqlValue, StatementKind,
    Transaction,
};
use tracing::debug;

/// Run `f` in a transaction: commit on `Ok`, roll back on `Err`
pub fn with_transaction<B, T, F>(backend: &B, cancel: &CancellationToken, f: F) -> Result<T>
where
    B: Backend,
    F: FnOnce(&mut B::Tx<'_>) -> Result<T>,
{
    let mut tx = backend.begin(cancel)?;
    match f(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                debug!(
                    target: "eventbench::worker",
                    error = %rollback_err,
                    "rollback failed"
                );
            }
            Err(e)
        }
    }
}

/// Lookup then insert-or-update in one transaction
pub struct TransactionalStrategy<'s, B: Backend> {
    backend: &'s B,
    lookup: &'s B::Statement,
    insert: &'s B::Statement,
    update: &'s B::Statement,
}

impl<'s, B: Backend> TransactionalStrategy<'s, B> {
    /// Bind to prepared lookup, insert and update statements
    pub fn new(backend: &'s B, statements: &'s StatementSet<'_, B>) -> Result<Self> {
        let get = |kind: StatementKind| {
            statements.get(kind).ok_or(Error::Unsupported {
                backend: backend.name(),
                statement: kind.as_str(),
            })
        };
        Ok(Self {
            backend,
            lookup: get(StatementKind::Lookup)?,
            insert: get(StatementKind::Insert)?,
            update: get(StatementKind::Update)?,
        })
    }
}

impl<B: Backend> PersistenceStrategy for TransactionalStrategy<'_, B> {
    fn apply(
        &self,
        key: &EventKey,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        with_transaction(self.backend, cancel, |tx| {
            let found = tx.query_row(self.lookup, &key_params(key), cancel)?;
            match found {
                None => {
                    let params = [key.into(), key.into(), key.into(), SqlValue::from(payload)];
                    tx.execute(self.insert, &params, cancel)?;
                    Ok(WriteOutcome::Inserted)
                }
                Some(_) => {
                    let params = [SqlValue::from(payload), key.into(), key.into(), key.into()];
                    let affected = tx.execute(self.update, &params, cancel)?;
                    if affected != 1 {
                        return Err(Error::UnexpectedRow(format!(
                            "update of locked row affected {} rows",
                            affected
                        )));
                    }
                    Ok(WriteOutcome::Updated)
                }
            }
        })
    }
}
