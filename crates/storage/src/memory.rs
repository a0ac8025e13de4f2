//! In-memory relational backend
//!
//! A self-contained backend that behaves like a small row-locking database:
//!
//! - `events` table with a composite-key uniqueness constraint ([`EventTable`])
//! - bounded pool of sessions; every statement and transaction holds one
//! - exclusive row locks taken on lookup, insert, update and upsert, held
//!   until commit or rollback. Locks apply to absent keys too, so a locking
//!   lookup that finds nothing still blocks a concurrent insert of that key.
//! - undo log per transaction; dropping a transaction rolls it back
//! - registry of prepared statements, so use after close is detected
//!
//! Statements outside an explicit transaction run as single-statement
//! transactions with the same locking.

use crate::table::EventTable;
use dashmap::DashMap;
use eventbench_concurrency::{LockTable, Pool, PoolGuard};
use eventbench_core::{
    Backend, CancellationToken, Capabilities, CompositeKey, Error, EventRecord, Observation,
    Params, Result, Row, SqlValue, StatementKind, Transaction, EVENTS_TABLE,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Memory backend settings
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Pool size
    pub connections: usize,
    /// How long a statement waits for a row lock before failing
    pub lock_wait_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            connections: 24,
            lock_wait_timeout: Duration::from_secs(50),
        }
    }
}

/// A pooled session
#[derive(Debug)]
pub struct MemorySession {
    id: usize,
}

impl MemorySession {
    /// Session number within the pool
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Prepared statement handle
#[derive(Debug, Clone)]
pub struct MemoryStatement {
    id: u64,
    kind: StatementKind,
}

impl MemoryStatement {
    /// Registry id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Statement kind
    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

/// Per-transaction bookkeeping
struct TxnState {
    id: u64,
    locked: Vec<CompositeKey>,
    undo: Vec<(CompositeKey, Option<EventRecord>)>,
}

impl TxnState {
    fn new(id: u64) -> Self {
        Self {
            id,
            locked: Vec::new(),
            undo: Vec::new(),
        }
    }
}

enum Outcome {
    Affected(u64),
    Row(Option<Row>),
}

/// In-memory backend
pub struct MemoryBackend {
    table: RwLock<Option<Arc<EventTable>>>,
    sessions: Pool<MemorySession>,
    locks: LockTable<CompositeKey>,
    statements: DashMap<u64, StatementKind>,
    next_statement_id: AtomicU64,
    next_txn_id: AtomicU64,
}

impl MemoryBackend {
    /// Create a backend with no schema
    pub fn new(config: MemoryConfig) -> Self {
        let sessions = (0..config.connections.max(1))
            .map(|id| MemorySession { id })
            .collect();
        Self {
            table: RwLock::new(None),
            sessions: Pool::new(sessions),
            locks: LockTable::new(config.lock_wait_timeout),
            statements: DashMap::new(),
            next_statement_id: AtomicU64::new(1),
            next_txn_id: AtomicU64::new(1),
        }
    }

    /// Number of statements prepared and not yet closed
    pub fn open_statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Session pool, for observing connection usage
    pub fn sessions(&self) -> &Pool<MemorySession> {
        &self.sessions
    }

    /// Row locks currently held
    pub fn held_locks(&self) -> usize {
        self.locks.held_count()
    }

    /// Copy of a row, read without locking
    pub fn snapshot_row(&self, key: &CompositeKey) -> Result<Option<EventRecord>> {
        Ok(self.table()?.get(key))
    }

    fn table(&self) -> Result<Arc<EventTable>> {
        self.table
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| Error::NoSuchTable(EVENTS_TABLE.to_string()))
    }

    fn statement_kind(&self, statement: &MemoryStatement) -> Result<StatementKind> {
        match self.statements.get(&statement.id) {
            Some(kind) => Ok(*kind),
            None => Err(Error::StatementClosed(statement.id)),
        }
    }

    fn new_txn(&self) -> TxnState {
        TxnState::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_key(
        &self,
        state: &mut TxnState,
        key: &CompositeKey,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.locks.acquire(state.id, key, cancel)? {
            state.locked.push(key.clone());
        }
        Ok(())
    }

    fn run(
        &self,
        state: &mut TxnState,
        statement: &MemoryStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        cancel.check()?;
        let kind = self.statement_kind(statement)?;
        let params = Params::expect(params, kind.arity())?;
        let table = self.table()?;

        match kind {
            StatementKind::Lookup => {
                let key = key_at(&params, 0)?;
                self.lock_key(state, &key, cancel)?;
                Ok(Outcome::Row(table.get(&key).map(|record| {
                    Row::new(vec![SqlValue::Blob(record.serialized)])
                })))
            }
            StatementKind::Insert => {
                let key = key_at(&params, 0)?;
                let payload = params.blob(3)?;
                self.lock_key(state, &key, cancel)?;
                table.insert(key.clone(), EventRecord::new(payload))?;
                state.undo.push((key, None));
                Ok(Outcome::Affected(1))
            }
            StatementKind::Update => {
                let payload = params.blob(0)?;
                let key = key_at(&params, 1)?;
                self.lock_key(state, &key, cancel)?;
                match table.update_serialized(&key, payload) {
                    Some(prior) => {
                        state.undo.push((key, Some(prior)));
                        Ok(Outcome::Affected(1))
                    }
                    None => Ok(Outcome::Affected(0)),
                }
            }
            StatementKind::Upsert => {
                let key = key_at(&params, 0)?;
                let obs = Observation::new(params.int(3)?, params.int(4)?);
                let payload = params.blob(5)?;
                self.lock_key(state, &key, cancel)?;
                let (prior, current) = table.upsert(key.clone(), payload, obs);
                state.undo.push((key, prior));
                Ok(Outcome::Row(Some(upsert_row(&current))))
            }
        }
    }

    fn finish(&self, state: &mut TxnState, commit: bool) {
        if !commit && !state.undo.is_empty() {
            if let Ok(table) = self.table() {
                for (key, prior) in state.undo.drain(..).rev() {
                    table.restore(key, prior);
                }
            }
            debug!(target: "eventbench::memory", txn_id = state.id, "rolled back");
        }
        state.undo.clear();
        self.locks.release_all(state.id, state.locked.iter());
        state.locked.clear();
    }

    fn autocommit(
        &self,
        statement: &MemoryStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let _session = self.sessions.acquire(cancel)?;
        let mut state = self.new_txn();
        let result = self.run(&mut state, statement, params, cancel);
        self.finish(&mut state, result.is_ok());
        result
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

fn key_at(params: &Params<'_>, first: usize) -> Result<CompositeKey> {
    Ok(CompositeKey {
        namespace: params.text(first)?,
        entity: params.text(first + 1)?,
        check: params.text(first + 2)?,
    })
}

fn upsert_row(record: &EventRecord) -> Row {
    let (timestamps, statuses, last_ok, occurrences, occurrences_wm) = match &record.check {
        Some(check) => (
            check.history.timestamps().to_vec(),
            check.history.statuses().to_vec(),
            check.last_ok,
            check.occurrences,
            check.occurrences_wm,
        ),
        None => (Vec::new(), Vec::new(), 0, 0, 0),
    };
    Row::new(vec![
        SqlValue::IntArray(timestamps),
        SqlValue::IntArray(statuses),
        SqlValue::Int(last_ok),
        SqlValue::Int(occurrences),
        SqlValue::Int(occurrences_wm),
        SqlValue::from(record.previous_serialized.clone()),
    ])
}

impl Backend for MemoryBackend {
    type Statement = MemoryStatement;
    type Tx<'a> = MemoryTransaction<'a>;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_upsert: true,
            transactions: true,
        }
    }

    fn ensure_schema(&self) -> Result<()> {
        let mut table = self.table.write();
        if table.is_none() {
            *table = Some(Arc::new(EventTable::new()));
            info!(target: "eventbench::memory", table = EVENTS_TABLE, "created table");
        }
        Ok(())
    }

    fn clear_all_rows(&self) -> Result<u64> {
        Ok(self.table()?.clear())
    }

    fn count_rows(&self) -> Result<u64> {
        Ok(self.table()?.len() as u64)
    }

    fn prepare(&self, kind: StatementKind, cancel: &CancellationToken) -> Result<MemoryStatement> {
        cancel.check()?;
        self.table()?;
        let id = self.next_statement_id.fetch_add(1, Ordering::Relaxed);
        self.statements.insert(id, kind);
        debug!(target: "eventbench::memory", statement_id = id, %kind, "prepared statement");
        Ok(MemoryStatement { id, kind })
    }

    fn close(&self, statement: &MemoryStatement) -> Result<()> {
        match self.statements.remove(&statement.id) {
            Some(_) => Ok(()),
            None => Err(Error::StatementClosed(statement.id)),
        }
    }

    fn execute(
        &self,
        statement: &MemoryStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        match self.autocommit(statement, params, cancel)? {
            Outcome::Affected(n) => Ok(n),
            Outcome::Row(row) => Ok(u64::from(row.is_some())),
        }
    }

    fn query_row(
        &self,
        statement: &MemoryStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>> {
        match self.autocommit(statement, params, cancel)? {
            Outcome::Affected(_) => Ok(None),
            Outcome::Row(row) => Ok(row),
        }
    }

    fn begin(&self, cancel: &CancellationToken) -> Result<MemoryTransaction<'_>> {
        let session = self.sessions.acquire(cancel)?;
        let state = self.new_txn();
        debug!(
            target: "eventbench::memory",
            txn_id = state.id,
            session = session.id(),
            "begin"
        );
        Ok(MemoryTransaction {
            backend: self,
            _session: session,
            state,
            active: true,
        })
    }
}

/// Explicit transaction on the memory backend
///
/// Holds a pooled session until finished. Dropping an active transaction
/// rolls it back.
pub struct MemoryTransaction<'a> {
    backend: &'a MemoryBackend,
    _session: PoolGuard<'a, MemorySession>,
    state: TxnState,
    active: bool,
}

impl MemoryTransaction<'_> {
    /// Transaction id, unique within the backend
    pub fn id(&self) -> u64 {
        self.state.id
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(Error::TransactionNotActive)
        }
    }

    fn end(&mut self, commit: bool) {
        if self.active {
            self.backend.finish(&mut self.state, commit);
            self.active = false;
        }
    }
}

impl Transaction for MemoryTransaction<'_> {
    type Statement = MemoryStatement;

    fn execute(
        &mut self,
        statement: &MemoryStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.ensure_active()?;
        match self.backend.run(&mut self.state, statement, params, cancel)? {
            Outcome::Affected(n) => Ok(n),
            Outcome::Row(row) => Ok(u64::from(row.is_some())),
        }
    }

    fn query_row(
        &mut self,
        statement: &MemoryStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>> {
        self.ensure_active()?;
        match self.backend.run(&mut self.state, statement, params, cancel)? {
            Outcome::Affected(_) => Ok(None),
            Outcome::Row(row) => Ok(row),
        }
    }

    fn commit(mut self) -> Result<()> {
        self.ensure_active()?;
        self.end(true);
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.ensure_active()?;
        self.end(false);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        self.end(false);
    }
}
