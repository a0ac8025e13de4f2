//! Backend capability traits
//!
//! The benchmark core only needs four capabilities from a relational
//! backend: execute a prepared statement with parameters, read one row,
//! bound a unit of work in a transaction, and observe cancellation. Every
//! backend (in-memory, SQLite, PostgreSQL) implements these traits so the
//! worker pool and strategies never see a driver type.
//!
//! Thread safety: a backend is shared by all workers behind an `Arc`, so
//! implementations must be `Send + Sync` and bound their own concurrency
//! (connection pool).

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::value::{Row, SqlValue};
use std::fmt;

/// Name of the benchmark table
pub const EVENTS_TABLE: &str = "events";

/// The fixed set of statements the benchmark prepares
///
/// Positional parameters:
///
/// | Kind | Parameters | Row |
/// |------|------------|-----|
/// | `Lookup` | namespace, entity, check | serialized |
/// | `Insert` | namespace, entity, check, serialized | none |
/// | `Update` | serialized, namespace, entity, check | none |
/// | `Upsert` | namespace, entity, check, status, timestamp, serialized | history_ts, history_status, last_ok, occurrences, occurrences_wm, previous_serialized |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Point lookup by composite key
    Lookup,
    /// Insert a new row
    Insert,
    /// Update the payload of an existing row
    Update,
    /// Atomic insert-or-merge with history
    Upsert,
}

impl StatementKind {
    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Lookup => "lookup",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Upsert => "upsert",
        }
    }

    /// Number of positional parameters
    pub fn arity(&self) -> usize {
        match self {
            StatementKind::Lookup => 3,
            StatementKind::Insert | StatementKind::Update => 4,
            StatementKind::Upsert => 6,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a backend can do natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Single-statement upsert with conflict resolution and array columns
    pub native_upsert: bool,
    /// Explicit transactions with row locking
    pub transactions: bool,
}

/// A relational backend the benchmark can drive
pub trait Backend: Send + Sync + 'static {
    /// Prepared statement handle, shared read-only by all workers
    type Statement: Send + Sync;

    /// An open transaction holding one pooled connection
    type Tx<'a>: Transaction<Statement = Self::Statement>
    where
        Self: 'a;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Native capabilities
    fn capabilities(&self) -> Capabilities;

    /// Create the events table and its uniqueness constraint if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created. Callers treat this
    /// as fatal.
    fn ensure_schema(&self) -> Result<()>;

    /// Delete every row, returning how many were removed
    fn clear_all_rows(&self) -> Result<u64>;

    /// Number of rows currently in the events table
    fn count_rows(&self) -> Result<u64>;

    /// Prepare one statement
    ///
    /// # Errors
    ///
    /// Returns `Error::Unsupported` if the backend has no form of `kind`,
    /// `Error::Cancelled` if the token fired while preparing.
    fn prepare(&self, kind: StatementKind, cancel: &CancellationToken) -> Result<Self::Statement>;

    /// Release a prepared statement
    fn close(&self, statement: &Self::Statement) -> Result<()>;

    /// Execute a statement outside any explicit transaction
    ///
    /// Returns the number of rows affected.
    fn execute(
        &self,
        statement: &Self::Statement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// Execute a statement outside any explicit transaction and read at most one row
    fn query_row(
        &self,
        statement: &Self::Statement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>>;

    /// Begin a transaction
    ///
    /// The transaction owns a pooled connection until it is committed,
    /// rolled back or dropped (drop rolls back).
    fn begin(&self, cancel: &CancellationToken) -> Result<Self::Tx<'_>>;
}

/// A unit of work bounded by begin/commit
pub trait Transaction {
    /// Statement handle type of the owning backend
    type Statement;

    /// Execute a statement inside the transaction
    fn execute(
        &mut self,
        statement: &Self::Statement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// Execute a statement inside the transaction and read at most one row
    fn query_row(
        &mut self,
        statement: &Self::Statement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>>;

    /// Make the transaction's writes durable and visible, releasing its locks
    fn commit(self) -> Result<()>;

    /// Discard the transaction's writes, releasing its locks
    fn rollback(self) -> Result<()>;
}
