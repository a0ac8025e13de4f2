//! SQLite backend (feature `sqlite`)
//!
//! Each pooled connection opens the same database file in WAL mode with a
//! busy timeout. Transactions begin with `BEGIN IMMEDIATE`, which takes the
//! database write lock up front: concurrent read-modify-write units on the
//! same key serialize instead of racing to insert.
//!
//! SQLite has no array columns, so this backend offers no atomic upsert.
//! Statements are compiled per connection through rusqlite's statement cache.

use crate::sql::{self, sqlite_statement};
use dashmap::DashMap;
use eventbench_concurrency::{Pool, PoolGuard};
use eventbench_core::{
    Backend, CancellationToken, Capabilities, Error, Payload, Result, Row, SqlValue,
    StatementKind, Transaction,
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// SQLite backend settings
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file
    pub path: PathBuf,
    /// Pool size
    pub connections: usize,
    /// How long a connection waits on a locked database
    pub busy_timeout: Duration,
}

/// Prepared statement handle
#[derive(Debug, Clone)]
pub struct SqliteStatement {
    id: u64,
    kind: StatementKind,
    sql: &'static str,
}

impl SqliteStatement {
    /// Statement kind
    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

/// SQLite backend over a pool of connections to one file
pub struct SqliteBackend {
    path: PathBuf,
    pool: Pool<Connection>,
    statements: DashMap<u64, StatementKind>,
    next_statement_id: AtomicU64,
}

impl SqliteBackend {
    /// Open `config.connections` connections to the database file
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let mut connections = Vec::with_capacity(config.connections.max(1));
        for _ in 0..config.connections.max(1) {
            let conn = Connection::open(&config.path).map_err(Error::backend)?;
            conn.busy_timeout(config.busy_timeout)
                .map_err(Error::backend)?;
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
                .map_err(Error::backend)?;
            connections.push(conn);
        }
        info!(
            target: "eventbench::sqlite",
            path = %config.path.display(),
            connections = connections.len(),
            "opened database"
        );
        Ok(Self {
            path: config.path,
            pool: Pool::new(connections),
            statements: DashMap::new(),
            next_statement_id: AtomicU64::new(1),
        })
    }

    /// Database file
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Number of statements prepared and not yet closed
    pub fn open_statement_count(&self) -> usize {
        self.statements.len()
    }

    fn check_open(&self, statement: &SqliteStatement) -> Result<()> {
        if self.statements.contains_key(&statement.id) {
            Ok(())
        } else {
            Err(Error::StatementClosed(statement.id))
        }
    }

    fn scalar(&self, sql: &str) -> Result<i64> {
        let conn = self.pool.acquire(&CancellationToken::new())?;
        conn.query_row(sql, [], |row| row.get(0))
            .map_err(Error::backend)
    }
}

fn bind(params: &[SqlValue]) -> Result<Vec<Value>> {
    params
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Int(n) => Ok(Value::Integer(*n)),
            SqlValue::Text(s) => Ok(Value::Text(s.to_string())),
            SqlValue::Blob(p) => Ok(Value::Blob(p.as_bytes().to_vec())),
            SqlValue::IntArray(_) => Err(Error::InvalidParameter(format!(
                "parameter ${} is an array; sqlite has no array columns",
                i + 1
            ))),
        })
        .collect()
}

fn column_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(n) => SqlValue::Int(n),
        ValueRef::Real(f) => SqlValue::Int(f as i64),
        ValueRef::Text(t) => SqlValue::Text(Arc::from(String::from_utf8_lossy(t).as_ref())),
        ValueRef::Blob(b) => SqlValue::Blob(Payload::from(b)),
    }
}

fn execute_on(conn: &Connection, statement: &SqliteStatement, params: &[SqlValue]) -> Result<u64> {
    let values = bind(params)?;
    let mut stmt = conn.prepare_cached(statement.sql).map_err(Error::backend)?;
    let affected = stmt
        .execute(params_from_iter(values.iter()))
        .map_err(Error::backend)?;
    Ok(affected as u64)
}

fn query_row_on(
    conn: &Connection,
    statement: &SqliteStatement,
    params: &[SqlValue],
) -> Result<Option<Row>> {
    let values = bind(params)?;
    let mut stmt = conn.prepare_cached(statement.sql).map_err(Error::backend)?;
    let columns = stmt.column_count();
    let mut rows = stmt
        .query(params_from_iter(values.iter()))
        .map_err(Error::backend)?;
    match rows.next().map_err(Error::backend)? {
        Some(row) => {
            let values = (0..columns)
                .map(|i| row.get_ref(i).map(column_value))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(Error::backend)?;
            Ok(Some(Row::new(values)))
        }
        None => Ok(None),
    }
}

impl Backend for SqliteBackend {
    type Statement = SqliteStatement;
    type Tx<'a> = SqliteTransaction<'a>;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_upsert: false,
            transactions: true,
        }
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.pool.acquire(&CancellationToken::new())?;
        conn.execute_batch(sql::sqlite::CREATE_TABLE)
            .map_err(Error::backend)
    }

    fn clear_all_rows(&self) -> Result<u64> {
        let conn = self.pool.acquire(&CancellationToken::new())?;
        let removed = conn
            .execute(sql::sqlite::DELETE_ALL, [])
            .map_err(Error::backend)?;
        Ok(removed as u64)
    }

    fn count_rows(&self) -> Result<u64> {
        Ok(self.scalar(sql::sqlite::COUNT)?.max(0) as u64)
    }

    fn prepare(&self, kind: StatementKind, cancel: &CancellationToken) -> Result<SqliteStatement> {
        cancel.check()?;
        let sql = sqlite_statement(kind).ok_or(Error::Unsupported {
            backend: "sqlite",
            statement: kind.as_str(),
        })?;

        // Compile once to surface syntax or schema errors before the run
        {
            let conn = self.pool.acquire(cancel)?;
            conn.prepare_cached(sql).map_err(Error::backend)?;
        }

        let id = self.next_statement_id.fetch_add(1, Ordering::Relaxed);
        self.statements.insert(id, kind);
        debug!(target: "eventbench::sqlite", statement_id = id, %kind, "prepared statement");
        Ok(SqliteStatement { id, kind, sql })
    }

    fn close(&self, statement: &SqliteStatement) -> Result<()> {
        if self.statements.remove(&statement.id).is_none() {
            return Err(Error::StatementClosed(statement.id));
        }
        if self.statements.is_empty() {
            self.pool
                .for_each_idle(|conn| conn.flush_prepared_statement_cache());
        }
        Ok(())
    }

    fn execute(
        &self,
        statement: &SqliteStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.check_open(statement)?;
        let conn = self.pool.acquire(cancel)?;
        cancel.check()?;
        execute_on(&conn, statement, params)
    }

    fn query_row(
        &self,
        statement: &SqliteStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>> {
        self.check_open(statement)?;
        let conn = self.pool.acquire(cancel)?;
        cancel.check()?;
        query_row_on(&conn, statement, params)
    }

    fn begin(&self, cancel: &CancellationToken) -> Result<SqliteTransaction<'_>> {
        let conn = self.pool.acquire(cancel)?;
        cancel.check()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(Error::backend)?;
        Ok(SqliteTransaction {
            backend: self,
            conn,
            active: true,
        })
    }
}

/// Explicit transaction on one pooled connection
///
/// Dropping an active transaction rolls it back.
pub struct SqliteTransaction<'a> {
    backend: &'a SqliteBackend,
    conn: PoolGuard<'a, Connection>,
    active: bool,
}

impl SqliteTransaction<'_> {
    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(Error::TransactionNotActive)
        }
    }

    fn end(&mut self, sql: &str) -> Result<()> {
        self.ensure_active()?;
        self.active = false;
        self.conn.execute_batch(sql).map_err(Error::backend)
    }
}

impl Transaction for SqliteTransaction<'_> {
    type Statement = SqliteStatement;

    fn execute(
        &mut self,
        statement: &SqliteStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.ensure_active()?;
        self.backend.check_open(statement)?;
        cancel.check()?;
        execute_on(&self.conn, statement, params)
    }

    fn query_row(
        &mut self,
        statement: &SqliteStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>> {
        self.ensure_active()?;
        self.backend.check_open(statement)?;
        cancel.check()?;
        query_row_on(&self.conn, statement, params)
    }

    fn commit(mut self) -> Result<()> {
        let result = self.end("COMMIT");
        if result.is_err() {
            // A failed COMMIT leaves the transaction open
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(
                    target: "eventbench::sqlite",
                    error = %e,
                    "rollback after failed commit failed"
                );
            }
        }
        result
    }

    fn rollback(mut self) -> Result<()> {
        self.end("ROLLBACK")
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(target: "eventbench::sqlite", error = %e, "rollback on drop failed");
            }
        }
    }
}
