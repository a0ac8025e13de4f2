//! PostgreSQL backend (feature `postgres`)
//!
//! Drives `tokio-postgres` from the synchronous worker threads: the backend
//! owns a multi-threaded runtime that runs the connection tasks, and each
//! call blocks on its future. Every blocking wait races the cancellation
//! token, so a stop request interrupts statements that are queued or in
//! flight.
//!
//! Statements are prepared once per pooled client. Parameters are converted
//! to the column types the server inferred for the prepared statement.
//!
//! Inside a transaction a lookup first takes a transaction-scoped advisory
//! lock on its composite key. The row lock from `FOR UPDATE` only covers
//! rows that exist; the advisory lock also serializes the first writers of
//! a key, so exactly one of them inserts and the rest update.
//!
//! Server errors keep their SQLSTATE: a unique violation on a statement
//! bound to a key becomes `Error::DuplicateKey`, anything else reads
//! `<code>: <message>`.

use crate::sql::{self, postgres_statement};
use dashmap::DashMap;
use eventbench_concurrency::{Pool, PoolGuard};
use eventbench_core::{
    Backend, CancellationToken, Capabilities, CompositeKey, Error, Payload, Result, Row,
    SqlValue, StatementKind, Transaction,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{debug, info, warn};

/// How often an in-flight call re-checks the cancellation token
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// PostgreSQL backend settings
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection string (URL or key/value form)
    pub dsn: String,
    /// Pool size
    pub connections: usize,
}

/// One pooled client and its prepared statements
pub struct PgSession {
    client: Client,
    key_lock: Statement,
    prepared: HashMap<u64, Statement>,
}

/// Prepared statement handle
#[derive(Debug, Clone)]
pub struct PostgresStatement {
    id: u64,
    kind: StatementKind,
}

impl PostgresStatement {
    /// Statement kind
    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

/// PostgreSQL backend over a pool of clients
pub struct PostgresBackend {
    runtime: Runtime,
    pool: Pool<PgSession>,
    statements: DashMap<u64, StatementKind>,
    next_statement_id: AtomicU64,
}

async fn cancelled(token: &CancellationToken) {
    while !token.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

/// Map a driver error, keeping the server's SQLSTATE
///
/// `key` is the composite key the failing statement was bound to, if any.
fn pg_error(err: tokio_postgres::Error, key: Option<CompositeKey>) -> Error {
    match err.as_db_error() {
        Some(db) => db_error(db.code(), db.message(), key),
        None => Error::backend(err),
    }
}

fn db_error(code: &SqlState, message: &str, key: Option<CompositeKey>) -> Error {
    match key {
        Some(key) if *code == SqlState::UNIQUE_VIOLATION => Error::DuplicateKey(key),
        _ => Error::Backend(format!("{}: {}", code.code(), message)),
    }
}

/// Composite key a statement is bound to
fn bound_key(kind: StatementKind, params: &[SqlValue]) -> Option<CompositeKey> {
    let first = match kind {
        StatementKind::Update => 1,
        StatementKind::Lookup | StatementKind::Insert | StatementKind::Upsert => 0,
    };
    match params.get(first..first + 3)? {
        [SqlValue::Text(namespace), SqlValue::Text(entity), SqlValue::Text(check)] => Some(
            CompositeKey::new(Arc::clone(namespace), Arc::clone(entity), Arc::clone(check)),
        ),
        _ => None,
    }
}

impl PostgresBackend {
    /// Connect `config.connections` clients
    pub fn connect(config: PostgresConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("eventbench-pg")
            .enable_all()
            .build()?;

        let mut sessions = Vec::with_capacity(config.connections.max(1));
        for _ in 0..config.connections.max(1) {
            let (client, connection) = runtime
                .block_on(tokio_postgres::connect(&config.dsn, NoTls))
                .map_err(|e| Error::Connection(e.to_string()))?;
            runtime.spawn(async move {
                if let Err(e) = connection.await {
                    warn!(target: "eventbench::postgres", error = %e, "connection closed");
                }
            });
            let key_lock = runtime
                .block_on(client.prepare(sql::postgres::KEY_LOCK))
                .map_err(|e| pg_error(e, None))?;
            sessions.push(PgSession {
                client,
                key_lock,
                prepared: HashMap::new(),
            });
        }
        info!(
            target: "eventbench::postgres",
            connections = sessions.len(),
            "connected"
        );

        Ok(Self {
            runtime,
            pool: Pool::new(sessions),
            statements: DashMap::new(),
            next_statement_id: AtomicU64::new(1),
        })
    }

    /// Number of statements prepared and not yet closed
    pub fn open_statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Run `fut` to completion unless the token fires first
    fn block_on<T, F>(&self, cancel: &CancellationToken, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        self.block_on_keyed(cancel, None, fut)
    }

    /// Like `block_on`, reporting a unique violation against `key`
    fn block_on_keyed<T, F>(
        &self,
        cancel: &CancellationToken,
        key: Option<CompositeKey>,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        self.runtime.block_on(async move {
            tokio::select! {
                res = fut => res.map_err(|e| pg_error(e, key)),
                _ = cancelled(cancel) => Err(Error::Cancelled),
            }
        })
    }

    fn batch(&self, sql: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        let session = self.pool.acquire(&cancel)?;
        self.block_on(&cancel, session.client.batch_execute(sql))
    }

    fn statement_for<'s>(
        &self,
        session: &'s PgSession,
        statement: &PostgresStatement,
    ) -> Result<&'s Statement> {
        session
            .prepared
            .get(&statement.id)
            .ok_or(Error::StatementClosed(statement.id))
    }

    fn execute_on(
        &self,
        session: &PgSession,
        statement: &PostgresStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let stmt = self.statement_for(session, statement)?;
        let bound = bind(stmt, params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
        self.block_on_keyed(
            cancel,
            bound_key(statement.kind, params),
            session.client.execute(stmt, &refs),
        )
    }

    /// Take the advisory lock on the key a lookup is bound to
    ///
    /// Held until the session's transaction ends.
    fn lock_key(
        &self,
        session: &PgSession,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let bound = bind(&session.key_lock, params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
        self.block_on(cancel, session.client.execute(&session.key_lock, &refs))?;
        Ok(())
    }

    fn query_row_on(
        &self,
        session: &PgSession,
        statement: &PostgresStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>> {
        let stmt = self.statement_for(session, statement)?;
        let bound = bind(stmt, params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
        let key = bound_key(statement.kind, params);
        match self.block_on_keyed(cancel, key, session.client.query_opt(stmt, &refs))? {
            Some(row) => Ok(Some(decode_row(&row)?)),
            None => Ok(None),
        }
    }
}

fn bind(stmt: &Statement, params: &[SqlValue]) -> Result<Vec<Box<dyn ToSql + Sync>>> {
    let types = stmt.params();
    if types.len() != params.len() {
        return Err(Error::InvalidParameter(format!(
            "expected {} parameters, got {}",
            types.len(),
            params.len()
        )));
    }
    params
        .iter()
        .zip(types)
        .enumerate()
        .map(|(i, (value, ty))| bind_one(i, value, ty))
        .collect()
}

fn bind_one(idx: usize, value: &SqlValue, ty: &Type) -> Result<Box<dyn ToSql + Sync>> {
    let out_of_range = || Error::InvalidParameter(format!("parameter ${} out of range", idx + 1));
    let bound: Box<dyn ToSql + Sync> = match value {
        SqlValue::Null => Box::new(None::<i64>),
        SqlValue::Int(n) if *ty == Type::INT2 => {
            Box::new(i16::try_from(*n).map_err(|_| out_of_range())?)
        }
        SqlValue::Int(n) if *ty == Type::INT4 => {
            Box::new(i32::try_from(*n).map_err(|_| out_of_range())?)
        }
        SqlValue::Int(n) => Box::new(*n),
        SqlValue::Text(s) => Box::new(s.to_string()),
        SqlValue::Blob(p) => Box::new(p.as_bytes().to_vec()),
        SqlValue::IntArray(v) if *ty == Type::INT4_ARRAY => Box::new(
            v.iter()
                .map(|n| i32::try_from(*n).map_err(|_| out_of_range()))
                .collect::<Result<Vec<i32>>>()?,
        ),
        SqlValue::IntArray(v) => Box::new(v.clone()),
    };
    Ok(bound)
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::INT2 {
            opt(row.try_get::<_, Option<i16>>(idx), |n| SqlValue::Int(n.into()))?
        } else if *ty == Type::INT4 {
            opt(row.try_get::<_, Option<i32>>(idx), |n| SqlValue::Int(n.into()))?
        } else if *ty == Type::INT8 {
            opt(row.try_get::<_, Option<i64>>(idx), SqlValue::Int)?
        } else if *ty == Type::BYTEA {
            opt(row.try_get::<_, Option<Vec<u8>>>(idx), |b| {
                SqlValue::Blob(Payload::from(b))
            })?
        } else if *ty == Type::INT4_ARRAY {
            opt(row.try_get::<_, Option<Vec<Option<i32>>>>(idx), |v| {
                SqlValue::IntArray(v.into_iter().map(|n| n.unwrap_or(0).into()).collect())
            })?
        } else if *ty == Type::INT8_ARRAY {
            opt(row.try_get::<_, Option<Vec<Option<i64>>>>(idx), |v| {
                SqlValue::IntArray(v.into_iter().map(|n| n.unwrap_or(0)).collect())
            })?
        } else {
            opt(row.try_get::<_, Option<String>>(idx), |s| {
                SqlValue::Text(Arc::from(s))
            })?
        };
        values.push(value);
    }
    Ok(Row::new(values))
}

fn opt<T>(
    value: std::result::Result<Option<T>, tokio_postgres::Error>,
    f: impl FnOnce(T) -> SqlValue,
) -> Result<SqlValue> {
    Ok(value
        .map_err(|e| Error::UnexpectedRow(e.to_string()))?
        .map_or(SqlValue::Null, f))
}

impl Backend for PostgresBackend {
    type Statement = PostgresStatement;
    type Tx<'a> = PostgresTransaction<'a>;

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_upsert: true,
            transactions: true,
        }
    }

    fn ensure_schema(&self) -> Result<()> {
        self.batch(sql::postgres::CREATE_TABLE)
    }

    fn clear_all_rows(&self) -> Result<u64> {
        let cancel = CancellationToken::new();
        let session = self.pool.acquire(&cancel)?;
        self.block_on(
            &cancel,
            session.client.execute(sql::postgres::DELETE_ALL, &[]),
        )
    }

    fn count_rows(&self) -> Result<u64> {
        let cancel = CancellationToken::new();
        let session = self.pool.acquire(&cancel)?;
        let row = self.block_on(&cancel, session.client.query_one(sql::postgres::COUNT, &[]))?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| Error::UnexpectedRow(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    fn prepare(
        &self,
        kind: StatementKind,
        cancel: &CancellationToken,
    ) -> Result<PostgresStatement> {
        cancel.check()?;
        let sql = postgres_statement(kind);
        let id = self.next_statement_id.fetch_add(1, Ordering::Relaxed);

        // Every client is idle during preparation
        let mut failure = None;
        self.pool.for_each_idle(|session| {
            if failure.is_some() {
                return;
            }
            match self.block_on(cancel, session.client.prepare(sql)) {
                Ok(stmt) => {
                    session.prepared.insert(id, stmt);
                }
                Err(e) => failure = Some(e),
            }
        });
        if let Some(e) = failure {
            self.pool.for_each_idle(|session| {
                session.prepared.remove(&id);
            });
            return Err(e);
        }

        self.statements.insert(id, kind);
        debug!(target: "eventbench::postgres", statement_id = id, %kind, "prepared statement");
        Ok(PostgresStatement { id, kind })
    }

    fn close(&self, statement: &PostgresStatement) -> Result<()> {
        if self.statements.remove(&statement.id).is_none() {
            return Err(Error::StatementClosed(statement.id));
        }
        self.pool.for_each_idle(|session| {
            session.prepared.remove(&statement.id);
        });
        Ok(())
    }

    fn execute(
        &self,
        statement: &PostgresStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let session = self.pool.acquire(cancel)?;
        self.execute_on(&session, statement, params, cancel)
    }

    fn query_row(
        &self,
        statement: &PostgresStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>> {
        let session = self.pool.acquire(cancel)?;
        self.query_row_on(&session, statement, params, cancel)
    }

    fn begin(&self, cancel: &CancellationToken) -> Result<PostgresTransaction<'_>> {
        let session = self.pool.acquire(cancel)?;
        self.block_on(cancel, session.client.batch_execute("BEGIN"))?;
        Ok(PostgresTransaction {
            backend: self,
            session,
            active: true,
        })
    }
}

/// Explicit transaction on one pooled client
///
/// Dropping an active transaction rolls it back.
pub struct PostgresTransaction<'a> {
    backend: &'a PostgresBackend,
    session: PoolGuard<'a, PgSession>,
    active: bool,
}

impl PostgresTransaction<'_> {
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
        // Not cancellable: the client must leave the transaction before reuse
        self.backend
            .block_on(&CancellationToken::new(), self.session.client.batch_execute(sql))
    }
}

impl Transaction for PostgresTransaction<'_> {
    type Statement = PostgresStatement;

    fn execute(
        &mut self,
        statement: &PostgresStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.ensure_active()?;
        self.backend
            .execute_on(&self.session, statement, params, cancel)
    }

    fn query_row(
        &mut self,
        statement: &PostgresStatement,
        params: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Option<Row>> {
        self.ensure_active()?;
        if statement.kind == StatementKind::Lookup {
            self.backend.lock_key(&self.session, params, cancel)?;
        }
        self.backend
            .query_row_on(&self.session, statement, params, cancel)
    }

    fn commit(mut self) -> Result<()> {
        self.end("COMMIT")
    }

    fn rollback(mut self) -> Result<()> {
        self.end("ROLLBACK")
    }
}

impl Drop for PostgresTransaction<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.end("ROLLBACK") {
                warn!(target: "eventbench::postgres", error = %e, "rollback on drop failed");
            }
        }
    }
}
