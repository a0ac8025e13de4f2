//! Backend target strings
//!
//! | Target | Backend |
//! |--------|---------|
//! | `memory` | in-process tables |
//! | `sqlite:<path>` | SQLite file (feature `sqlite`) |
//! | `postgres://…`, `postgresql://…`, `host=… …` | PostgreSQL (feature `postgres`) |
//! | `mysql://…` | MySQL / InnoDB (feature `mysql`) |

use crate::config::BenchConfig;
use crate::runner::{BenchmarkRunner, RunSummary};
use eventbench_concurrency::ReportSink;
use eventbench_core::{CancellationToken, Error, Result};
use eventbench_storage::{MemoryBackend, MemoryConfig};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// A parsed backend target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// In-memory backend
    Memory,
    /// SQLite database file
    Sqlite(PathBuf),
    /// PostgreSQL connection string
    Postgres(String),
    /// MySQL connection URL
    Mysql(String),
}

impl BackendTarget {
    /// Parse a target string
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        if target == "memory" {
            return Ok(BackendTarget::Memory);
        }
        if let Some(path) = target.strip_prefix("sqlite:") {
            if path.is_empty() {
                return Err(Error::config("sqlite target needs a path: sqlite:<path>"));
            }
            return Ok(BackendTarget::Sqlite(PathBuf::from(path)));
        }
        if target.starts_with("postgres://")
            || target.starts_with("postgresql://")
            || target.split_whitespace().any(|kv| kv.starts_with("host="))
        {
            return Ok(BackendTarget::Postgres(target.to_string()));
        }
        if target.starts_with("mysql://") {
            return Ok(BackendTarget::Mysql(target.to_string()));
        }
        Err(Error::config(format!(
            "unrecognized backend target '{}', expected memory, sqlite:<path>, \
             a postgres connection string or a mysql:// URL",
            target
        )))
    }

    /// Short backend name
    pub fn kind(&self) -> &'static str {
        match self {
            BackendTarget::Memory => "memory",
            BackendTarget::Sqlite(_) => "sqlite",
            BackendTarget::Postgres(_) => "postgres",
            BackendTarget::Mysql(_) => "mysql",
        }
    }
}

impl FromStr for BackendTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendTarget::Memory => f.write_str("memory"),
            BackendTarget::Sqlite(path) => write!(f, "sqlite:{}", path.display()),
            // Connection strings may carry a password
            BackendTarget::Postgres(_) => f.write_str("postgres"),
            BackendTarget::Mysql(_) => f.write_str("mysql"),
        }
    }
}

/// Open the configured backend and run the benchmark against it
pub fn run_target(
    config: &BenchConfig,
    cancel: &CancellationToken,
    sink: ReportSink,
) -> Result<RunSummary> {
    config.validate()?;
    let target = BackendTarget::parse(&config.backend_target)?;
    info!(target: "eventbench::run", backend = %target, "opening backend");
    let runner = BenchmarkRunner::new(config.clone(), cancel.clone());

    match target {
        BackendTarget::Memory => {
            let backend = MemoryBackend::new(MemoryConfig {
                connections: config.connections,
                lock_wait_timeout: config.lock_wait_timeout(),
            });
            runner.run(&backend, sink)
        }
        #[cfg(feature = "sqlite")]
        BackendTarget::Sqlite(path) => {
            let backend = eventbench_storage::SqliteBackend::open(eventbench_storage::SqliteConfig {
                path,
                connections: config.connections,
                busy_timeout: config.lock_wait_timeout(),
            })?;
            runner.run(&backend, sink)
        }
        #[cfg(not(feature = "sqlite"))]
        BackendTarget::Sqlite(_) => Err(Error::config(
            "sqlite targets require building with the `sqlite` feature",
        )),
        #[cfg(feature = "postgres")]
        BackendTarget::Postgres(dsn) => {
            let backend =
                eventbench_storage::PostgresBackend::connect(eventbench_storage::PostgresConfig {
                    dsn,
                    connections: config.connections,
                })?;
            runner.run(&backend, sink)
        }
        #[cfg(not(feature = "postgres"))]
        BackendTarget::Postgres(_) => Err(Error::config(
            "postgres targets require building with the `postgres` feature",
        )),
        #[cfg(feature = "mysql")]
        BackendTarget::Mysql(dsn) => {
            let backend =
                eventbench_storage::MysqlBackend::connect(eventbench_storage::MysqlConfig {
                    dsn,
                    connections: config.connections,
                    lock_wait_timeout: config.lock_wait_timeout(),
                })?;
            runner.run(&backend, sink)
        }
        #[cfg(not(feature = "mysql"))]
        BackendTarget::Mysql(_) => Err(Error::config(
            "mysql targets require building with the `mysql` feature",
        )),
    }
}
