//! Storage backends for eventbench
//!
//! This crate implements the [`Backend`](eventbench_core::Backend) trait for:
//! - MemoryBackend: in-process tables with row locks and undo logs (always available)
//! - SqliteBackend: pooled rusqlite connections (feature `sqlite`)
//! - PostgresBackend: pooled tokio-postgres clients (feature `postgres`)
//! - MysqlBackend: pooled mysql connections to InnoDB (feature `mysql`)
//!
//! # Schema
//!
//! One `events` table keyed by `(event_namespace, event_entity, event_check)`
//! under a uniqueness constraint. See [`sql`] for the dialect text.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sql;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod table;

pub use memory::{MemoryBackend, MemoryConfig, MemorySession, MemoryStatement, MemoryTransaction};
#[cfg(feature = "mysql")]
pub use mysql::{MysqlBackend, MysqlConfig, MysqlStatement, MysqlTransaction};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresBackend, PostgresConfig, PostgresStatement, PostgresTransaction};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteConfig, SqliteStatement, SqliteTransaction};
pub use table::EventTable;
