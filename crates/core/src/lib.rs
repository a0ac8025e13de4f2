//! Core types and traits for eventbench
//!
//! This crate defines the foundational types used throughout the system:
//! - EventKey / CompositeKey: contention keys and the row uniqueness triple
//! - Payload / Observation: what each write carries
//! - EventRecord / CheckState / HistoryRing: the persisted row and its merge rules
//! - SqlValue / Row: statement parameters and result rows
//! - CancellationToken: cooperative shutdown signal
//! - Error: Error type hierarchy
//! - Traits: backend capabilities (Backend, Transaction)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod error;
pub mod keys;
pub mod record;
pub mod traits;
pub mod types;
pub mod value;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use keys::generate_key_set;
pub use record::{CheckState, EventRecord, HistoryRing, HISTORY_LEN};
pub use traits::{Backend, Capabilities, StatementKind, Transaction, EVENTS_TABLE};
pub use types::{CompositeKey, EventKey, Observation, Payload, STATUS_OK};
pub use value::{Params, Row, SqlValue};
