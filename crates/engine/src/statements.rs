//! Prepared statement set
//!
//! Statements are prepared once before any worker starts and shared
//! read-only by all of them. They are released exactly once: `close()` at
//! orderly shutdown, or the drop guard on any other exit path (an early
//! return, a failed prepare halfway through the set, a panic).

use eventbench_core::{Backend, CancellationToken, Result, StatementKind};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Statements prepared against one backend
pub struct StatementSet<'b, B: Backend> {
    backend: &'b B,
    prepared: Vec<(StatementKind, B::Statement)>,
    closed: AtomicBool,
}

impl<'b, B: Backend> StatementSet<'b, B> {
    /// Prepare every statement in `kinds`
    ///
    /// # Errors
    ///
    /// Returns the first preparation error. Statements prepared before the
    /// failure are closed before returning.
    pub fn prepare(
        backend: &'b B,
        kinds: &[StatementKind],
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut set = Self {
            backend,
            prepared: Vec::with_capacity(kinds.len()),
            closed: AtomicBool::new(false),
        };
        for &kind in kinds {
            let statement = backend.prepare(kind, cancel)?;
            set.prepared.push((kind, statement));
        }
        info!(
            target: "eventbench::run",
            backend = backend.name(),
            statements = set.prepared.len(),
            "prepared statements"
        );
        Ok(set)
    }

    /// Handle for `kind`, if it was prepared
    pub fn get(&self, kind: StatementKind) -> Option<&B::Statement> {
        self.prepared
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, statement)| statement)
    }

    /// Number of prepared statements
    pub fn len(&self) -> usize {
        self.prepared.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.prepared.is_empty()
    }

    /// Release every statement
    ///
    /// Only the first call does anything. Every statement is closed even if
    /// an earlier one fails; the first error is returned.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_err = None;
        for (kind, statement) in &self.prepared {
            if let Err(e) = self.backend.close(statement) {
                warn!(target: "eventbench::run", statement = %kind, error = %e, "failed to close statement");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<B: Backend> Drop for StatementSet<'_, B> {
    fn drop(&mut self) {
        // Errors were already logged by close()
        let _ = self.close();
    }
}
