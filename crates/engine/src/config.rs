//! Benchmark configuration via TOML
//!
//! Every field has a default, so an empty file (or no file) describes the
//! reference workload: 50 workers, 24 connections, 1000 keys against the
//! in-memory backend. Command-line flags override file values.

use eventbench_core::{Error, Observation, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Which persistence strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    /// Upsert if the backend supports it natively, otherwise transactional
    #[default]
    Auto,
    /// Transactional read-modify-write
    Transactional,
    /// Atomic upsert with history
    Upsert,
}

impl FromStr for StrategyChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(StrategyChoice::Auto),
            "transactional" => Ok(StrategyChoice::Transactional),
            "upsert" => Ok(StrategyChoice::Upsert),
            other => Err(Error::config(format!(
                "unknown strategy '{}', expected auto, transactional or upsert",
                other
            ))),
        }
    }
}

impl fmt::Display for StrategyChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyChoice::Auto => "auto",
            StrategyChoice::Transactional => "transactional",
            StrategyChoice::Upsert => "upsert",
        })
    }
}

/// Observation written by the upsert strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Status code; 0 is ok
    #[serde(default = "default_status")]
    pub status: i64,
    /// Fixed timestamp, or `None` for the wall clock (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

fn default_status() -> i64 {
    1
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            timestamp: Some(1),
        }
    }
}

impl ObservationConfig {
    /// The observation for one write
    pub fn observe(&self) -> Observation {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        Observation::new(self.status, timestamp)
    }
}

/// Benchmark configuration
///
/// # Example
///
/// ```toml
/// concurrency = 50
/// connections = 24
/// event_count = 1000
/// backend_target = "memory"   # or "sqlite:/tmp/events.db", "postgres://...", "mysql://..."
/// strategy = "auto"           # "transactional" or "upsert"
/// report_interval_ms = 1000
/// lock_wait_timeout_ms = 50000
/// # duration_secs = 30
///
/// [observation]
/// status = 1
/// timestamp = 1               # omit to use the wall clock
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of workers
    pub concurrency: usize,
    /// Maximum backend connections
    pub connections: usize,
    /// Size of the contention key set
    pub event_count: usize,
    /// Backend target string
    pub backend_target: String,
    /// Persistence strategy
    pub strategy: StrategyChoice,
    /// Reporter period in milliseconds
    pub report_interval_ms: u64,
    /// Row-lock / busy wait limit in milliseconds
    pub lock_wait_timeout_ms: u64,
    /// Stop automatically after this many seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Observation fed to the upsert strategy
    pub observation: ObservationConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            connections: 24,
            event_count: 1000,
            backend_target: "memory".to_string(),
            strategy: StrategyChoice::Auto,
            report_interval_ms: 1000,
            lock_wait_timeout_ms: 50_000,
            duration_secs: None,
            observation: ObservationConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Reject values that cannot produce a run
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("concurrency", self.concurrency as u64),
            ("connections", self.connections as u64),
            ("event_count", self.event_count as u64),
            ("report_interval_ms", self.report_interval_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::config(format!("{} must be at least 1", name)));
            }
        }
        if self.backend_target.trim().is_empty() {
            return Err(Error::config("backend_target must not be empty"));
        }
        Ok(())
    }

    /// Reporter period
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// Row-lock / busy wait limit
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    /// Automatic stop, if configured
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}
