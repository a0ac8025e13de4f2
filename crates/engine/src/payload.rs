//! Fixture payload encoder
//!
//! Every write in a run carries the same opaque blob: a fixture check event
//! with a multi-line canned output, serialized once with MessagePack. The
//! size is representative of a real monitoring event, which is what matters
//! for the benchmark; nothing ever decodes it on the hot path.

use eventbench_core::{Error, Payload, Result};
use serde::{Deserialize, Serialize};

/// Canned multi-line check output
const CANNED_OUTPUT: &str = r"
            ________________________________
           |  CHECK  |  STATUS  |  LATENCY  |
           |---------|----------|-----------|
           |  disk   |    ok    |    3 ms   |
           |  cpu    |    ok    |    1 ms   |
           |  mem    |   warn   |    2 ms   |
           |  net    |    ok    |   14 ms   |
           |_________|__________|___________|
                 \
                  \    .--.
                   \  |o_o |
                      |:_/ |
                     //   \ \
                    (|     | )
                   /'\_   _/`\
                   \___)=(___/
";

/// Entity the fixture event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureEntity {
    /// Entity name
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// Subscriptions
    pub subscriptions: Vec<String>,
}

/// Check the fixture event reports on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureCheck {
    /// Check name
    pub name: String,
    /// Command the agent ran
    pub command: String,
    /// Scheduling interval in seconds
    pub interval: u32,
    /// Captured output
    pub output: String,
    /// Exit status
    pub status: u32,
    /// When the check was issued
    pub issued: i64,
    /// When the check finished
    pub executed: i64,
}

/// A check event as an agent would report it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureEvent {
    /// Reporting entity
    pub entity: FixtureEntity,
    /// Check result
    pub check: FixtureCheck,
    /// Event timestamp
    pub timestamp: i64,
}

impl FixtureEvent {
    /// Fixture event for `entity` / `check` with the canned output
    pub fn new(entity: &str, check: &str) -> Self {
        Self {
            entity: FixtureEntity {
                name: entity.to_string(),
                namespace: "default".to_string(),
                subscriptions: vec!["linux".to_string(), format!("entity:{}", entity)],
            },
            check: FixtureCheck {
                name: check.to_string(),
                command: format!("{} --warn 80 --crit 90", check),
                interval: 60,
                output: CANNED_OUTPUT.to_string(),
                status: 0,
                issued: 1,
                executed: 1,
            },
            timestamp: 1,
        }
    }
}

/// Serialize the fixture event used by every write in a run
///
/// Deterministic for a given build.
pub fn encode_fixture() -> Result<Payload> {
    let event = FixtureEvent::new("entity", "check");
    let bytes =
        rmp_serde::to_vec_named(&event).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(Payload::from(bytes))
}
