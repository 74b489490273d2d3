use super::{parse_str, ParseError, ParseResult, ThreadRecord};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Description stored when a deadlock check finds nothing
pub const NO_DEADLOCK: &str = "No Deadlocks Detected.";

/// Outcome of one deadlock check on a VM, as an agent stores it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockRecord {
    pub agent_id: String,
    pub vm_id: String,

    /// Unix epoch milliseconds of the check
    pub timestamp: i64,

    /// Raw dump of the deadlocked threads, or [`NO_DEADLOCK`]
    pub description: String,
}

impl DeadlockRecord {
    pub fn new(
        agent_id: impl Into<String>,
        vm_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            vm_id: vm_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            description: description.into(),
        }
    }

    pub fn no_deadlock(agent_id: impl Into<String>, vm_id: impl Into<String>) -> Self {
        Self::new(agent_id, vm_id, NO_DEADLOCK)
    }

    /// Record the given deadlocked threads; an empty slice means no deadlock.
    pub fn from_threads(
        agent_id: impl Into<String>,
        vm_id: impl Into<String>,
        threads: &[ThreadRecord],
    ) -> Self {
        if threads.is_empty() {
            return Self::no_deadlock(agent_id, vm_id);
        }
        let description = ParseResult {
            threads: threads.to_vec(),
        }
        .to_string();
        Self::new(agent_id, vm_id, description)
    }

    pub fn is_deadlocked(&self) -> bool {
        self.description.trim() != NO_DEADLOCK
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Parse the stored description. A clean check parses to no threads.
    pub fn threads(&self) -> Result<ParseResult, ParseError> {
        if !self.is_deadlocked() {
            return Ok(ParseResult::default());
        }
        parse_str(&self.description)
    }
}
