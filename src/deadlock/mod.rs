// Deadlock dump parsing and wait-for analysis

mod graph;
mod parser;
mod record;

#[cfg(test)]
mod tests;

pub use graph::{WaitEdge, WaitGraph};
pub use parser::{parse_str, DeadlockParser, ParseError, ParseErrorKind};
pub use record::{DeadlockRecord, NO_DEADLOCK};

use serde::{Deserialize, Serialize};
use std::fmt;

/// JVM thread state, as printed in a thread dump header
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadState {
    New,
    Runnable,
    Blocked,
    Waiting,
    TimedWaiting,
    Terminated,
}

impl ThreadState {
    /// Parse the exact upper-case token used by the JVM.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "NEW" => Some(ThreadState::New),
            "RUNNABLE" => Some(ThreadState::Runnable),
            "BLOCKED" => Some(ThreadState::Blocked),
            "WAITING" => Some(ThreadState::Waiting),
            "TIMED_WAITING" => Some(ThreadState::TimedWaiting),
            "TERMINATED" => Some(ThreadState::Terminated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::New => "NEW",
            ThreadState::Runnable => "RUNNABLE",
            ThreadState::Blocked => "BLOCKED",
            ThreadState::Waiting => "WAITING",
            ThreadState::TimedWaiting => "TIMED_WAITING",
            ThreadState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lock and the id of the thread holding it
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lock {
    /// Lock identity, e.g. `java.util.concurrent.locks.ReentrantLock$NonfairSync@602fe64a`
    pub id: String,

    /// Id of the owning thread
    pub owner_id: String,
}

impl Lock {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// One thread block of a deadlock dump
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub name: String,

    /// Thread id as printed (not necessarily numeric)
    pub id: String,

    pub state: ThreadState,

    /// Lock this thread is blocked or waiting on
    pub waiting_on: Option<Lock>,

    /// Name of the thread owning `waiting_on`. An empty name in the dump
    /// reads as `None`, so a record without one renders and parses back equal.
    pub lock_owner_name: Option<String>,

    /// Locked ownable synchronizers, in dump order
    pub owned_locks: Vec<Lock>,

    /// Object monitors held (`- locked` lines), in dump order
    pub locked_monitors: Vec<Lock>,

    /// Stack frames, innermost first, without the `at` keyword
    pub stack_trace: Vec<String>,
}

/// Renders the canonical dump form. Parsing the output yields an equal record.
impl fmt::Display for ThreadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" Id={} {}", self.name, self.id, self.state)?;
        if let Some(lock) = &self.waiting_on {
            write!(
                f,
                " on {} owned by \"{}\" Id={}",
                lock.id,
                self.lock_owner_name.as_deref().unwrap_or_default(),
                lock.owner_id
            )?;
        }
        writeln!(f)?;

        for frame in &self.stack_trace {
            writeln!(f, "\tat {}", frame)?;
        }
        for monitor in &self.locked_monitors {
            writeln!(f, "\t-  locked {}", monitor.id)?;
        }

        if !self.owned_locks.is_empty() {
            writeln!(f)?;
            writeln!(f, "\tNumber of locked synchronizers = {}", self.owned_locks.len())?;
            for lock in &self.owned_locks {
                writeln!(f, "\t- {}", lock.id)?;
            }
        }
        Ok(())
    }
}

/// Threads of one dump, in the order their headers appeared
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub threads: Vec<ThreadRecord>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Look up a thread by its id
    pub fn thread(&self, id: &str) -> Option<&ThreadRecord> {
        self.threads.iter().find(|t| t.id == id)
    }
}

impl fmt::Display for ParseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, thread) in self.threads.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", thread)?;
        }
        Ok(())
    }
}
