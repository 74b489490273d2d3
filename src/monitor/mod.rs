// Reference-set change monitoring
//
// A monitor polls a ReferenceSource for the set of references under a target,
// diffs each fetch against the previous snapshot and tells listeners what
// appeared and what went away.

mod diff;
mod domain;
mod poller;
mod registry;


pub use diff::{diff, SetDiff};
pub use domain::{host_monitor, network_monitor, HostMonitor, NetworkMonitor};
pub use registry::{listener, ReferenceSetMonitor, MIN_POLL_PERIOD};

use crate::reference::Reference;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

/// Key a poll loop is registered under (a host, the network).
pub trait PollTarget: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> PollTarget for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Backing query source for the references under a target.
///
/// Called synchronously from the blocking pool, once per tick and once per
/// `query`. Closures of the right shape implement it.
pub trait ReferenceSource<T, R>: Send + Sync + 'static {
    fn fetch_all(&self, target: &T) -> Result<Vec<R>>;
}

impl<T, R, F> ReferenceSource<T, R> for F
where
    F: Fn(&T) -> Result<Vec<R>> + Send + Sync + 'static,
{
    fn fetch_all(&self, target: &T) -> Result<Vec<R>> {
        self(target)
    }
}

/// A single membership change observed between two ticks
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "reference", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent<R> {
    Added(R),
    Removed(R),
}

impl<R> ChangeEvent<R> {
    pub fn reference(&self) -> &R {
        match self {
            ChangeEvent::Added(r) | ChangeEvent::Removed(r) => r,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, ChangeEvent::Added(_))
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, ChangeEvent::Removed(_))
    }
}

/// Callback for membership changes.
///
/// Invoked on the tick of the target it is registered for. Panics are caught
/// and logged; they do not reach other listeners or stop the loop.
pub trait ChangeListener<R>: Send + Sync {
    fn on_change(&self, event: &ChangeEvent<R>);
}

impl<R, F> ChangeListener<R> for F
where
    F: Fn(&ChangeEvent<R>) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent<R>) {
        self(event)
    }
}

/// References observed at one poll tick. Replaced wholesale, never edited.
#[derive(Clone, Debug)]
pub struct ReferenceSetSnapshot<R: Reference> {
    references: HashSet<R>,
    taken_at: DateTime<Utc>,
}

impl<R: Reference> ReferenceSetSnapshot<R> {
    pub fn new(references: impl IntoIterator<Item = R>) -> Self {
        Self {
            references: references.into_iter().collect(),
            taken_at: Utc::now(),
        }
    }

    /// Snapshot a poll loop starts from, before its first fetch.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn references(&self) -> &HashSet<R> {
        &self.references
    }

    pub fn contains(&self, reference: &R) -> bool {
        self.references.contains(reference)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}
