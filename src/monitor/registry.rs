use super::poller::Poller;
use super::{ChangeEvent, ChangeListener, PollTarget, ReferenceSetSnapshot, ReferenceSource};
use crate::reference::Reference;
use anyhow::{Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Shortest period a poll loop will tick at
pub const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Watches reference sets per target and notifies listeners of changes.
///
/// Poll loops are reference counted by listener: the first `subscribe` for a
/// target spawns its loop, the last `unsubscribe` stops it. There is never
/// more than one loop per target. Each loop ticks on its own task, so a slow
/// listener only holds back the target it listens to.
pub struct ReferenceSetMonitor<T: PollTarget, R: Reference> {
    source: Arc<dyn ReferenceSource<T, R>>,
    period: Duration,
    pollers: DashMap<T, Poller<T, R>>,
    runtime: Handle,
}

impl<T: PollTarget, R: Reference> ReferenceSetMonitor<T, R> {
    /// Create a monitor polling `source` every `period`.
    ///
    /// Must be called from within a Tokio runtime; poll loops are spawned on
    /// it. Use [`with_runtime`](Self::with_runtime) to pass one explicitly.
    pub fn new(source: impl ReferenceSource<T, R>, period: Duration) -> Self {
        Self::with_runtime(source, period, Handle::current())
    }

    /// A zero `period` is raised to [`MIN_POLL_PERIOD`].
    pub fn with_runtime(source: impl ReferenceSource<T, R>, period: Duration, runtime: Handle) -> Self {
        let period = if period.is_zero() {
            warn!(
                min_period_ms = MIN_POLL_PERIOD.as_millis() as u64,
                "Zero poll period requested, using minimum"
            );
            MIN_POLL_PERIOD
        } else {
            period
        };

        Self {
            source: Arc::new(source),
            period,
            pollers: DashMap::new(),
            runtime,
        }
    }

    /// Polling period used for every target of this monitor
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Register `listener` for changes under `target`.
    ///
    /// Starts the target's poll loop if this is its first listener. The same
    /// listener registered twice is notified twice.
    pub fn subscribe(&self, target: T, listener: Arc<dyn ChangeListener<R>>) {
        match self.pollers.entry(target) {
            Entry::Occupied(entry) => entry.get().add_listener(listener),
            Entry::Vacant(entry) => {
                info!(poll_target = ?entry.key(), "Starting monitor for target");
                let poller = Poller::start(
                    entry.key().clone(),
                    self.source.clone(),
                    listener,
                    self.period,
                    &self.runtime,
                );
                entry.insert(poller);
            }
        }
    }

    /// Remove one registration of `listener` from `target`.
    ///
    /// Stops the poll loop when no listeners remain. Unknown targets and
    /// listeners are ignored.
    pub fn unsubscribe(&self, target: &T, listener: &Arc<dyn ChangeListener<R>>) {
        let Entry::Occupied(entry) = self.pollers.entry(target.clone()) else {
            return;
        };

        let remaining = entry.get().remove_listener(listener);
        if remaining == 0 {
            let (target, poller) = entry.remove_entry();
            poller.stop();
            info!(poll_target = ?target, "Stopped monitor for target, no listeners left");
        }
    }

    /// Fetch the references under `target` now and keep those matching
    /// `predicate`. Does not touch any poll loop. Order is unspecified.
    pub fn query<P>(&self, target: &T, predicate: P) -> Result<Vec<R>>
    where
        P: Fn(&R) -> bool,
    {
        let references = self
            .source
            .fetch_all(target)
            .with_context(|| format!("Failed to query references for {:?}", target))?;

        Ok(references.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Last snapshot published by the target's poll loop, if one is running
    pub fn snapshot(&self, target: &T) -> Option<Arc<ReferenceSetSnapshot<R>>> {
        self.pollers.get(target).map(|poller| poller.snapshot())
    }

    pub fn is_monitoring(&self, target: &T) -> bool {
        self.pollers.contains_key(target)
    }

    pub fn listener_count(&self, target: &T) -> usize {
        self.pollers
            .get(target)
            .map(|poller| poller.listener_count())
            .unwrap_or(0)
    }

    pub fn active_targets(&self) -> Vec<T> {
        self.pollers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Stop every poll loop and drop all registrations.
    pub fn shutdown(&self) {
        let targets = self.active_targets();
        for target in targets {
            if let Some((target, poller)) = self.pollers.remove(&target) {
                poller.stop();
                info!(poll_target = ?target, "Stopped monitor for target on shutdown");
            }
        }
    }
}

impl<T: PollTarget, R: Reference> Drop for ReferenceSetMonitor<T, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: PollTarget, R: Reference> std::fmt::Debug for ReferenceSetMonitor<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceSetMonitor")
            .field("period", &self.period)
            .field("targets", &self.pollers.len())
            .finish()
    }
}

/// Convenience for building a shared listener from a closure.
pub fn listener<R, F>(f: F) -> Arc<dyn ChangeListener<R>>
where
    R: 'static,
    F: Fn(&ChangeEvent<R>) + Send + Sync + 'static,
{
    Arc::new(f)
}
