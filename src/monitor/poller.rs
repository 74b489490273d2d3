use super::{diff, ChangeEvent, ChangeListener, PollTarget, ReferenceSetSnapshot, ReferenceSource};
use crate::reference::Reference;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub(crate) type SharedListener<R> = Arc<dyn ChangeListener<R>>;

/// Identity comparison for listeners (data pointer only, vtables may differ).
pub(crate) fn same_listener<R>(a: &SharedListener<R>, b: &SharedListener<R>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// State shared between a poll loop and the registry that owns it
struct PollState<T, R: Reference> {
    target: T,
    source: Arc<dyn ReferenceSource<T, R>>,
    listeners: RwLock<Vec<SharedListener<R>>>,
    snapshot: RwLock<Arc<ReferenceSetSnapshot<R>>>,
    stopped: AtomicBool,
}

impl<T: PollTarget, R: Reference> PollState<T, R> {
    /// One fetch-diff-notify pass. Runs on the blocking pool.
    fn tick(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let fetched = match self.source.fetch_all(&self.target) {
            Ok(references) => references,
            Err(e) => {
                warn!(
                    poll_target = ?self.target,
                    error = %e,
                    "Failed to fetch references, keeping previous snapshot"
                );
                return;
            }
        };

        let current = Arc::new(ReferenceSetSnapshot::new(fetched));
        let previous = {
            let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, current.clone())
        };

        let changes = diff(previous.references(), current.references());
        if changes.is_empty() {
            return;
        }

        debug!(
            poll_target = ?self.target,
            added = changes.added.len(),
            removed = changes.removed.len(),
            "Reference set changed"
        );

        // Listeners registered mid-delivery start with the next tick
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for event in changes.into_events() {
            for listener in &listeners {
                self.deliver(listener, &event);
            }
        }
    }

    fn deliver(&self, listener: &SharedListener<R>, event: &ChangeEvent<R>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_change(event)));
        if outcome.is_err() {
            error!(
                poll_target = ?self.target,
                reference = ?event.reference(),
                "Listener panicked while handling change event"
            );
        }
    }
}

/// A running poll loop for one target, plus its listeners
pub(crate) struct Poller<T, R: Reference> {
    state: Arc<PollState<T, R>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<T: PollTarget, R: Reference> Poller<T, R> {
    /// Spawn the loop on `runtime`. The first tick fires immediately.
    pub(crate) fn start(
        target: T,
        source: Arc<dyn ReferenceSource<T, R>>,
        first_listener: SharedListener<R>,
        period: Duration,
        runtime: &Handle,
    ) -> Self {
        let state = Arc::new(PollState {
            target,
            source,
            listeners: RwLock::new(vec![first_listener]),
            snapshot: RwLock::new(Arc::new(ReferenceSetSnapshot::empty())),
            stopped: AtomicBool::new(false),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = runtime.spawn(run_poll_loop(state.clone(), period, stop_rx));

        Self {
            state,
            stop_tx,
            task,
        }
    }

    pub(crate) fn add_listener(&self, listener: SharedListener<R>) {
        self.state
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove one registration of `listener`. Returns how many remain.
    pub(crate) fn remove_listener(&self, listener: &SharedListener<R>) -> usize {
        let mut listeners = self
            .state
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(pos) = listeners.iter().position(|l| same_listener(l, listener)) {
            listeners.remove(pos);
        }
        listeners.len()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.state
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn snapshot(&self) -> Arc<ReferenceSetSnapshot<R>> {
        self.state
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop ticking. An in-flight tick finishes; no new fetch starts.
    pub(crate) fn stop(self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        // Receiver gone means the loop already exited
        let _ = self.stop_tx.send(true);
        drop(self.task);
    }
}

async fn run_poll_loop<T: PollTarget, R: Reference>(
    state: Arc<PollState<T, R>>,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);

    // A tick that overruns the period delays the next one instead of piling up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        poll_target = ?state.target,
        period_ms = period.as_millis() as u64,
        "Poll loop started"
    );

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        if state.stopped.load(Ordering::SeqCst) {
            break;
        }

        let tick_state = state.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || tick_state.tick()).await {
            error!(poll_target = ?state.target, error = %e, "Poll tick failed");
        }
    }

    info!(poll_target = ?state.target, "Poll loop stopped");
}
