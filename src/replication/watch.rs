// ABOUTME: Runs status aggregation on a fixed interval with a start/stop lifecycle
// ABOUTME: Delivers check, status and error notifications to a handler and subscribers

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::aggregate::{aggregate, AggregateOptions};
use super::gateway::ReplicationGateway;
use super::models::StatusSnapshot;
use crate::error::MonitorError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const EVENT_CAPACITY: usize = 64;

/// What to do when a tick fires while the previous cycle is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Drop the tick; at most one scheduled cycle is in flight, including
    /// one left running by a schedule that was stopped and restarted.
    #[default]
    Skip,
    /// Start another cycle regardless.
    Allow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub aggregate: AggregateOptions,
    pub interval: Duration,
    pub overlap: OverlapPolicy,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            aggregate: AggregateOptions::default(),
            interval: DEFAULT_INTERVAL,
            overlap: OverlapPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A cycle is about to run.
    Check,
    Status(Arc<StatusSnapshot>),
    Error(Arc<anyhow::Error>),
}

impl WatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Check => "check",
            WatchEvent::Status(_) => "status",
            WatchEvent::Error(_) => "error",
        }
    }
}

pub type WatchHandler = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

enum WatcherState {
    Idle,
    Running { cancel: CancellationToken },
}

struct Inner {
    gateway: Arc<dyn ReplicationGateway>,
    options: WatchOptions,
    handler: RwLock<Option<WatchHandler>>,
    events: broadcast::Sender<WatchEvent>,
    state: Mutex<WatcherState>,
    in_flight: AtomicBool,
}

/// Handle to a replication status watcher. Clones share the same watcher.
///
/// A running schedule keeps its own handle, so it lives until `stop()`
/// is called even if every other handle is dropped.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<Inner>,
}

/// Creates a watcher with `handler` and starts it.
pub fn watch<F>(gateway: Arc<dyn ReplicationGateway>, options: WatchOptions, handler: F) -> Watcher
where
    F: Fn(&WatchEvent) + Send + Sync + 'static,
{
    let watcher = Watcher::new(gateway, options).with_handler(handler);
    watcher.start();
    watcher
}

impl Watcher {
    pub fn new(gateway: Arc<dyn ReplicationGateway>, options: WatchOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                gateway,
                options,
                handler: RwLock::new(None),
                events,
                state: Mutex::new(WatcherState::Idle),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&WatchEvent) + Send + Sync + 'static,
    {
        self.set_handler(handler);
        self
    }

    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&WatchEvent) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(handler));
    }

    /// Receives every notification the handler receives.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.events.subscribe()
    }

    pub fn options(&self) -> &WatchOptions {
        &self.inner.options
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state(), WatcherState::Running { .. })
    }

    /// Runs one cycle now, then one per interval until `stop()`.
    ///
    /// Under `OverlapPolicy::Skip` the immediate cycle is skipped too when a
    /// cycle from before a restart has not finished yet.
    /// Calling it while running does nothing. Without a handler the
    /// watcher stays idle and a startup error is delivered to subscribers.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut state = self.state();
        if matches!(*state, WatcherState::Running { .. }) {
            return;
        }

        if self.handler().is_none() {
            drop(state);
            tracing::error!("Replication watcher started without a handler");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let err = MonitorError::WatcherStartup("no handler to start with".to_string());
                inner.emit(&WatchEvent::Error(Arc::new(err.into())));
            });
            return;
        }

        let cancel = CancellationToken::new();
        *state = WatcherState::Running {
            cancel: cancel.clone(),
        };
        drop(state);

        tracing::info!(
            interval_secs = self.inner.options.interval.as_secs(),
            overlap = ?self.inner.options.overlap,
            "Starting replication watcher"
        );
        tokio::spawn(self.clone().run(cancel));
    }

    /// Halts future cycles. A cycle already in flight runs to completion.
    pub fn stop(&self) {
        let mut state = self.state();
        if let WatcherState::Running { cancel } = &*state {
            cancel.cancel();
            *state = WatcherState::Idle;
            tracing::info!("Stopped replication watcher");
        }
    }

    /// Runs a single aggregation cycle and notifies about its outcome.
    pub async fn check(&self) -> Result<Arc<StatusSnapshot>, Arc<anyhow::Error>> {
        self.inner.emit(&WatchEvent::Check);

        match aggregate(self.inner.gateway.as_ref(), &self.inner.options.aggregate).await {
            Ok(snapshot) => {
                tracing::debug!(jobs = snapshot.len(), "Replication status check complete");
                let snapshot = Arc::new(snapshot);
                self.inner.emit(&WatchEvent::Status(Arc::clone(&snapshot)));
                Ok(snapshot)
            }
            Err(err) => {
                tracing::warn!("Replication status check failed: {:#}", err);
                let err = Arc::new(err);
                self.inner.emit(&WatchEvent::Error(Arc::clone(&err)));
                Err(err)
            }
        }
    }

    async fn run(self, cancel: CancellationToken) {
        self.guarded_check().await;

        let period = self.inner.options.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.dispatch(),
            }
        }
        tracing::debug!("Replication watcher schedule ended");
    }

    // Ticks are time based: each cycle runs in its own task so a slow
    // cycle never delays the schedule.
    fn dispatch(&self) {
        let watcher = self.clone();
        tokio::spawn(async move { watcher.guarded_check().await });
    }

    async fn guarded_check(&self) {
        if self.inner.options.overlap == OverlapPolicy::Allow {
            let _ = self.check().await;
            return;
        }

        // the flag is shared across restarts, so a cycle left over from a
        // stopped schedule still blocks the next one
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Previous replication status check still running, skipping cycle");
            return;
        }
        let _ = self.check().await;
        self.inner.in_flight.store(false, Ordering::SeqCst);
    }

    fn state(&self) -> MutexGuard<'_, WatcherState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handler(&self) -> Option<WatchHandler> {
        self.inner
            .handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Inner {
    fn emit(&self, event: &WatchEvent) {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler(event);
        }
        // no subscribers is fine
        let _ = self.events.send(event.clone());
    }
}
