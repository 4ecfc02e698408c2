//! Refresh scheduling.
//!
//! A poll timer and a push subscription both feed refresh requests into one
//! worker task. The worker runs at most one orchestration pass at a time;
//! requests that arrive while a pass is running join it and receive its
//! result instead of starting another pass.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use ratefeed_common::SourceKind;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::{RateCache, ReplaceOutcome};
use crate::orchestrator::{Orchestrator, SourceFailure};

/// Pending requests beyond this are dropped; the queued ones already cover them.
const REQUEST_QUEUE: usize = 16;

/// Configuration for the change scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between poll-triggered refreshes.
    pub poll_interval: Duration,
    /// Run one refresh as soon as the scheduler starts.
    pub refresh_on_start: bool,
    /// How long `stop` waits for an in-flight pass to finish.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            refresh_on_start: true,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("Poll interval cannot be zero".to_string());
        }

        Ok(())
    }
}

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Poll,
    Push,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Startup => "startup",
            Trigger::Poll => "poll",
            Trigger::Push => "push",
            Trigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// "Something changed in the rate table." Carries no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Raw notification payload, for logging only.
    pub detail: Option<String>,
}

/// Push channel delivering store change events.
///
/// Dropping the subscription unsubscribes.
#[async_trait]
pub trait ChangeSubscription: Send {
    /// Wait for the next event; `None` once the channel is closed for good.
    async fn next_change(&mut self) -> Option<ChangeEvent>;
}

#[async_trait]
impl ChangeSubscription for mpsc::Receiver<ChangeEvent> {
    async fn next_change(&mut self) -> Option<ChangeEvent> {
        self.recv().await
    }
}

/// How a refresh ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The pass produced a table and the cache took it.
    Updated {
        pass_id: Uuid,
        source: SourceKind,
        snapshot_date: NaiveDate,
    },
    /// The pass produced a table older than the cached one.
    Unchanged {
        pass_id: Uuid,
        source: SourceKind,
        snapshot_date: NaiveDate,
    },
    /// The scheduler stopped while the pass ran; its result was dropped.
    Discarded { pass_id: Uuid },
    /// The scheduler is stopped; no pass ran.
    Stopped,
}

impl RefreshOutcome {
    /// Pass that produced this outcome, if one ran.
    pub fn pass_id(&self) -> Option<Uuid> {
        match self {
            RefreshOutcome::Updated { pass_id, .. }
            | RefreshOutcome::Unchanged { pass_id, .. }
            | RefreshOutcome::Discarded { pass_id } => Some(*pass_id),
            RefreshOutcome::Stopped => None,
        }
    }

    /// Source of the table the pass produced, if it was kept.
    pub fn source(&self) -> Option<SourceKind> {
        match self {
            RefreshOutcome::Updated { source, .. } | RefreshOutcome::Unchanged { source, .. } => {
                Some(*source)
            }
            _ => None,
        }
    }
}

/// Result of an explicit user refresh.
#[derive(Debug, Clone)]
pub struct ManualRefresh {
    pub outcome: RefreshOutcome,
    pub failures: Vec<SourceFailure>,
}

impl ManualRefresh {
    /// True when every live source failed and the static rates were used.
    pub fn is_degraded(&self) -> bool {
        self.outcome.source() == Some(SourceKind::StaticFallback)
    }

    /// Notice to show the user, if the refresh ran degraded.
    pub fn degraded_notice(&self) -> Option<String> {
        if !self.is_degraded() {
            return None;
        }
        let failed: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("{} ({})", f.source, f.error.kind()))
            .collect();
        Some(format!(
            "Live exchange rates are unavailable, showing built-in rates. Failed sources: {}",
            failed.join(", ")
        ))
    }
}

#[derive(Debug, Clone)]
struct PassReport {
    outcome: RefreshOutcome,
    failures: Vec<SourceFailure>,
}

impl PassReport {
    fn stopped() -> Self {
        Self {
            outcome: RefreshOutcome::Stopped,
            failures: Vec::new(),
        }
    }
}

struct RefreshRequest {
    trigger: Trigger,
    reply: Option<oneshot::Sender<PassReport>>,
}

/// Starts the refresh worker and its triggers.
pub struct ChangeScheduler {
    config: SchedulerConfig,
    orchestrator: Arc<Orchestrator>,
    cache: Arc<RateCache>,
}

impl ChangeScheduler {
    pub fn new(config: SchedulerConfig, orchestrator: Arc<Orchestrator>, cache: Arc<RateCache>) -> Self {
        Self {
            config,
            orchestrator,
            cache,
        }
    }

    /// Spawn the worker, the poll timer, and (if given) the push listener.
    pub fn start(self, subscription: Option<Box<dyn ChangeSubscription>>) -> SchedulerHandle {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stopped = Arc::new(AtomicBool::new(false));
        let passes = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            orchestrator: self.orchestrator,
            cache: self.cache,
            requests: requests_rx,
            shutdown: shutdown_rx.clone(),
            stopped: stopped.clone(),
            passes: passes.clone(),
        };
        let worker_task = tokio::spawn(worker.run());

        let handle = SchedulerHandle {
            inner: Arc::new(HandleInner {
                requests: requests_tx,
                shutdown: shutdown_tx,
                stopped,
                passes,
                worker: Mutex::new(Some(worker_task)),
                triggers: Mutex::new(Vec::new()),
                shutdown_grace: self.config.shutdown_grace,
            }),
        };

        let poll_task = tokio::spawn(poll_loop(
            handle.clone(),
            self.config.poll_interval,
            shutdown_rx.clone(),
        ));
        handle.inner.triggers.lock().push(poll_task);

        if let Some(subscription) = subscription {
            let push_task = tokio::spawn(push_loop(handle.clone(), subscription, shutdown_rx));
            handle.inner.triggers.lock().push(push_task);
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Change scheduler started"
        );

        if self.config.refresh_on_start {
            handle.trigger(Trigger::Startup);
        }

        handle
    }
}

struct HandleInner {
    requests: mpsc::Sender<RefreshRequest>,
    shutdown: watch::Sender<bool>,
    stopped: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
    triggers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

/// Cloneable handle to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<HandleInner>,
}

impl SchedulerHandle {
    /// Request a refresh without waiting for it.
    ///
    /// Dropped when the queue is full; a queued request covers it.
    pub fn trigger(&self, trigger: Trigger) {
        if self.is_stopped() {
            return;
        }
        let request = RefreshRequest {
            trigger,
            reply: None,
        };
        if self.inner.requests.try_send(request).is_err() {
            debug!(trigger = %trigger, "Refresh already pending, dropping trigger");
        }
    }

    /// Refresh and wait for the pass that serves this request.
    pub async fn refresh(&self, trigger: Trigger) -> RefreshOutcome {
        self.request(trigger).await.outcome
    }

    /// Explicit user refresh; reports degraded mode.
    pub async fn refresh_manual(&self) -> ManualRefresh {
        let report = self.request(Trigger::Manual).await;
        let refresh = ManualRefresh {
            outcome: report.outcome,
            failures: report.failures,
        };
        if let Some(notice) = refresh.degraded_notice() {
            warn!(notice = %notice, "Manual refresh ran degraded");
        }
        refresh
    }

    async fn request(&self, trigger: Trigger) -> PassReport {
        if self.is_stopped() {
            return PassReport::stopped();
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = RefreshRequest {
            trigger,
            reply: Some(reply_tx),
        };
        if self.inner.requests.send(request).await.is_err() {
            return PassReport::stopped();
        }

        reply_rx.await.unwrap_or_else(|_| PassReport::stopped())
    }

    /// Number of orchestration passes completed.
    pub fn passes(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Cancel the timer, unsubscribe, and wait for an in-flight pass to end.
    ///
    /// The in-flight pass is not aborted, but its table is not cached.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping change scheduler");

        let _ = self.inner.shutdown.send(true);
        for task in self.inner.triggers.lock().drain(..) {
            task.abort();
        }

        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            if tokio::time::timeout(self.inner.shutdown_grace, worker)
                .await
                .is_err()
            {
                warn!("Refresh pass still running after shutdown grace period");
            }
        }

        info!("Change scheduler stopped");
    }
}

struct Worker {
    orchestrator: Arc<Orchestrator>,
    cache: Arc<RateCache>,
    requests: mpsc::Receiver<RefreshRequest>,
    shutdown: watch::Receiver<bool>,
    stopped: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self) {
        let Worker {
            orchestrator,
            cache,
            mut requests,
            mut shutdown,
            stopped,
            passes,
        } = self;

        loop {
            let first = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            if stopped.load(Ordering::SeqCst) {
                break;
            }

            let pass_id = Uuid::now_v7();
            let mut waiters: Vec<oneshot::Sender<PassReport>> = first.reply.into_iter().collect();
            let mut joined = 0usize;

            let pass = run_pass(&orchestrator, &cache, &stopped, pass_id, first.trigger);
            tokio::pin!(pass);

            let report = loop {
                tokio::select! {
                    report = &mut pass => break report,
                    Some(request) = requests.recv() => {
                        joined += 1;
                        debug!(pass_id = %pass_id, trigger = %request.trigger, "Joined in-flight refresh");
                        waiters.extend(request.reply);
                    }
                }
            };
            passes.fetch_add(1, Ordering::SeqCst);

            if joined > 0 {
                debug!(pass_id = %pass_id, joined, "Coalesced refresh requests");
            }
            for waiter in waiters {
                let _ = waiter.send(report.clone());
            }

            if stopped.load(Ordering::SeqCst) {
                break;
            }
        }

        debug!("Refresh worker exited");
    }
}

#[instrument(skip_all, fields(pass_id = %pass_id, trigger = %trigger))]
async fn run_pass(
    orchestrator: &Orchestrator,
    cache: &RateCache,
    stopped: &AtomicBool,
    pass_id: Uuid,
    trigger: Trigger,
) -> PassReport {
    cache.set_loading(true);
    let orchestration = orchestrator.orchestrate_detailed().await;
    cache.set_loading(false);

    if stopped.load(Ordering::SeqCst) {
        info!("Scheduler stopped during refresh, discarding result");
        return PassReport {
            outcome: RefreshOutcome::Discarded { pass_id },
            failures: orchestration.failures,
        };
    }

    if !orchestration.is_degraded() {
        cache.clear_last_error();
    } else {
        let summary: Vec<String> = orchestration
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.source, f.error))
            .collect();
        cache.set_last_error(summary.join("; "));
    }

    let table = orchestration.table;
    let source = table.source();
    let snapshot_date = table.snapshot_date();
    let outcome = match cache.replace(table) {
        ReplaceOutcome::Replaced => RefreshOutcome::Updated {
            pass_id,
            source,
            snapshot_date,
        },
        ReplaceOutcome::Stale { .. } => RefreshOutcome::Unchanged {
            pass_id,
            source,
            snapshot_date,
        },
    };

    PassReport {
        outcome,
        failures: orchestration.failures,
    }
}

async fn poll_loop(handle: SchedulerHandle, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => handle.trigger(Trigger::Poll),
        }
    }
}

async fn push_loop(
    handle: SchedulerHandle,
    mut subscription: Box<dyn ChangeSubscription>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = subscription.next_change() => match event {
                Some(event) => {
                    debug!(detail = ?event.detail, "Rate table changed");
                    handle.trigger(Trigger::Push);
                }
                None => {
                    warn!("Push subscription closed, relying on polling only");
                    break;
                }
            },
        }
    }
}
