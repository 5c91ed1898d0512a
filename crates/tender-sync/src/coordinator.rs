//! Sync coordinator: the single task that fetches, derives, overlays and
//! publishes snapshots.
//!
//! The coordinator runs in a dedicated tokio task. The handle talks to it
//! through a typed command channel and observes it through watch channels
//! (snapshot, cycle state, health). At most one cycle is in flight; triggers
//! arriving mid-cycle collapse into a single follow-up cycle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use tender_net::{NetError, RecordSource, Session, WalletEvent};
use tender_shared::{AccountProfile, Record, Snapshot, SyncError};

use crate::backoff::Backoff;
use crate::config::SyncConfig;
use crate::overlay::{ActionOutcome, OptimisticOverlay};

// ---------------------------------------------------------------------------
// Command / observation types
// ---------------------------------------------------------------------------

/// Why a cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Manual,
    Poll,
    Retry,
    Wallet,
    ActionSettled,
}

/// Commands sent *into* the coordinator task.
#[derive(Debug)]
pub(crate) enum SyncCommand {
    /// Run a cycle now, or once more after the one in flight.
    Trigger(TriggerReason),
    /// Rebuild the snapshot from the last fetch and the current overlay.
    /// The sender, if any, is notified once it is published.
    Republish(Option<oneshot::Sender<()>>),
    /// Drop the cycle in flight without publishing.
    Cancel,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
    Deriving,
    Overlaying,
    Published,
}

/// Fetch health as seen by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHealth {
    /// Failed count fetches since the last successful cycle.
    pub consecutive_failures: u32,
    /// Delay until the scheduled retry, if one is scheduled.
    pub next_retry_in: Option<Duration>,
    pub last_error: Option<String>,
    /// Unix seconds of the last published fetch.
    pub last_success: Option<i64>,
}

/// Channels connecting a spawned coordinator to its handle.
pub(crate) struct CoordinatorChannels {
    pub commands: mpsc::Sender<SyncCommand>,
    pub snapshots: watch::Receiver<Arc<Snapshot>>,
    pub states: watch::Receiver<CycleState>,
    pub health: watch::Receiver<SyncHealth>,
    pub task: JoinHandle<()>,
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Raw result of one fetch phase.
#[derive(Debug, Clone, Default)]
struct Fetched {
    /// Materialized records in ledger order.
    records: Vec<Record>,
    remote_count: u64,
    unavailable: Vec<u64>,
}

/// One fetch phase: count, then every index with at most `concurrency`
/// requests in flight. Only a failed count fails the phase.
async fn fetch_records(
    source: Arc<dyn RecordSource>,
    concurrency: usize,
) -> Result<Fetched, SyncError> {
    let remote_count = source.fetch_count().await.map_err(SyncError::from)?;
    debug!(count = remote_count, "Fetched record count");

    let results: Vec<(u64, Result<Record, NetError>)> = futures::stream::iter(1..=remote_count)
        .map(|index| {
            let source = source.clone();
            async move { (index, source.fetch_record(index).await) }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut fetched = Fetched {
        records: Vec::with_capacity(results.len()),
        remote_count,
        unavailable: Vec::new(),
    };

    for (index, result) in results {
        match result {
            Ok(record) if record.is_materialized() => fetched.records.push(record),
            Ok(_) => debug!(index, "Skipping unmaterialized record"),
            Err(NetError::NotFound(_)) => debug!(index, "Record not found, skipping"),
            Err(e) => {
                warn!(index, error = %e, "Record fetch failed");
                fetched.unavailable.push(index);
            }
        }
    }

    Ok(fetched)
}

/// Account profile for the session's address. `Ok(None)` without one.
async fn fetch_account(session: Session) -> Result<Option<AccountProfile>, NetError> {
    session.load_account().await
}

struct CycleOutput {
    fetched: Result<Fetched, SyncError>,
    account: Result<Option<AccountProfile>, NetError>,
}

/// Resolve `fut` if present, never otherwise.
async fn maybe<F>(fut: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match fut {
        Some(f) => f.await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Coordinator {
    session: Session,
    config: SyncConfig,
    overlay: Arc<Mutex<OptimisticOverlay>>,
    outcomes: broadcast::Sender<ActionOutcome>,

    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    state_tx: watch::Sender<CycleState>,
    health_tx: watch::Sender<SyncHealth>,

    backoff: Backoff,
    generation: u64,
    last_fetch: Option<Fetched>,
    account: Option<AccountProfile>,

    cycle: Option<BoxFuture<'static, CycleOutput>>,
    follow_up: bool,
    retry: Option<Pin<Box<Sleep>>>,
}

/// Spawn the coordinator task.
///
/// The first cycle starts immediately; afterwards cycles run on the poll
/// interval, on command and on wallet changes.
pub(crate) fn spawn_coordinator(
    session: Session,
    config: SyncConfig,
    overlay: Arc<Mutex<OptimisticOverlay>>,
    outcomes: broadcast::Sender<ActionOutcome>,
) -> CoordinatorChannels {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SyncCommand>(64);
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::empty()));
    let (state_tx, state_rx) = watch::channel(CycleState::Idle);
    let (health_tx, health_rx) = watch::channel(SyncHealth::default());

    let coordinator = Coordinator {
        backoff: Backoff::new(config.backoff_base, config.backoff_cap),
        session,
        config,
        overlay,
        outcomes,
        snapshot_tx,
        state_tx,
        health_tx,
        generation: 0,
        last_fetch: None,
        account: None,
        cycle: None,
        follow_up: false,
        retry: None,
    };

    let task = tokio::spawn(coordinator.run(cmd_rx));

    CoordinatorChannels {
        commands: cmd_tx,
        snapshots: snapshot_rx,
        states: state_rx,
        health: health_rx,
        task,
    }
}

impl Coordinator {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SyncCommand>) {
        let mut wallet_rx = self.session.wallet().subscribe();
        let mut wallet_open = true;

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut housekeeping = tokio::time::interval(self.config.housekeeping);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_secs = self.config.poll_interval.as_secs(),
            concurrency = self.config.fetch_concurrency,
            "Sync coordinator started"
        );

        loop {
            tokio::select! {
                // --- Commands from the handle ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SyncCommand::Trigger(reason)) => self.request_cycle(reason),
                        Some(SyncCommand::Republish(ack)) => {
                            self.publish().await;
                            if let Some(ack) = ack {
                                let _ = ack.send(());
                            }
                        }
                        Some(SyncCommand::Cancel) => self.cancel_cycle(),
                        Some(SyncCommand::Shutdown) => {
                            info!("Sync coordinator shutdown requested");
                            break;
                        }
                        None => {
                            info!("Command channel closed, stopping sync coordinator");
                            break;
                        }
                    }
                }

                // --- Cycle in flight ---
                output = maybe(&mut self.cycle), if self.cycle.is_some() => {
                    self.cycle = None;
                    self.finish_cycle(output).await;
                }

                // --- Scheduled retry after a failed count fetch ---
                _ = maybe(&mut self.retry), if self.retry.is_some() => {
                    self.retry = None;
                    self.request_cycle(TriggerReason::Retry);
                }

                // --- Poll interval ---
                _ = poll.tick() => {
                    if self.retry.is_some() {
                        debug!("Poll tick during backoff, waiting for retry");
                    } else if self.cycle.is_none() {
                        self.request_cycle(TriggerReason::Poll);
                    }
                }

                // --- Overlay timeouts and eviction ---
                _ = housekeeping.tick() => {
                    self.housekeeping().await;
                }

                // --- Wallet changes ---
                event = wallet_rx.recv(), if wallet_open => {
                    match event {
                        Ok(event) => self.on_wallet_event(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Missed wallet events, resyncing");
                            self.force_resync();
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Wallet event stream closed");
                            wallet_open = false;
                        }
                    }
                }
            }
        }

        self.cycle = None;
        self.state_tx.send_replace(CycleState::Idle);
        info!("Sync coordinator stopped");
    }

    fn set_state(&self, state: CycleState) {
        self.state_tx.send_replace(state);
    }

    /// Start a cycle, or queue exactly one follow-up if one is in flight.
    fn request_cycle(&mut self, reason: TriggerReason) {
        if self.cycle.is_some() {
            if !self.follow_up {
                debug!(reason = ?reason, "Cycle in flight, follow-up queued");
            }
            self.follow_up = true;
            return;
        }
        self.start_cycle(reason);
    }

    fn start_cycle(&mut self, reason: TriggerReason) {
        debug!(reason = ?reason, "Sync cycle started");
        self.retry = None;
        self.set_state(CycleState::Fetching);

        let source = self.session.source().clone();
        let session = self.session.clone();
        let concurrency = self.config.fetch_concurrency;

        self.cycle = Some(
            async move {
                let (fetched, account) =
                    tokio::join!(fetch_records(source, concurrency), fetch_account(session));
                CycleOutput { fetched, account }
            }
            .boxed(),
        );
    }

    /// Drop the cycle in flight. Nothing is published.
    fn cancel_cycle(&mut self) {
        if self.cycle.take().is_some() {
            self.follow_up = false;
            self.set_state(CycleState::Idle);
            info!("Sync cycle cancelled");
        }
    }

    /// Abandon whatever is in flight and start over.
    fn force_resync(&mut self) {
        self.cycle = None;
        self.follow_up = false;
        self.start_cycle(TriggerReason::Wallet);
    }

    async fn finish_cycle(&mut self, output: CycleOutput) {
        match output.account {
            Ok(account) => self.account = account,
            Err(e) => warn!(error = %e, "Account profile fetch failed, keeping previous"),
        }

        match output.fetched {
            Ok(fetched) => {
                info!(
                    count = fetched.remote_count,
                    records = fetched.records.len(),
                    unavailable = fetched.unavailable.len(),
                    "Sync cycle fetched"
                );
                self.last_fetch = Some(fetched);
                self.backoff.reset();
                self.health_tx.send_replace(SyncHealth {
                    consecutive_failures: 0,
                    next_retry_in: None,
                    last_error: None,
                    last_success: Some(unix_now()),
                });

                self.set_state(CycleState::Deriving);
                self.publish().await;
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                let attempt = self.backoff.attempt();
                warn!(
                    error = %e,
                    attempt,
                    retry_ms = delay.as_millis() as u64,
                    "Sync cycle failed, keeping last snapshot"
                );
                self.health_tx.send_modify(|health| {
                    health.consecutive_failures = attempt;
                    health.next_retry_in = Some(delay);
                    health.last_error = Some(e.to_string());
                });
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
        }

        self.set_state(CycleState::Idle);

        // After a failure the queued follow-up rides on the scheduled retry.
        if std::mem::take(&mut self.follow_up) {
            if self.retry.is_some() {
                debug!("Follow-up deferred to scheduled retry");
            } else {
                self.start_cycle(TriggerReason::Manual);
            }
        }
    }

    /// Merge the last fetch with the overlay and publish a new snapshot.
    async fn publish(&mut self) {
        let fetched = self.last_fetch.clone().unwrap_or_default();
        let now = unix_now();

        let during_cycle = *self.state_tx.borrow() == CycleState::Deriving;
        if during_cycle {
            self.set_state(CycleState::Overlaying);
        }

        let (entries, account) = {
            let mut overlay = self.overlay.lock().await;
            overlay.reconcile(&fetched.records);
            (
                overlay.apply(fetched.records),
                overlay.apply_account(self.account.clone()),
            )
        };

        self.generation += 1;
        let snapshot = Snapshot::build(
            self.generation,
            now,
            entries,
            fetched.remote_count,
            fetched.unavailable,
            account,
        );

        debug!(
            generation = snapshot.generation,
            total = snapshot.total_count,
            active = snapshot.active_count,
            "Snapshot published"
        );

        self.snapshot_tx.send_replace(Arc::new(snapshot));

        if during_cycle {
            self.set_state(CycleState::Published);
        }
    }

    async fn housekeeping(&mut self) {
        let (outcomes, changed) = {
            let mut overlay = self.overlay.lock().await;
            let before = overlay.len();
            let outcomes = overlay.expire(Instant::now());
            let changed = !outcomes.is_empty() || overlay.len() != before;
            (outcomes, changed)
        };

        if changed {
            self.publish().await;
        }

        for outcome in outcomes {
            let _ = self.outcomes.send(outcome);
        }
    }

    fn on_wallet_event(&mut self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged(accounts) => {
                let next = accounts.into_iter().next();
                if next == self.session.address() {
                    return;
                }
                match &next {
                    Some(addr) => info!(account = %addr.short(), "Wallet account changed"),
                    None => info!("Wallet exposes no account"),
                }
                self.session.set_address(next);
                self.account = None;
            }
            WalletEvent::ChainChanged(chain) => {
                info!(chain = %chain, "Wallet network changed");
                self.session.set_chain_id(chain);
            }
            WalletEvent::Disconnected => {
                warn!("Wallet disconnected");
                self.session.set_address(None);
                self.account = None;
            }
        }
        self.force_resync();
    }
}
