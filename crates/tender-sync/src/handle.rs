//! Public face of the synchronizer.
//!
//! A [`SyncHandle`] owns the coordinator task and the overlay. Readers get
//! the latest snapshot without blocking; writers go through
//! [`SyncHandle::dispatch_action`], which registers the optimistic effect,
//! submits through the wallet and watches for the receipt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tender_net::{ReceiptStatus, Session, TxHandle};
use tender_shared::{
    ActionId, ActionRequest, Bid, PinnedContent, RecordId, Result, Snapshot, SyncError,
};

use crate::config::SyncConfig;
use crate::coordinator::{
    spawn_coordinator, unix_now, CycleState, SyncCommand, SyncHealth, TriggerReason,
};
use crate::overlay::{ActionOutcome, ActionStatus, OptimisticOverlay, PendingAction};

/// State shared between the handle and its receipt watchers.
#[derive(Clone)]
struct ActionContext {
    session: Session,
    overlay: Arc<Mutex<OptimisticOverlay>>,
    outcomes: broadcast::Sender<ActionOutcome>,
    commands: mpsc::Sender<SyncCommand>,
    receipt_poll: Duration,
}

impl ActionContext {
    /// Ask the coordinator for a fresh snapshot and wait until it is out.
    async fn republish(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .commands
            .send(SyncCommand::Republish(Some(ack_tx)))
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    fn request_cycle(&self, reason: TriggerReason) {
        if let Err(e) = self.commands.try_send(SyncCommand::Trigger(reason)) {
            debug!(error = %e, "Trigger dropped");
        }
    }

    /// Record the terminal state of `id` and tell everyone. A no-op if the
    /// action already settled (e.g. it timed out first).
    async fn settle(&self, id: ActionId, result: std::result::Result<(), SyncError>) {
        let outcome = {
            let mut overlay = self.overlay.lock().await;
            match result {
                Ok(()) => overlay
                    .confirm(id, Instant::now())
                    .then_some(ActionOutcome::Confirmed(id)),
                Err(reason) => overlay
                    .fail(id, reason.clone(), Instant::now())
                    .then_some(ActionOutcome::Failed { id, reason }),
            }
        };

        if let Some(outcome) = outcome {
            self.republish().await;
            let _ = self.outcomes.send(outcome);
            self.request_cycle(TriggerReason::ActionSettled);
        }
    }
}

/// Stops delivering snapshots when dropped.
pub struct SnapshotSubscription {
    task: JoinHandle<()>,
}

impl SnapshotSubscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SnapshotSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct SyncHandle {
    ctx: ActionContext,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    states: watch::Receiver<CycleState>,
    health: watch::Receiver<SyncHealth>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncHandle {
    /// Spawn a coordinator for `session`. The first cycle starts right away.
    pub fn spawn(session: Session, config: SyncConfig) -> Self {
        let overlay = Arc::new(Mutex::new(OptimisticOverlay::new(
            config.action_timeout,
            config.confirm_grace,
        )));
        let (outcomes, _) = broadcast::channel(64);
        let receipt_poll = config.receipt_poll;

        let channels = spawn_coordinator(session.clone(), config, overlay.clone(), outcomes.clone());

        Self {
            ctx: ActionContext {
                session,
                overlay,
                outcomes,
                commands: channels.commands,
                receipt_poll,
            },
            snapshots: channels.snapshots,
            states: channels.states,
            health: channels.health,
            task: std::sync::Mutex::new(Some(channels.task)),
        }
    }

    /// Latest published snapshot. Never blocks on I/O.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.borrow().clone()
    }

    /// Call `callback` with every snapshot published from now on.
    ///
    /// Snapshots published faster than the callback runs are skipped; the
    /// callback always sees the newest one.
    pub fn subscribe<F>(&self, mut callback: F) -> SnapshotSubscription
    where
        F: FnMut(Arc<Snapshot>) + Send + 'static,
    {
        let mut rx = self.snapshots.clone();
        rx.borrow_and_update();

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                callback(snapshot);
            }
        });

        SnapshotSubscription { task }
    }

    /// Watch channel over snapshots, for callers that prefer polling.
    pub fn watch_snapshots(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    pub fn cycle_state(&self) -> CycleState {
        *self.states.borrow()
    }

    pub fn watch_cycle_state(&self) -> watch::Receiver<CycleState> {
        self.states.clone()
    }

    pub fn health(&self) -> SyncHealth {
        self.health.borrow().clone()
    }

    /// Terminal outcomes of actions that settle after `dispatch_action`
    /// returned.
    pub fn action_outcomes(&self) -> broadcast::Receiver<ActionOutcome> {
        self.ctx.outcomes.subscribe()
    }

    pub async fn action_status(&self, id: ActionId) -> Option<ActionStatus> {
        self.ctx.overlay.lock().await.status(id)
    }

    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    /// Request a cycle. Coalesces with a cycle already in flight.
    pub fn trigger(&self) {
        self.ctx.request_cycle(TriggerReason::Manual);
    }

    /// Abort the cycle in flight without publishing.
    pub async fn cancel(&self) {
        if self.ctx.commands.send(SyncCommand::Cancel).await.is_err() {
            debug!("Coordinator already stopped");
        }
    }

    /// Every bid on a tender, straight from the ledger.
    pub async fn bids(&self, id: RecordId) -> Result<Vec<Bid>> {
        Ok(self.ctx.session.source().fetch_bids(id).await?)
    }

    /// Current subscription price in wei.
    pub async fn subscription_price(&self) -> Result<u128> {
        Ok(self.ctx.session.source().fetch_subscription_price().await?)
    }

    /// Validate, pin, register, submit.
    ///
    /// Returns once the transaction is submitted; confirmation or failure
    /// after that point arrives on [`SyncHandle::action_outcomes`]. Errors
    /// returned here are not broadcast.
    pub async fn dispatch_action(&self, request: ActionRequest) -> Result<ActionId> {
        request.validate()?;

        let from = self.ctx.session.require_address()?;
        let kind = request.kind();
        let target = request.target();

        self.ctx.overlay.lock().await.ensure_unique(kind, target)?;

        let content = self.pin_attachment(&request).await?;

        let snapshot = self.snapshot();
        let current = target.and_then(|id| snapshot.get(id)).map(|e| &e.record);
        let effect = request.expected_effect(current, &from, unix_now());
        let action = PendingAction::new(kind, target, effect, Instant::now())
            .with_baseline(snapshot.remote_count);

        let id = self.ctx.overlay.lock().await.register(action)?;
        info!(action = %id, kind = %kind, target = ?target, "Action dispatched");
        self.ctx.republish().await;

        let call = request.contract_call(content.as_ref());
        let tx = match self.ctx.session.submitter().submit(&from, &call).await {
            Ok(tx) => tx,
            Err(e) => {
                let reason = SyncError::from(e);
                self.ctx
                    .overlay
                    .lock()
                    .await
                    .fail(id, reason.clone(), Instant::now());
                self.ctx.republish().await;
                return Err(reason);
            }
        };

        tokio::spawn(watch_receipt(self.ctx.clone(), id, tx));
        Ok(id)
    }

    async fn pin_attachment(&self, request: &ActionRequest) -> Result<Option<PinnedContent>> {
        let Some(attachment) = request.attachment() else {
            return Ok(None);
        };
        let pinner = self
            .ctx
            .session
            .pinner()
            .ok_or_else(|| SyncError::Upload("pinning is not configured".to_string()))?;
        let content = pinner.pin(&attachment.name, &attachment.bytes).await?;
        Ok(Some(content))
    }

    /// Stop the coordinator and close the session.
    pub async fn shutdown(&self) {
        let _ = self.ctx.commands.send(SyncCommand::Shutdown).await;

        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync coordinator task ended abnormally");
            }
        }

        self.ctx.session.close();
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

/// Poll the receipt of `tx` until it lands, the action settles some other
/// way, or the coordinator stops.
async fn watch_receipt(ctx: ActionContext, id: ActionId, tx: TxHandle) {
    let mut tick = tokio::time::interval(ctx.receipt_poll);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;

    debug!(action = %id, tx = %tx, "Watching receipt");

    loop {
        tick.tick().await;

        if ctx.commands.is_closed() || !ctx.overlay.lock().await.is_pending(id) {
            debug!(action = %id, "Receipt watch ended");
            return;
        }

        match ctx.session.submitter().receipt(&tx).await {
            Ok(None) => continue,
            Ok(Some(receipt)) => {
                let result = match receipt.status {
                    ReceiptStatus::Success => Ok(()),
                    ReceiptStatus::Reverted(reason) => Err(SyncError::ActionRejected(reason)),
                };
                ctx.settle(id, result).await;
                return;
            }
            Err(e) => debug!(action = %id, error = %e, "Receipt poll failed, retrying"),
        }
    }
}
