//! Optimistic overlay of in-flight local actions.
//!
//! Every dispatched action is registered here with the effect it should have
//! on its target record. Until the ledger shows that effect (or the action
//! fails) the effect is merged over fetched records, so the published
//! snapshot already looks the way it will after confirmation.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use tender_shared::{
    AccountProfile, ActionId, ActionKind, OverlayMark, Record, RecordId, RecordPatch, Result,
    SyncError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Confirmed,
    Failed(SyncError),
}

impl ActionStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }
}

/// Terminal result of a dispatched action, broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Confirmed(ActionId),
    Failed { id: ActionId, reason: SyncError },
}

impl ActionOutcome {
    pub fn id(&self) -> ActionId {
        match self {
            ActionOutcome::Confirmed(id) => *id,
            ActionOutcome::Failed { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub target_id: Option<RecordId>,
    pub submitted_at: Instant,
    pub expected_effect: RecordPatch,
    pub status: ActionStatus,
    /// When the action was confirmed or failed.
    pub settled_at: Option<Instant>,
    /// The ledger already shows the expected effect.
    pub reflected: bool,
    /// Remote count at registration. A created record lands above it.
    baseline_count: u64,
    placeholder_id: Option<RecordId>,
}

impl PendingAction {
    pub fn new(
        kind: ActionKind,
        target_id: Option<RecordId>,
        expected_effect: RecordPatch,
        submitted_at: Instant,
    ) -> Self {
        Self {
            id: ActionId::new(),
            kind,
            target_id,
            submitted_at,
            expected_effect,
            status: ActionStatus::Pending,
            settled_at: None,
            reflected: false,
            baseline_count: 0,
            placeholder_id: None,
        }
    }

    /// Remote count at the time of registration, used to find the record a
    /// create produced.
    pub fn with_baseline(mut self, remote_count: u64) -> Self {
        self.baseline_count = remote_count;
        self
    }

    pub fn placeholder_id(&self) -> Option<RecordId> {
        self.placeholder_id
    }

    fn is_create(&self) -> bool {
        self.kind == ActionKind::CreateRecord && self.target_id.is_none()
    }

    /// Overlaid onto published records.
    fn is_live(&self) -> bool {
        !self.reflected && !matches!(self.status, ActionStatus::Failed(_))
    }

    fn mark(&self) -> OverlayMark {
        match self.status {
            ActionStatus::Pending => OverlayMark::Pending,
            _ => OverlayMark::Confirmed,
        }
    }

    /// A create is reflected by a fresh record carrying the same content.
    /// The deadline is set by the ledger's clock, so it is not compared.
    fn create_matches(&self, record: &Record) -> bool {
        let patch = RecordPatch {
            deadline: None,
            raised: None,
            bid_count: None,
            finalized: None,
            ..self.expected_effect.clone()
        };
        record.id.index().is_some_and(|i| i > self.baseline_count) && patch.is_reflected_in(record)
    }
}

#[derive(Debug)]
pub struct OptimisticOverlay {
    actions: Vec<PendingAction>,
    timeout: Duration,
    grace: Duration,
    next_placeholder: i64,
}

impl OptimisticOverlay {
    pub fn new(timeout: Duration, grace: Duration) -> Self {
        Self {
            actions: Vec::new(),
            timeout,
            grace,
            next_placeholder: -1,
        }
    }

    /// Insert `action` as Pending.
    ///
    /// Fails with `DuplicateAction` while another action of the same kind on
    /// the same target is still pending.
    pub fn register(&mut self, mut action: PendingAction) -> Result<ActionId> {
        self.ensure_unique(action.kind, action.target_id)?;

        action.status = ActionStatus::Pending;
        if action.is_create() {
            action.placeholder_id = Some(RecordId(self.next_placeholder));
            self.next_placeholder -= 1;
        }

        debug!(
            action = %action.id,
            kind = %action.kind,
            target = ?action.target_id,
            "Action registered"
        );

        let id = action.id;
        self.actions.push(action);
        Ok(id)
    }

    /// `DuplicateAction` if an action of `kind` on `target` is pending.
    pub fn ensure_unique(&self, kind: ActionKind, target: Option<RecordId>) -> Result<()> {
        let duplicate = self
            .actions
            .iter()
            .any(|a| a.status == ActionStatus::Pending && a.kind == kind && a.target_id == target);
        if duplicate {
            return Err(SyncError::DuplicateAction { kind, target });
        }
        Ok(())
    }

    /// Pending -> Confirmed. Returns `false` if the action is unknown or
    /// already settled.
    pub fn confirm(&mut self, id: ActionId, now: Instant) -> bool {
        match self.find_pending(id) {
            Some(action) => {
                action.status = ActionStatus::Confirmed;
                action.settled_at = Some(now);
                info!(action = %id, kind = %action.kind, "Action confirmed");
                true
            }
            None => false,
        }
    }

    /// Pending -> Failed. Returns `false` if the action is unknown or
    /// already settled.
    pub fn fail(&mut self, id: ActionId, reason: SyncError, now: Instant) -> bool {
        match self.find_pending(id) {
            Some(action) => {
                warn!(action = %id, kind = %action.kind, reason = %reason, "Action failed");
                action.status = ActionStatus::Failed(reason);
                action.settled_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Time out stale pending actions and evict settled ones whose grace
    /// window has passed. Returns the outcomes of the timed-out actions.
    pub fn expire(&mut self, now: Instant) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();

        for action in &mut self.actions {
            if action.status == ActionStatus::Pending
                && now.duration_since(action.submitted_at) >= self.timeout
            {
                warn!(action = %action.id, kind = %action.kind, "Action timed out");
                action.status = ActionStatus::Failed(SyncError::Timeout);
                action.settled_at = Some(now);
                outcomes.push(ActionOutcome::Failed {
                    id: action.id,
                    reason: SyncError::Timeout,
                });
            }
        }

        let grace = self.grace;
        self.actions.retain(|a| match a.settled_at {
            Some(at) if now.duration_since(at) >= grace => {
                debug!(action = %a.id, "Settled action evicted");
                false
            }
            _ => true,
        });

        outcomes
    }

    /// Compare live actions against freshly fetched records. Confirmed
    /// actions the ledger already reflects are dropped; pending ones stop
    /// being overlaid but stay registered until their receipt arrives.
    pub fn reconcile(&mut self, records: &[Record]) {
        let mut claimed: HashSet<RecordId> = HashSet::new();

        for action in &mut self.actions {
            if !action.is_live() {
                continue;
            }

            let reflected = match action.target_id {
                Some(target) => records
                    .iter()
                    .find(|r| r.id == target)
                    .is_some_and(|r| action.expected_effect.is_reflected_in(r)),
                None if action.is_create() => {
                    match records
                        .iter()
                        .find(|r| !claimed.contains(&r.id) && action.create_matches(r))
                    {
                        Some(r) => {
                            claimed.insert(r.id);
                            true
                        }
                        None => false,
                    }
                }
                None => false,
            };

            if reflected {
                debug!(action = %action.id, kind = %action.kind, "Effect visible on ledger");
                action.reflected = true;
            }
        }

        self.actions
            .retain(|a| !(a.reflected && a.status == ActionStatus::Confirmed));
    }

    /// Merge live effects over `records` and append placeholders for creates
    /// not yet on the ledger.
    pub fn apply(&self, records: Vec<Record>) -> Vec<(Record, Option<OverlayMark>)> {
        let mut out: Vec<(Record, Option<OverlayMark>)> = records
            .into_iter()
            .map(|mut record| {
                let mut mark = None;
                let id = record.id;
                for action in self.live().filter(|a| a.target_id == Some(id)) {
                    action.expected_effect.apply_to(&mut record);
                    mark = Some(match (mark, action.mark()) {
                        (Some(OverlayMark::Pending), _) | (_, OverlayMark::Pending) => {
                            OverlayMark::Pending
                        }
                        _ => OverlayMark::Confirmed,
                    });
                }
                (record, mark)
            })
            .collect();

        for action in self.live().filter(|a| a.is_create()) {
            if let Some(id) = action.placeholder_id {
                out.push((action.expected_effect.to_placeholder(id), Some(action.mark())));
            }
        }

        out
    }

    /// A live subscription purchase shows as an active subscription.
    pub fn apply_account(&self, profile: Option<AccountProfile>) -> Option<AccountProfile> {
        let mut profile = profile?;
        if self.live().any(|a| a.kind == ActionKind::BuySubscription) {
            profile.has_subscription = true;
        }
        Some(profile)
    }

    pub fn get(&self, id: ActionId) -> Option<&PendingAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn status(&self, id: ActionId) -> Option<ActionStatus> {
        self.get(id).map(|a| a.status.clone())
    }

    pub fn is_pending(&self, id: ActionId) -> bool {
        self.status(id) == Some(ActionStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Pending)
            .count()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn live(&self) -> impl Iterator<Item = &PendingAction> {
        self.actions.iter().filter(|a| a.is_live())
    }

    fn find_pending(&mut self, id: ActionId) -> Option<&mut PendingAction> {
        self.actions
            .iter_mut()
            .find(|a| a.id == id && a.status == ActionStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_shared::{Address, Role};

    const TIMEOUT: Duration = Duration::from_secs(120);
    const GRACE: Duration = Duration::from_secs(10);

    fn organizer() -> Address {
        Address::parse("0x00000000000000000000000000000000000000aa").unwrap()
    }

    fn record(index: u64, bid_count: u64) -> Record {
        Record {
            id: RecordId::from_index(index),
            title: format!("Tender {index}"),
            description: "Road works".into(),
            goal: 10,
            deadline: 2_000_000_000,
            organizer: organizer(),
            finalized: false,
            raised: 0,
            bid_count,
        }
    }

    fn bid_on(index: u64, expected_count: u64, now: Instant) -> PendingAction {
        PendingAction::new(
            ActionKind::SubmitBid,
            Some(RecordId::from_index(index)),
            RecordPatch {
                bid_count: Some(expected_count),
                ..Default::default()
            },
            now,
        )
    }

    fn create(title: &str, baseline: u64, now: Instant) -> PendingAction {
        PendingAction::new(
            ActionKind::CreateRecord,
            None,
            RecordPatch {
                title: Some(title.into()),
                description: Some("Road works".into()),
                goal: Some(10),
                deadline: Some(1_900_000_000),
                organizer: Some(organizer()),
                finalized: Some(false),
                raised: Some(0),
                bid_count: Some(0),
                raised_from: None,
            },
            now,
        )
        .with_baseline(baseline)
    }

    #[test]
    fn test_duplicate_pending_action_rejected() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);

        let first = overlay.register(bid_on(5, 1, now)).unwrap();
        let err = overlay.register(bid_on(5, 1, now)).unwrap_err();

        assert_eq!(
            err,
            SyncError::DuplicateAction {
                kind: ActionKind::SubmitBid,
                target: Some(RecordId(5)),
            }
        );
        assert!(overlay.is_pending(first));
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_same_kind_allowed_after_settlement_and_on_other_targets() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);

        let first = overlay.register(bid_on(5, 1, now)).unwrap();
        overlay.register(bid_on(6, 1, now)).unwrap();
        assert!(overlay.confirm(first, now));
        overlay.register(bid_on(5, 2, now)).unwrap();
        assert_eq!(overlay.pending_count(), 2);
    }

    #[test]
    fn test_pending_effect_overlaid() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        overlay.register(bid_on(2, 4, now)).unwrap();

        let merged = overlay.apply(vec![record(1, 0), record(2, 3)]);
        assert_eq!(merged[0], (record(1, 0), None));
        assert_eq!(merged[1].0.bid_count, 4);
        assert_eq!(merged[1].1, Some(OverlayMark::Pending));
    }

    #[test]
    fn test_timed_out_action_fails_and_is_not_overlaid() {
        let start = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        let id = overlay.register(bid_on(2, 4, start)).unwrap();

        assert!(overlay.expire(start + Duration::from_secs(60)).is_empty());

        let outcomes = overlay.expire(start + TIMEOUT);
        assert_eq!(
            outcomes,
            vec![ActionOutcome::Failed {
                id,
                reason: SyncError::Timeout
            }]
        );
        assert_eq!(overlay.status(id), Some(ActionStatus::Failed(SyncError::Timeout)));

        let merged = overlay.apply(vec![record(2, 3)]);
        assert_eq!(merged[0], (record(2, 3), None));
    }

    #[test]
    fn test_failed_action_never_overlaid() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        let id = overlay.register(bid_on(2, 4, now)).unwrap();
        assert!(overlay.fail(id, SyncError::ActionRejected("Bidding closed".into()), now));
        assert!(!overlay.confirm(id, now));

        assert_eq!(overlay.apply(vec![record(2, 3)])[0].1, None);
    }

    #[test]
    fn test_confirmed_effect_kept_until_grace() {
        let start = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        let id = overlay.register(bid_on(2, 4, start)).unwrap();
        overlay.confirm(id, start);

        // Ledger still stale.
        overlay.reconcile(&[record(2, 3)]);
        let merged = overlay.apply(vec![record(2, 3)]);
        assert_eq!(merged[0].0.bid_count, 4);
        assert_eq!(merged[0].1, Some(OverlayMark::Confirmed));

        overlay.expire(start + GRACE);
        assert!(overlay.is_empty());
        assert_eq!(overlay.apply(vec![record(2, 3)])[0].1, None);
    }

    #[test]
    fn test_confirmed_effect_dropped_once_reflected() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        let id = overlay.register(bid_on(2, 4, now)).unwrap();
        overlay.confirm(id, now);

        // Another bid landed too; the count is past what we expected.
        overlay.reconcile(&[record(2, 5)]);
        assert!(overlay.get(id).is_none());
    }

    #[test]
    fn test_reflected_pending_action_stays_registered_but_not_overlaid() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        let id = overlay.register(bid_on(2, 4, now)).unwrap();

        overlay.reconcile(&[record(2, 4)]);
        assert!(overlay.is_pending(id));
        assert_eq!(overlay.apply(vec![record(2, 4)])[0].1, None);
    }

    #[test]
    fn test_create_appends_placeholder_until_fetched() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        let id = overlay.register(create("Bridge", 2, now)).unwrap();
        let placeholder = overlay.get(id).unwrap().placeholder_id().unwrap();
        assert!(placeholder.is_placeholder());

        let merged = overlay.apply(vec![record(1, 0), record(2, 0)]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2].0.id, placeholder);
        assert_eq!(merged[2].0.title, "Bridge");
        assert_eq!(merged[2].1, Some(OverlayMark::Pending));

        // A record with the same title below the baseline is not ours.
        let mut old = record(2, 0);
        old.title = "Bridge".into();
        overlay.reconcile(&[record(1, 0), old.clone()]);
        assert_eq!(overlay.apply(vec![record(1, 0), old.clone()]).len(), 3);

        overlay.confirm(id, now);
        let mut landed = record(3, 0);
        landed.title = "Bridge".into();
        landed.deadline = 1_900_000_042;
        let fetched = vec![record(1, 0), old, landed];
        overlay.reconcile(&fetched);

        assert!(overlay.is_empty());
        let merged = overlay.apply(fetched);
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|(r, _)| !r.id.is_placeholder()));
    }

    #[test]
    fn test_placeholders_get_distinct_ids() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        let a = overlay.register(create("A", 0, now)).unwrap();
        overlay.confirm(a, now);
        let b = overlay.register(create("B", 0, now)).unwrap();

        let pa = overlay.get(a).unwrap().placeholder_id().unwrap();
        let pb = overlay.get(b).unwrap().placeholder_id().unwrap();
        assert_ne!(pa, pb);
    }

    #[test]
    fn test_subscription_purchase_overlays_account() {
        let now = Instant::now();
        let mut overlay = OptimisticOverlay::new(TIMEOUT, GRACE);
        overlay
            .register(PendingAction::new(
                ActionKind::BuySubscription,
                None,
                RecordPatch::default(),
                now,
            ))
            .unwrap();

        let profile = AccountProfile {
            address: organizer(),
            role: Role::User,
            has_subscription: false,
        };
        let shown = overlay.apply_account(Some(profile)).unwrap();
        assert!(shown.has_subscription);
        assert_eq!(overlay.apply_account(None), None);
    }
}
