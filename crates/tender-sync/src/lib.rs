// Tender read-model synchronizer: fetch, derive, overlay, publish.

pub mod backoff;
pub mod config;
pub mod coordinator;
pub mod handle;
pub mod overlay;

pub use backoff::Backoff;
pub use config::SyncConfig;
pub use coordinator::{CycleState, SyncHealth};
pub use handle::{SnapshotSubscription, SyncHandle};
pub use overlay::{ActionOutcome, ActionStatus, OptimisticOverlay, PendingAction};
