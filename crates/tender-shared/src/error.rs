use thiserror::Error;

use crate::types::{ActionKind, RecordId};

/// Every failure the synchronizer can surface.
///
/// Fetch-level variants (`Transport`, `NotFound`) are contained per index by
/// the coordinator. Action-level variants always reach the dispatching caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Endpoint unreachable or the gateway answered with garbage.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Index outside `1..=count`, or the remote has no such record.
    #[error("Record {0} not found")]
    NotFound(u64),

    /// An identical `(kind, target)` action is still pending.
    #[error("A {kind} action for {} is already pending", target_label(.target))]
    DuplicateAction {
        kind: ActionKind,
        target: Option<RecordId>,
    },

    /// The ledger refused the action. The reason is kept verbatim.
    #[error("Action rejected: {0}")]
    ActionRejected(String),

    /// No confirmation or rejection arrived within the action timeout.
    #[error("Timed out waiting for confirmation")]
    Timeout,

    /// The content-pinning service failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Local precondition on the action payload failed.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No wallet session is connected.
    #[error("Wallet not connected")]
    Disconnected,
}

fn target_label(target: &Option<RecordId>) -> String {
    match target {
        Some(id) => format!("tender {id}"),
        None => "a new tender".to_string(),
    }
}

impl SyncError {
    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SyncError>;
