// Domain model shared by the tender transport and synchronizer crates.

pub mod action;
pub mod constants;
pub mod derive;
pub mod error;
pub mod snapshot;
pub mod types;

pub use action::{ActionRequest, AdminOp, Attachment, ContractCall};
pub use derive::{derive, progress_percent, DerivedState, Highlight, Status};
pub use error::{Result, SyncError};
pub use snapshot::{OverlayMark, Snapshot, SnapshotEntry, SortKey, StatusFilter};
pub use types::*;
