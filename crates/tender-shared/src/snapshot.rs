use serde::{Deserialize, Serialize};

use crate::derive::{derive, DerivedState, Status};
use crate::types::{AccountProfile, Record, RecordId};

/// Marks an entry whose fields include an optimistic local effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMark {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub record: Record,
    pub derived: DerivedState,
    pub overlay: Option<OverlayMark>,
}

/// Immutable, time-consistent view of every tender.
///
/// Every entry was derived against `taken_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Increments on every publish; 0 means nothing was published yet.
    pub generation: u64,
    /// Unix seconds used for every derived state in this snapshot.
    pub taken_at: i64,
    pub entries: Vec<SnapshotEntry>,
    pub total_count: usize,
    /// Entries still accepting bids (active or ending soon).
    pub active_count: usize,
    /// Count reported by the ledger, materialized or not.
    pub remote_count: u64,
    /// Indices whose fetch failed on transport this cycle.
    pub unavailable: Vec<u64>,
    pub account: Option<AccountProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Ended,
    Finalized,
}

impl StatusFilter {
    pub fn matches(&self, status: Status) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status.is_open(),
            StatusFilter::Ended => status == Status::Ended,
            StatusFilter::Finalized => status == Status::Finalized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Soonest deadline first.
    Deadline,
    /// Most raised first.
    Raised,
    /// Most bids first.
    Bids,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            taken_at: 0,
            entries: Vec::new(),
            total_count: 0,
            active_count: 0,
            remote_count: 0,
            unavailable: Vec::new(),
            account: None,
        }
    }

    /// Derive every record against the same `now` and compute the totals.
    pub fn build(
        generation: u64,
        now: i64,
        records: Vec<(Record, Option<OverlayMark>)>,
        remote_count: u64,
        unavailable: Vec<u64>,
        account: Option<AccountProfile>,
    ) -> Self {
        let entries: Vec<SnapshotEntry> = records
            .into_iter()
            .map(|(record, overlay)| SnapshotEntry {
                derived: derive(&record, now),
                record,
                overlay,
            })
            .collect();

        let active_count = entries
            .iter()
            .filter(|e| e.derived.status.is_open())
            .count();

        Self {
            generation,
            taken_at: now,
            total_count: entries.len(),
            active_count,
            entries,
            remote_count,
            unavailable,
            account,
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.record.id == id)
    }

    pub fn is_partial(&self) -> bool {
        !self.unavailable.is_empty()
    }

    /// Entries passing `filter`, ordered by `sort` (ledger order if `None`).
    pub fn view(&self, filter: StatusFilter, sort: Option<SortKey>) -> Vec<&SnapshotEntry> {
        let mut out: Vec<&SnapshotEntry> = self
            .entries
            .iter()
            .filter(|e| filter.matches(e.derived.status))
            .collect();

        match sort {
            Some(SortKey::Deadline) => out.sort_by_key(|e| e.record.deadline),
            Some(SortKey::Raised) => out.sort_by(|a, b| b.record.raised.cmp(&a.record.raised)),
            Some(SortKey::Bids) => {
                out.sort_by(|a, b| b.record.bid_count.cmp(&a.record.bid_count))
            }
            None => {}
        }
        out
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
