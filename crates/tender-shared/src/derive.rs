//! Display state derived from a record and the current time.
//!
//! Everything here is pure: no I/O, no clocks. Callers pass `now` so that a
//! whole snapshot can be derived against one instant.

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALMOST_FUNDED_PERCENT, MANY_BIDS_THRESHOLD, SECONDS_PER_DAY, SECONDS_PER_HOUR,
};
use crate::types::{Address, Record};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    EndingSoon,
    Ended,
    Finalized,
}

impl Status {
    /// Still accepting bids.
    pub fn is_open(&self) -> bool {
        matches!(self, Status::Active | Status::EndingSoon)
    }
}

/// Badge shown next to a tender's title.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Highlight {
    Finalized,
    ManyBids,
    AlmostFunded,
    EndingSoon,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DerivedState {
    pub status: Status,
    pub time_remaining_text: String,
    pub progress_percent: u8,
    pub highlight: Option<Highlight>,
}

/// Derive the display state of `record` at unix time `now`.
///
/// Rules are checked in order and the first match wins: finalized, past the
/// deadline, under a day left, otherwise active.
pub fn derive(record: &Record, now: i64) -> DerivedState {
    let remaining = record.deadline.saturating_sub(now);

    let (status, time_remaining_text) = if record.finalized {
        (Status::Finalized, "Winner Selected".to_string())
    } else if now >= record.deadline {
        (Status::Ended, "Ready to Finalize".to_string())
    } else if remaining < SECONDS_PER_DAY {
        (
            Status::EndingSoon,
            format!("{} hours left", remaining / SECONDS_PER_HOUR),
        )
    } else {
        (
            Status::Active,
            format!("{} days left", remaining / SECONDS_PER_DAY),
        )
    };

    let progress = progress_percent(record.raised, record.goal);

    DerivedState {
        status,
        time_remaining_text,
        progress_percent: progress,
        highlight: highlight(status, record.bid_count, progress),
    }
}

/// `min(100, floor(100 * numerator / denominator))`, or 0 without a goal.
pub fn progress_percent(numerator: u128, denominator: u128) -> u8 {
    if denominator == 0 {
        return 0;
    }
    let percent = numerator.saturating_mul(100) / denominator;
    percent.min(100) as u8
}

fn highlight(status: Status, bid_count: u64, progress: u8) -> Option<Highlight> {
    match status {
        Status::Finalized => Some(Highlight::Finalized),
        Status::Ended => None,
        _ if bid_count > MANY_BIDS_THRESHOLD => Some(Highlight::ManyBids),
        _ if progress >= ALMOST_FUNDED_PERCENT => Some(Highlight::AlmostFunded),
        Status::EndingSoon => Some(Highlight::EndingSoon),
        Status::Active => None,
    }
}

/// Bids are accepted until the deadline, unless finalized early.
pub fn can_bid(record: &Record, now: i64) -> bool {
    !record.finalized && now < record.deadline
}

/// Only the organizer finalizes, and only once the deadline has passed.
pub fn can_finalize(record: &Record, who: &Address, now: i64) -> bool {
    !record.finalized && now >= record.deadline && record.organizer == *who
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    const NOW: i64 = 1_700_000_000;

    fn organizer() -> Address {
        Address::parse("0x00000000000000000000000000000000000000aa").unwrap()
    }

    fn record(deadline: i64, finalized: bool, goal: u128, raised: u128) -> Record {
        Record {
            id: RecordId(1),
            title: "Tender".into(),
            description: String::new(),
            goal,
            deadline,
            organizer: organizer(),
            finalized,
            raised,
            bid_count: 0,
        }
    }

    #[test]
    fn test_extreme_deadlines_do_not_overflow() {
        let past = derive(&record(i64::MIN, false, 10, 0), NOW);
        assert_eq!(past.status, Status::Ended);

        let far = derive(&record(i64::MAX, false, 10, 0), -NOW);
        assert_eq!(far.status, Status::Active);
        assert!(far.time_remaining_text.ends_with("days left"));
    }

    #[test]
    fn test_ending_soon_example() {
        let state = derive(&record(NOW + 3_600, false, 10, 8), NOW);
        assert_eq!(state.status, Status::EndingSoon);
        assert_eq!(state.time_remaining_text, "1 hours left");
        assert_eq!(state.progress_percent, 80);
        assert_eq!(state.highlight, Some(Highlight::AlmostFunded));
    }

    #[test]
    fn test_finalized_wins_regardless_of_time() {
        for now in [NOW - 10 * SECONDS_PER_DAY, NOW, NOW + 10 * SECONDS_PER_DAY] {
            let state = derive(&record(NOW, true, 10, 0), now);
            assert_eq!(state.status, Status::Finalized);
            assert_eq!(state.time_remaining_text, "Winner Selected");
        }
    }

    #[test]
    fn test_before_deadline_is_never_ended() {
        let deadline = NOW + 3 * SECONDS_PER_DAY;
        for offset in [1, 59, 3_599, 3_600, SECONDS_PER_DAY - 1, SECONDS_PER_DAY, 2 * SECONDS_PER_DAY] {
            let state = derive(&record(deadline, false, 10, 0), deadline - offset);
            assert!(state.status.is_open(), "offset {offset} gave {:?}", state.status);
        }
    }

    #[test]
    fn test_deadline_boundary_is_ended() {
        let state = derive(&record(NOW, false, 10, 0), NOW);
        assert_eq!(state.status, Status::Ended);
        assert_eq!(state.time_remaining_text, "Ready to Finalize");
        assert_eq!(state.highlight, None);
    }

    #[test]
    fn test_days_are_floored() {
        let state = derive(&record(NOW + 2 * SECONDS_PER_DAY + 23 * 3_600, false, 10, 0), NOW);
        assert_eq!(state.status, Status::Active);
        assert_eq!(state.time_remaining_text, "2 days left");
    }

    #[test]
    fn test_exactly_one_day_is_active() {
        let state = derive(&record(NOW + SECONDS_PER_DAY, false, 10, 0), NOW);
        assert_eq!(state.status, Status::Active);
        assert_eq!(state.time_remaining_text, "1 days left");
    }

    #[test]
    fn test_progress_bounds_and_monotonicity() {
        let goal = 7u128;
        let mut last = 0;
        for raised in 0..30u128 {
            let p = progress_percent(raised, goal);
            assert!(p <= 100);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(progress_percent(5, 0), 0);
        assert_eq!(progress_percent(u128::MAX, 1), 100);
    }

    #[test]
    fn test_many_bids_highlight() {
        let mut r = record(NOW + 5 * SECONDS_PER_DAY, false, 10, 0);
        r.bid_count = 6;
        assert_eq!(derive(&r, NOW).highlight, Some(Highlight::ManyBids));
        r.bid_count = 5;
        assert_eq!(derive(&r, NOW).highlight, None);
    }

    #[test]
    fn test_permissions() {
        let other = Address::parse("0x00000000000000000000000000000000000000bb").unwrap();
        let r = record(NOW, false, 10, 0);
        assert!(can_bid(&r, NOW - 1));
        assert!(!can_bid(&r, NOW));
        assert!(can_finalize(&r, &organizer(), NOW));
        assert!(!can_finalize(&r, &other, NOW));
        assert!(!can_finalize(&r, &organizer(), NOW - 1));
    }
}
