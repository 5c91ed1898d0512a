//! One-line renderings of snapshot entries for the log.

use tender_shared::{format_eth, Highlight, OverlayMark, Snapshot, SnapshotEntry};

fn badge(highlight: Option<Highlight>) -> &'static str {
    match highlight {
        Some(Highlight::Finalized) => " [finalized]",
        Some(Highlight::ManyBids) => " [popular]",
        Some(Highlight::AlmostFunded) => " [almost funded]",
        Some(Highlight::EndingSoon) => " [ending soon]",
        None => "",
    }
}

fn overlay_tag(mark: Option<OverlayMark>) -> &'static str {
    match mark {
        Some(OverlayMark::Pending) => " (pending)",
        Some(OverlayMark::Confirmed) => " (confirmed)",
        None => "",
    }
}

pub fn entry_line(entry: &SnapshotEntry) -> String {
    let record = &entry.record;
    let id = if record.id.is_placeholder() {
        "new".to_string()
    } else {
        format!("#{}", record.id)
    };

    format!(
        "{id} {title}: {raised} / {goal} ({pct}%), {bids} bids, {text}{badge}{overlay}",
        title = record.title,
        raised = format_eth(record.raised),
        goal = format_eth(record.goal),
        pct = entry.derived.progress_percent,
        bids = record.bid_count,
        text = entry.derived.time_remaining_text,
        badge = badge(entry.derived.highlight),
        overlay = overlay_tag(entry.overlay),
    )
}

pub fn summary_line(snapshot: &Snapshot) -> String {
    let mut line = format!(
        "{} tenders, {} open",
        snapshot.total_count, snapshot.active_count
    );
    if snapshot.is_partial() {
        let missing: Vec<String> = snapshot.unavailable.iter().map(u64::to_string).collect();
        line.push_str(&format!(", unavailable: {}", missing.join(",")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_shared::{Address, Record, RecordId};

    fn entry(id: i64, raised: u128, bid_count: u64, overlay: Option<OverlayMark>) -> SnapshotEntry {
        let record = Record {
            id: RecordId(id),
            title: "Roof".into(),
            description: "Replace tiles".into(),
            goal: 10_000_000_000_000_000_000,
            deadline: 1_000 + 3 * 86_400,
            organizer: Address::default(),
            finalized: false,
            raised,
            bid_count,
        };
        let snapshot = Snapshot::build(1, 1_000, vec![(record, overlay)], 1, vec![], None);
        snapshot.entries[0].clone()
    }

    #[test]
    fn test_entry_line() {
        let line = entry_line(&entry(4, 8_500_000_000_000_000_000, 2, None));
        assert_eq!(
            line,
            "#4 Roof: 8.50 ETH / 10.00 ETH (85%), 2 bids, 3 days left [almost funded]"
        );
    }

    #[test]
    fn test_placeholder_entry_line() {
        let line = entry_line(&entry(-1, 0, 0, Some(OverlayMark::Pending)));
        assert!(line.starts_with("new Roof:"));
        assert!(line.ends_with("(pending)"));
    }

    #[test]
    fn test_summary_marks_partial() {
        let mut snapshot = Snapshot::empty();
        snapshot.total_count = 4;
        snapshot.active_count = 3;
        assert_eq!(summary_line(&snapshot), "4 tenders, 3 open");
        snapshot.unavailable = vec![3, 7];
        assert_eq!(summary_line(&snapshot), "4 tenders, 3 open, unavailable: 3,7");
    }
}
