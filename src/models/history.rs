use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::segment::{Segment, SegmentKind};

/// Snapshot of a segment at the moment it completed, in the same flat shape
/// as a stored segment. `startTimestamp` is always null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub total_duration: u64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub start_timestamp: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Returns `None` for segments that have not completed.
    pub fn from_completed(segment: &Segment) -> Option<Self> {
        Some(Self {
            kind: segment.kind(),
            total_duration: segment.total_duration(),
            duration: segment.duration(),
            start_timestamp: None,
            completed_at: segment.completed_at()?,
        })
    }
}

/// Keeps the first entry for every `completedAt`, preserving order.
pub fn dedup_history(entries: &[HistoryEntry]) -> Vec<HistoryEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|entry| seen.insert(entry.completed_at))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn pending_segment_has_no_entry() {
        assert!(HistoryEntry::from_completed(&Segment::focus(60)).is_none());
    }

    #[test]
    fn entry_serializes_as_finished_segment() {
        let at = Utc::now();
        let mut segment = Segment::break_of(300);
        segment.start(at - Duration::seconds(300));
        segment.complete(at);

        let entry = HistoryEntry::from_completed(&segment).unwrap();
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["type"], "break");
        assert_eq!(json["totalDuration"], 300);
        assert_eq!(json["duration"], 300);
        assert!(json["startTimestamp"].is_null());
        assert_eq!(
            serde_json::from_value::<HistoryEntry>(json).unwrap(),
            entry
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let t0 = Utc::now();
        let focus = HistoryEntry {
            kind: SegmentKind::Focus,
            total_duration: 1500,
            duration: 1500,
            start_timestamp: None,
            completed_at: t0,
        };
        let rest = HistoryEntry {
            kind: SegmentKind::Break,
            total_duration: 300,
            duration: 300,
            start_timestamp: None,
            completed_at: t0 + Duration::seconds(300),
        };

        let deduped = dedup_history(&[focus.clone(), focus.clone(), rest.clone(), focus.clone()]);

        assert_eq!(deduped, vec![focus, rest]);
    }
}
