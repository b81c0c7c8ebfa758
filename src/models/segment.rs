//! Focus/break segments and their progress.
//!
//! In memory a segment's progress is a [`SegmentProgress`] variant; on the
//! wire it is the flat `duration` / `startTimestamp` / `completedAt` triple
//! described by [`SegmentRecord`].

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_secs;
use crate::scheduler::SchedulerError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Focus,
    Break,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Focus => "focus",
            SegmentKind::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentProgress {
    Pending,
    Running {
        since: DateTime<Utc>,
        accumulated: u64,
    },
    Paused {
        accumulated: u64,
    },
    Completed {
        at: DateTime<Utc>,
        accumulated: u64,
    },
}

impl SegmentProgress {
    fn idle(accumulated: u64) -> Self {
        if accumulated == 0 {
            SegmentProgress::Pending
        } else {
            SegmentProgress::Paused { accumulated }
        }
    }
}

/// Flat storage shape of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRecord {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub total_duration: u64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub start_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SegmentRecord", into = "SegmentRecord")]
pub struct Segment {
    kind: SegmentKind,
    total_duration: u64,
    progress: SegmentProgress,
}

/// Field-level edit of the segment the manager currently addresses.
/// `start_timestamp: Some(None)` clears the start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentPatch {
    pub duration: Option<u64>,
    pub start_timestamp: Option<Option<DateTime<Utc>>>,
}

impl Segment {
    pub fn new(kind: SegmentKind, total_duration: u64) -> Self {
        Self {
            kind,
            total_duration,
            progress: SegmentProgress::Pending,
        }
    }

    pub fn focus(total_duration: u64) -> Self {
        Self::new(SegmentKind::Focus, total_duration)
    }

    pub fn break_of(total_duration: u64) -> Self {
        Self::new(SegmentKind::Break, total_duration)
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn total_duration(&self) -> u64 {
        self.total_duration
    }

    pub fn progress(&self) -> SegmentProgress {
        self.progress
    }

    /// Seconds banked so far, not counting a running window.
    pub fn duration(&self) -> u64 {
        match self.progress {
            SegmentProgress::Pending => 0,
            SegmentProgress::Running { accumulated, .. }
            | SegmentProgress::Paused { accumulated }
            | SegmentProgress::Completed { accumulated, .. } => accumulated,
        }
    }

    pub fn start_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.progress {
            SegmentProgress::Running { since, .. } => Some(since),
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self.progress {
            SegmentProgress::Completed { at, .. } => Some(at),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.progress, SegmentProgress::Running { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.progress, SegmentProgress::Completed { .. })
    }

    pub fn has_progress(&self) -> bool {
        !matches!(self.progress, SegmentProgress::Pending)
    }

    /// Wall-clock time consumed by `now`, capped at the segment total.
    pub fn progressed_at(&self, now: DateTime<Utc>) -> u64 {
        let consumed = match self.progress {
            SegmentProgress::Running { since, accumulated } => {
                accumulated.saturating_add(elapsed_secs(since, now))
            }
            _ => self.duration(),
        };
        consumed.min(self.total_duration)
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        if self.is_completed() {
            return 0;
        }
        self.total_duration
            .saturating_sub(self.progressed_at(now))
    }

    /// Opens a running window at `now`. Returns false if nothing changed.
    pub(crate) fn start(&mut self, now: DateTime<Utc>) -> bool {
        match self.progress {
            SegmentProgress::Pending => {
                self.progress = SegmentProgress::Running {
                    since: now,
                    accumulated: 0,
                };
                true
            }
            SegmentProgress::Paused { accumulated } => {
                self.progress = SegmentProgress::Running {
                    since: now,
                    accumulated,
                };
                true
            }
            SegmentProgress::Running { .. } | SegmentProgress::Completed { .. } => false,
        }
    }

    /// Folds the running window into the banked duration.
    pub(crate) fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        let banked = self.progressed_at(now);
        self.progress = SegmentProgress::idle(banked);
        true
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_completed() {
            return false;
        }
        self.progress = SegmentProgress::Completed {
            at: now,
            accumulated: self.total_duration,
        };
        true
    }

    /// Stops the segment with exactly `accumulated` seconds banked.
    pub(crate) fn rewind(&mut self, accumulated: u64) {
        if self.is_completed() {
            return;
        }
        self.progress = SegmentProgress::idle(accumulated.min(self.total_duration));
    }

    pub(crate) fn apply_patch(
        &mut self,
        index: usize,
        patch: &SegmentPatch,
    ) -> Result<(), SchedulerError> {
        if self.is_completed() {
            return Err(SchedulerError::SegmentCompleted { index });
        }

        let mut record = self.to_record();
        if let Some(duration) = patch.duration {
            if duration > self.total_duration {
                return Err(SchedulerError::DurationOverflow {
                    duration,
                    total: self.total_duration,
                });
            }
            record.duration = duration;
        }
        if let Some(start) = patch.start_timestamp {
            record.start_timestamp = start;
        }

        *self = Segment::from(record);
        Ok(())
    }

    pub fn to_record(&self) -> SegmentRecord {
        SegmentRecord::from(self.clone())
    }
}

impl From<SegmentRecord> for Segment {
    fn from(record: SegmentRecord) -> Self {
        let accumulated = record.duration.min(record.total_duration);
        let progress = match (record.completed_at, record.start_timestamp) {
            (Some(at), start) => {
                if start.is_some() {
                    warn!("Dropping start timestamp of segment completed at {at}");
                }
                SegmentProgress::Completed { at, accumulated }
            }
            (None, Some(since)) => SegmentProgress::Running { since, accumulated },
            (None, None) => SegmentProgress::idle(accumulated),
        };

        Self {
            kind: record.kind,
            total_duration: record.total_duration,
            progress,
        }
    }
}

impl From<Segment> for SegmentRecord {
    fn from(segment: Segment) -> Self {
        Self {
            kind: segment.kind,
            total_duration: segment.total_duration,
            duration: segment.duration(),
            start_timestamp: segment.start_timestamp(),
            completed_at: segment.completed_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    #[test]
    fn remaining_accounts_for_running_window() {
        let now = Utc::now();
        let segment = Segment::from(SegmentRecord {
            kind: SegmentKind::Focus,
            total_duration: 1500,
            duration: 200,
            start_timestamp: Some(now - Duration::seconds(100)),
            completed_at: None,
        });

        assert_eq!(segment.remaining_at(now), 1200);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let now = Utc::now();
        let segment = Segment::from(SegmentRecord {
            kind: SegmentKind::Break,
            total_duration: 300,
            duration: 250,
            start_timestamp: Some(now - Duration::seconds(3600)),
            completed_at: None,
        });

        assert_eq!(segment.remaining_at(now), 0);
        assert_eq!(segment.progressed_at(now), 300);
    }

    #[test]
    fn pause_banks_elapsed_time() {
        let now = Utc::now();
        let mut segment = Segment::focus(1500);
        assert!(segment.start(now));
        assert!(!segment.start(now + Duration::seconds(5)));

        assert!(segment.pause(now + Duration::seconds(61)));
        assert_eq!(segment.duration(), 61);
        assert_eq!(segment.start_timestamp(), None);
        assert!(!segment.pause(now + Duration::seconds(70)));
    }

    #[test]
    fn completed_segment_is_frozen() {
        let now = Utc::now();
        let mut segment = Segment::focus(1500);
        segment.start(now);
        assert!(segment.complete(now + Duration::seconds(10)));

        let frozen = segment.clone();
        assert!(!segment.complete(now + Duration::seconds(20)));
        assert!(!segment.start(now + Duration::seconds(30)));
        assert!(!segment.pause(now + Duration::seconds(40)));
        segment.rewind(0);
        assert_eq!(segment, frozen);
        assert_eq!(segment.duration(), 1500);

        let err = segment
            .apply_patch(3, &SegmentPatch { duration: Some(5), ..Default::default() })
            .unwrap_err();
        assert_eq!(err, SchedulerError::SegmentCompleted { index: 3 });
    }

    #[test]
    fn patch_rejects_duration_past_total() {
        let mut segment = Segment::break_of(300);
        let err = segment
            .apply_patch(0, &SegmentPatch { duration: Some(301), ..Default::default() })
            .unwrap_err();
        assert_eq!(err, SchedulerError::DurationOverflow { duration: 301, total: 300 });
    }

    #[test]
    fn serializes_to_flat_fields() {
        let at = DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut segment = Segment::focus(1125);
        segment.complete(at);

        let value = serde_json::to_value(&segment).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "focus",
                "totalDuration": 1125,
                "duration": 1125,
                "startTimestamp": null,
                "completedAt": "2025-03-01T10:00:00Z",
            })
        );

        let back: Segment = serde_json::from_value(value).unwrap();
        assert_eq!(back, segment);
    }

    #[test]
    fn completion_wins_over_stale_start() {
        let now = Utc::now();
        let segment: Segment = serde_json::from_value(json!({
            "type": "break",
            "totalDuration": 300,
            "duration": 300,
            "startTimestamp": now.to_rfc3339(),
            "completedAt": now.to_rfc3339(),
        }))
        .unwrap();

        assert!(segment.is_completed());
        assert_eq!(segment.start_timestamp(), None);
    }
}
