use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::build_plan;
use crate::settings::FocusSettings;

use super::history::{dedup_history, HistoryEntry};
use super::segment::{Segment, SegmentKind};
use super::user_data::{SessionFeedback, UserData};

pub const DEFAULT_TITLE: &str = "Untitled Work";

/// Store-side lifecycle of a session record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub segment_index: usize,
    pub total_duration: u64,
    pub break_duration: u64,
    pub max_breaks: u32,
    #[serde(default)]
    pub total_breaks: usize,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub user_settings: FocusSettings,
    #[serde(default)]
    pub user_data: UserData,
    #[serde(default)]
    pub session_feedback: SessionFeedback,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl SessionRecord {
    /// Builds a fresh plan from `settings` and wraps it with new metadata.
    pub fn new(settings: &FocusSettings, now: DateTime<Utc>) -> Self {
        let segments = build_plan(
            settings.total_focus_duration,
            settings.break_duration,
            settings.breaks_number,
        );
        let total_breaks = segments
            .iter()
            .filter(|segment| segment.kind() == SegmentKind::Break)
            .count();

        Self {
            session_id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            timestamp: now,
            segments,
            segment_index: 0,
            total_duration: settings.total_focus_duration,
            break_duration: settings.break_duration,
            max_breaks: settings.breaks_number,
            total_breaks,
            is_done: false,
            user_settings: *settings,
            user_data: UserData::default(),
            session_feedback: SessionFeedback::default(),
            history: Vec::new(),
        }
    }

    /// Index of the first incomplete segment, or the last index when every
    /// segment is complete.
    pub fn resume_index(&self) -> usize {
        self.segments
            .iter()
            .position(|segment| !segment.is_completed())
            .unwrap_or_else(|| self.segments.len().saturating_sub(1))
    }

    pub fn all_completed(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(Segment::is_completed)
    }

    /// True once any focus segment has been started.
    pub fn has_started_focus(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.kind() == SegmentKind::Focus && segment.has_progress())
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_done {
            SessionStatus::Completed
        } else {
            SessionStatus::Active
        }
    }

    /// Empties the history log. Segment progress is untouched.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Copy ready to hand to a store: history de-duplicated by `completedAt`.
    pub fn for_save(&self) -> Self {
        let mut record = self.clone();
        record.history = dedup_history(&self.history);
        record
    }
}
