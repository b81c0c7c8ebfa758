use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::{elapsed_secs, Clock};
use crate::models::{
    HistoryEntry, Segment, SegmentKind, SegmentPatch, SessionFeedback, SessionRecord, UserData,
};
use crate::settings::FocusSettings;
use crate::timer::{Countdown, CountdownTick};

use super::SchedulerError;

/// Seconds without a tick after which a running focus segment counts as stalled.
pub const DEFAULT_STALL_THRESHOLD_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    Idle,
    Ticked {
        time_left: u64,
    },
    SegmentCompleted {
        index: usize,
        kind: SegmentKind,
        next_started: bool,
    },
    SessionCompleted,
}

impl TickEvent {
    /// Whether the record changed in a way worth persisting.
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            TickEvent::SegmentCompleted { .. } | TickEvent::SessionCompleted
        )
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSnapshot {
    pub session_id: String,
    pub title: String,
    pub segment_index: usize,
    pub segment_count: usize,
    pub kind: SegmentKind,
    pub time_left: u64,
    pub is_running: bool,
    pub is_done: bool,
}

/// Owns a session record while it is active and drives it segment by segment.
pub struct SegmentManager {
    record: SessionRecord,
    current_index: usize,
    countdown: Countdown,
    /// Raised by the countdown's completion callback, consumed by `tick`.
    completion: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    auto_start_breaks: bool,
    last_tick_at: Option<DateTime<Utc>>,
}

impl SegmentManager {
    /// Takes over `record`, freshly built or loaded from a store.
    ///
    /// A record saved while its countdown was running resumes running, with
    /// the time spent since `startTimestamp` already subtracted.
    pub fn new(
        mut record: SessionRecord,
        settings: &FocusSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        if record.segments.is_empty() {
            return Err(SchedulerError::EmptyPlan);
        }

        let now = clock.now();
        let current_index = record.resume_index();

        for (index, segment) in record.segments.iter_mut().enumerate() {
            if index != current_index && segment.is_running() {
                warn!(
                    "Session {}: segment {index} had a start timestamp while not current; clearing it",
                    record.session_id
                );
                let banked = segment.duration();
                segment.rewind(banked);
            }
        }

        record.segment_index = current_index;
        record.is_done = record.all_completed();

        let completion = Arc::new(AtomicBool::new(false));
        let segment = &record.segments[current_index];
        let mut countdown = countdown_for(&completion, segment.remaining_at(now));
        let mut last_tick_at = None;
        if !record.is_done && segment.is_running() {
            countdown.start();
            last_tick_at = Some(now);
            info!(
                "Resuming session {} mid-segment {current_index} with {}s left",
                record.session_id,
                countdown.time_left()
            );
        }

        Ok(Self {
            record,
            current_index,
            countdown,
            completion,
            clock,
            auto_start_breaks: settings.auto_start_breaks,
            last_tick_at,
        })
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn into_record(self) -> SessionRecord {
        self.record
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_segment(&self) -> &Segment {
        &self.record.segments[self.current_index]
    }

    pub fn time_left(&self) -> u64 {
        self.countdown.time_left()
    }

    pub fn is_running(&self) -> bool {
        self.countdown.is_running()
    }

    pub fn is_done(&self) -> bool {
        self.record.is_done
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.record.history
    }

    pub fn auto_start_breaks(&self) -> bool {
        self.auto_start_breaks
    }

    pub fn set_auto_start_breaks(&mut self, enabled: bool) {
        self.auto_start_breaks = enabled;
        self.record.user_settings.auto_start_breaks = enabled;
    }

    pub fn set_title(&mut self, title: &str) {
        self.record.title = title.trim().to_string();
    }

    pub fn user_data_mut(&mut self) -> &mut UserData {
        &mut self.record.user_data
    }

    pub fn feedback_mut(&mut self) -> &mut SessionFeedback {
        &mut self.record.session_feedback
    }

    pub fn clear_history(&mut self) {
        self.record.clear_history();
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            session_id: self.record.session_id.clone(),
            title: self.record.title.clone(),
            segment_index: self.current_index,
            segment_count: self.record.segments.len(),
            kind: self.current_segment().kind(),
            time_left: self.countdown.time_left(),
            is_running: self.countdown.is_running(),
            is_done: self.record.is_done,
        }
    }

    /// Starts or resumes the current segment. Returns false if it was
    /// already running.
    pub fn start(&mut self) -> Result<bool, SchedulerError> {
        if self.record.is_done {
            return Err(SchedulerError::SessionDone);
        }

        let now = self.clock.now();
        self.record.segments[self.current_index].start(now);
        let started = self.countdown.start();
        if started {
            self.last_tick_at = Some(now);
            debug!(
                "Session {}: segment {} running with {}s left",
                self.record.session_id,
                self.current_index,
                self.countdown.time_left()
            );
        }
        Ok(started)
    }

    /// Banks the wall-clock time of the running window and stops the
    /// countdown. Returns false if nothing was running.
    pub fn pause(&mut self) -> bool {
        if self.record.is_done {
            return false;
        }

        let now = self.clock.now();
        let was_running = self.countdown.is_running();
        self.catch_up(now);

        let segment = &mut self.record.segments[self.current_index];
        let banked = segment.pause(now);
        self.countdown.pause();
        self.last_tick_at = None;

        if banked {
            debug!(
                "Session {}: segment {} paused with {}s banked",
                self.record.session_id,
                self.current_index,
                segment.duration()
            );
        }
        banked || was_running
    }

    /// Stops the current segment and rewinds it to where its countdown began.
    pub fn reset(&mut self) {
        if self.record.is_done {
            return;
        }

        let segment = &mut self.record.segments[self.current_index];
        let banked_at_start = segment
            .total_duration()
            .saturating_sub(self.countdown.initial());
        segment.rewind(banked_at_start);
        self.countdown.reset();
        self.last_tick_at = None;
    }

    /// Advances the countdown by one second.
    ///
    /// Before stepping, the countdown is re-derived from the segment's
    /// wall-clock progress, so a burst of late ticks cannot run it ahead of
    /// real time and a slow ticker cannot leave it behind.
    pub fn tick(&mut self) -> TickEvent {
        if self.record.is_done {
            return TickEvent::Idle;
        }

        let now = self.clock.now();
        if self.countdown.is_running() {
            let wall_remaining = self.current_segment().remaining_at(now);
            self.countdown.set_time_left(wall_remaining.saturating_add(1));
        }

        match self.countdown.tick() {
            CountdownTick::Idle => TickEvent::Idle,
            CountdownTick::Ticked { time_left } => {
                self.last_tick_at = Some(now);
                TickEvent::Ticked { time_left }
            }
            CountdownTick::Completed => {
                self.last_tick_at = Some(now);
                if self.completion.swap(false, Ordering::SeqCst) {
                    self.complete_current()
                } else {
                    TickEvent::Idle
                }
            }
        }
    }

    /// Finalizes the current segment and moves on. Idempotent: a segment
    /// that is already complete yields [`TickEvent::Idle`].
    pub fn complete_current(&mut self) -> TickEvent {
        let now = self.clock.now();
        let index = self.current_index;
        let segment = &mut self.record.segments[index];

        if !segment.complete(now) {
            return TickEvent::Idle;
        }
        let kind = segment.kind();
        if let Some(entry) = HistoryEntry::from_completed(segment) {
            self.record.history.push(entry);
        }

        if index + 1 >= self.record.segments.len() {
            self.record.is_done = true;
            self.countdown.pause();
            self.last_tick_at = None;
            info!(
                "Session {} done after {} segments",
                self.record.session_id,
                self.record.segments.len()
            );
            return TickEvent::SessionCompleted;
        }

        self.current_index = index + 1;
        self.record.segment_index = self.current_index;

        let next = &mut self.record.segments[self.current_index];
        self.countdown = countdown_for(&self.completion, next.remaining_at(now));
        let next_started = match next.kind() {
            SegmentKind::Focus => true,
            SegmentKind::Break => self.auto_start_breaks,
        };
        if next_started {
            next.start(now);
            self.countdown.start();
            self.last_tick_at = Some(now);
        } else {
            self.last_tick_at = None;
        }

        info!(
            "Session {}: {} segment {index} complete; segment {} {}",
            self.record.session_id,
            kind.as_str(),
            self.current_index,
            if next_started { "started" } else { "waiting" }
        );

        TickEvent::SegmentCompleted {
            index,
            kind,
            next_started,
        }
    }

    /// Patches the current segment's flat fields. The countdown is rebuilt
    /// from the patched segment; no segment transition happens.
    pub fn update_current_segment(&mut self, patch: &SegmentPatch) -> Result<(), SchedulerError> {
        let now = self.clock.now();
        let index = self.current_index;
        let segment = &mut self.record.segments[index];
        segment.apply_patch(index, patch)?;

        self.countdown = countdown_for(&self.completion, segment.remaining_at(now));
        if segment.is_running() {
            self.countdown.start();
            self.last_tick_at = Some(now);
        } else {
            self.last_tick_at = None;
        }
        Ok(())
    }

    /// Pulls the countdown down to the wall-clock remaining time of the
    /// running segment between ticks. Returns true if ticks had been missed.
    pub fn reconcile(&mut self) -> bool {
        let now = self.clock.now();
        self.catch_up(now)
    }

    /// True while a focus segment runs but no tick arrived for longer than
    /// `threshold_secs`.
    pub fn is_stalled(&self, threshold_secs: u64) -> bool {
        if !self.countdown.is_running() || self.current_segment().kind() == SegmentKind::Break {
            return false;
        }
        match self.last_tick_at {
            Some(last) => elapsed_secs(last, self.clock.now()) > threshold_secs,
            None => false,
        }
    }

    fn catch_up(&mut self, now: DateTime<Utc>) -> bool {
        if !self.countdown.is_running() {
            return false;
        }
        let wall_remaining = self.record.segments[self.current_index].remaining_at(now);
        if wall_remaining >= self.countdown.time_left() {
            return false;
        }
        debug!(
            "Session {}: countdown drifted {}s behind wall clock",
            self.record.session_id,
            self.countdown.time_left() - wall_remaining
        );
        self.countdown.set_time_left(wall_remaining);
        true
    }
}

fn countdown_for(completion: &Arc<AtomicBool>, secs: u64) -> Countdown {
    completion.store(false, Ordering::SeqCst);
    let signal = completion.clone();
    Countdown::with_callback(secs, move || signal.store(true, Ordering::SeqCst))
}
