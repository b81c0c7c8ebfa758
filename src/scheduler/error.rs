use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("session is already done")]
    SessionDone,

    #[error("segment {index} is already completed")]
    SegmentCompleted { index: usize },

    #[error("duration {duration}s exceeds segment total of {total}s")]
    DurationOverflow { duration: u64, total: u64 },

    #[error("session record has no segments")]
    EmptyPlan,
}
