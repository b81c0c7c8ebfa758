pub mod error;
pub mod manager;

pub use error::SchedulerError;
pub use manager::{ManagerSnapshot, SegmentManager, TickEvent, DEFAULT_STALL_THRESHOLD_SECS};
