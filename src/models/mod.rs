pub mod history;
pub mod segment;
pub mod session;
pub mod user_data;

pub use history::{dedup_history, HistoryEntry};
pub use segment::{Segment, SegmentKind, SegmentPatch, SegmentProgress, SegmentRecord};
pub use session::{SessionRecord, SessionStatus, DEFAULT_TITLE};
pub use user_data::{Note, SessionFeedback, Todo, TodoStatus, UserData};
