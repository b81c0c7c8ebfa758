pub mod builder;

pub use builder::{build_plan, MIN_FOCUS_CHUNK_SECS};
