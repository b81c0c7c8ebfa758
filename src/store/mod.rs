//! Persistence boundary for session records.

mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SessionRecord;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The user's single not-done session, if any.
    async fn load_active_session(&self, user_id: &str) -> Result<Option<SessionRecord>>;

    /// Upserts the full record keyed by `(session_id, user_id)`.
    ///
    /// The first save of a not-done record retires every other active session
    /// of the same user.
    async fn save_session(&self, user_id: &str, record: &SessionRecord) -> Result<()>;

    /// All sessions of the user, newest `timestamp` first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>>;
}
