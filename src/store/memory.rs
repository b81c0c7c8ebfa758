use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{SessionRecord, SessionStatus};

use super::SessionStore;

#[derive(Debug, Clone)]
struct StoredSession {
    record: SessionRecord,
    status: SessionStatus,
    ended_at: Option<DateTime<Utc>>,
}

/// Process-local store with the same upsert and retirement rules as the
/// SQLite one. Saves can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<(String, String), StoredSession>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn get(&self, user_id: &str, session_id: &str) -> Option<SessionRecord> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&(session_id.to_string(), user_id.to_string()))
            .map(|stored| stored.record.clone())
    }

    pub async fn status_of(&self, user_id: &str, session_id: &str) -> Option<SessionStatus> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&(session_id.to_string(), user_id.to_string()))
            .map(|stored| stored.status)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_active_session(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .iter()
            .filter(|((_, owner), stored)| {
                owner == user_id
                    && stored.status == SessionStatus::Active
                    && !stored.record.is_done
            })
            .map(|(_, stored)| &stored.record)
            .max_by_key(|record| record.timestamp)
            .cloned())
    }

    async fn save_session(&self, user_id: &str, record: &SessionRecord) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("session store unavailable");
        }

        let now = Utc::now();
        let key = (record.session_id.clone(), user_id.to_string());
        let mut sessions = self.sessions.lock().await;

        if !sessions.contains_key(&key) && !record.is_done {
            for ((session_id, owner), stored) in sessions.iter_mut() {
                if owner == user_id
                    && session_id != &record.session_id
                    && stored.status == SessionStatus::Active
                {
                    stored.status = SessionStatus::Completed;
                    stored.ended_at = Some(now);
                }
            }
        }

        let ended_at = sessions.get(&key).and_then(|stored| stored.ended_at);
        sessions.insert(
            key,
            StoredSession {
                record: record.clone(),
                status: record.status(),
                ended_at: if record.is_done {
                    ended_at.or(Some(now))
                } else {
                    ended_at
                },
            },
        );
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.lock().await;
        let mut records: Vec<SessionRecord> = sessions
            .iter()
            .filter(|((_, owner), _)| owner == user_id)
            .map(|(_, stored)| stored.record.clone())
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}
