use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_i64},
};
use crate::models::{SessionRecord, SessionStatus};
use crate::store::SessionStore;

/// A stored session together with the store-side bookkeeping columns.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub record: SessionRecord,
    pub status: SessionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_session(row: &Row) -> Result<SessionRow> {
    let document: String = row.get("document")?;
    let status: String = row.get("status")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let updated_at: String = row.get("updated_at")?;

    let record: SessionRecord =
        serde_json::from_str(&document).context("failed to decode session document")?;

    Ok(SessionRow {
        record,
        status: parse_status(&status)?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn upsert_session(&self, user_id: &str, record: &SessionRecord) -> Result<()> {
        let user_id = user_id.to_string();
        let record = record.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let document =
                serde_json::to_string(&record).context("failed to encode session document")?;
            let tx = conn.transaction()?;

            let exists = tx
                .query_row(
                    "SELECT 1 FROM sessions WHERE session_id = ?1 AND user_id = ?2",
                    params![record.session_id, user_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some();

            if !exists && !record.is_done {
                let retired = tx.execute(
                    "UPDATE sessions
                     SET status = 'completed',
                         ended_at = ?1,
                         updated_at = ?1
                     WHERE user_id = ?2
                       AND status = 'active'
                       AND session_id != ?3",
                    params![now, user_id, record.session_id],
                )?;
                if retired > 0 {
                    info!("Retired {retired} active session(s) for user {user_id}");
                }
            }

            tx.execute(
                "INSERT INTO sessions (
                    session_id, user_id, title, timestamp, status, is_done, segment_index,
                    total_duration, break_duration, max_breaks, document, ended_at,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT(session_id, user_id) DO UPDATE SET
                    title = excluded.title,
                    timestamp = excluded.timestamp,
                    status = excluded.status,
                    is_done = excluded.is_done,
                    segment_index = excluded.segment_index,
                    total_duration = excluded.total_duration,
                    break_duration = excluded.break_duration,
                    max_breaks = excluded.max_breaks,
                    document = excluded.document,
                    ended_at = COALESCE(sessions.ended_at, excluded.ended_at),
                    updated_at = excluded.updated_at",
                params![
                    record.session_id,
                    user_id,
                    record.title,
                    record.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                    record.status().as_str(),
                    record.is_done,
                    to_i64(record.segment_index as u64)?,
                    to_i64(record.total_duration)?,
                    to_i64(record.break_duration)?,
                    i64::from(record.max_breaks),
                    document,
                    record.is_done.then(|| now.clone()),
                    now,
                ],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn get_active_session(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT document, status, ended_at, updated_at
                 FROM sessions
                 WHERE user_id = ?1 AND status = 'active' AND is_done = 0
                 ORDER BY timestamp DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query(params![user_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?.record),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<SessionRow>> {
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT document, status, ended_at, updated_at
                 FROM sessions
                 WHERE user_id = ?1 AND session_id = ?2",
            )?;

            let mut rows = stmt.query(params![user_id, session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT document, status, ended_at, updated_at
                 FROM sessions
                 WHERE user_id = ?1
                 ORDER BY timestamp DESC",
            )?;

            let mut rows = stmt.query(params![user_id])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?.record);
            }

            Ok(sessions)
        })
        .await
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn load_active_session(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        self.get_active_session(user_id).await
    }

    async fn save_session(&self, user_id: &str, record: &SessionRecord) -> Result<()> {
        self.upsert_session(user_id, record).await
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        self.list_user_sessions(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{Segment, SegmentRecord, SegmentKind};
    use crate::settings::FocusSettings;

    fn open(dir: &tempfile::TempDir) -> Database {
        Database::new(dir.path().join("studyfocus.sqlite3")).unwrap()
    }

    #[tokio::test]
    async fn round_trips_every_record_field() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        let now = Utc::now();

        let mut record = SessionRecord::new(&FocusSettings::default(), now);
        record.title = "Linear algebra".into();
        record.segments = vec![
            Segment::from(SegmentRecord {
                kind: SegmentKind::Focus,
                total_duration: 1500,
                duration: 200,
                start_timestamp: Some(now - Duration::seconds(100)),
                completed_at: None,
            }),
            Segment::break_of(300),
        ];
        record.user_data.add_todo("proofs", now);
        record.user_data.add_note("ask about eigenvalues", None, now);
        record.session_feedback.toggle_distraction("phone");

        db.save_session("ada", &record).await.unwrap();

        let loaded = db.load_active_session("ada").await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn saving_new_active_session_retires_previous() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        let now = Utc::now();
        let first = SessionRecord::new(&FocusSettings::default(), now - Duration::hours(1));
        let second = SessionRecord::new(&FocusSettings::default(), now);

        db.save_session("ada", &first).await.unwrap();
        db.save_session("ada", &first).await.unwrap();
        db.save_session("ada", &second).await.unwrap();

        let retired = db.get_session("ada", &first.session_id).await.unwrap().unwrap();
        assert_eq!(retired.status, SessionStatus::Completed);
        assert!(retired.ended_at.is_some());

        let active = db.load_active_session("ada").await.unwrap().unwrap();
        assert_eq!(active.session_id, second.session_id);

        let listed = db.list_sessions("ada").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.session_id.clone()).collect();
        assert_eq!(ids, vec![second.session_id.clone(), first.session_id.clone()]);
    }

    #[tokio::test]
    async fn done_session_is_completed_and_not_active() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        let mut record = SessionRecord::new(&FocusSettings::default(), Utc::now());
        db.save_session("ada", &record).await.unwrap();

        record.is_done = true;
        db.save_session("ada", &record).await.unwrap();

        assert!(db.load_active_session("ada").await.unwrap().is_none());
        let row = db.get_session("ada", &record.session_id).await.unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Completed);
        assert!(row.ended_at.is_some());
        assert!(row.record.is_done);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = SessionRecord::new(&FocusSettings::default(), Utc::now());
        {
            let db = open(&dir);
            db.save_session("ada", &record).await.unwrap();
        }

        let db = open(&dir);
        let loaded = db.load_active_session("ada").await.unwrap();
        assert_eq!(loaded, Some(record));
        assert!(db.load_active_session("grace").await.unwrap().is_none());
    }
}
