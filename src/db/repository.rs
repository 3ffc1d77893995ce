//! Repository-style access objects: one per table, all routed through the
//! pooled connection and `retry::retry_db_operation` for `SQLITE_BUSY`.

use chrono::Utc;
use deadpool_sqlite::Pool;
use uuid::Uuid;

use crate::error::{CoreError, Result};

use super::models::{CheckpointRecord, Message, Session};
use super::retry::retry_db_operation;

fn map_interact<T>(result: std::result::Result<rusqlite::Result<T>, deadpool_sqlite::InteractError>) -> Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CoreError::Database(e)),
        Err(e) => Err(CoreError::Pool(e.to_string())),
    }
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: Pool,
}

impl SessionRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, title: Option<String>, model: Option<String>) -> Result<Session> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        retry_db_operation(|| {
            let conn = conn.clone();
            let id_s = id.to_string();
            let title = title.clone();
            let model = model.clone();
            let now_s = now.to_rfc3339();
            async move {
                map_interact(
                    conn.interact(move |conn| {
                        conn.execute(
                            "INSERT INTO sessions (id, title, model, created_at, updated_at, total_tokens, total_cost)
                             VALUES (?1, ?2, ?3, ?4, ?4, 0, 0.0)",
                            rusqlite::params![id_s, title, model, now_s],
                        )
                    })
                    .await,
                )
            }
        })
        .await?;

        Ok(Session {
            id,
            title,
            model,
            created_at: now,
            updated_at: now,
            total_tokens: 0,
            total_cost: 0.0,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let id_s = id.to_string();
        map_interact(
            conn.interact(move |conn| {
                conn.query_row(
                    "SELECT id, title, model, created_at, updated_at, total_tokens, total_cost
                     FROM sessions WHERE id = ?1",
                    rusqlite::params![id_s],
                    |row| Session::from_row(row),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
            })
            .await,
        )
    }

    pub async fn list(&self) -> Result<Vec<Session>> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        map_interact(
            conn.interact(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, model, created_at, updated_at, total_tokens, total_cost
                     FROM sessions ORDER BY updated_at DESC",
                )?;
                let rows = stmt.query_map([], Session::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await,
        )
    }

    pub async fn update_usage(&self, id: Uuid, tokens: i32, cost: f64) -> Result<()> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let id_s = id.to_string();
        let now_s = Utc::now().to_rfc3339();
        map_interact(
            conn.interact(move |conn| {
                conn.execute(
                    "UPDATE sessions SET total_tokens = total_tokens + ?1, total_cost = total_cost + ?2,
                     updated_at = ?3 WHERE id = ?4",
                    rusqlite::params![tokens, cost, now_s, id_s],
                )
            })
            .await,
        )?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let id_s = id.to_string();
        map_interact(
            conn.interact(move |conn| conn.execute("DELETE FROM sessions WHERE id = ?1", rusqlite::params![id_s]))
                .await,
        )?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: Pool,
}

impl MessageRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session_id: Uuid, role: String, content: String) -> Result<Message> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let (id_s, session_s, role_c, content_c, now_s) =
            (id.to_string(), session_id.to_string(), role.clone(), content.clone(), now.to_rfc3339());
        map_interact(
            conn.interact(move |conn| {
                conn.execute(
                    "INSERT INTO messages (id, session_id, role, content, tokens, cost, created_at)
                     VALUES (?1, ?2, ?3, ?4, 0, 0.0, ?5)",
                    rusqlite::params![id_s, session_s, role_c, content_c, now_s],
                )
            })
            .await,
        )?;

        Ok(Message {
            id,
            session_id,
            role,
            content,
            tokens: 0,
            cost: 0.0,
            created_at: now,
        })
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let session_s = session_id.to_string();
        map_interact(
            conn.interact(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, role, content, tokens, cost, created_at
                     FROM messages WHERE session_id = ?1 ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map(rusqlite::params![session_s], Message::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await,
        )
    }

    pub async fn append_content(&self, id: Uuid, text: &str) -> Result<()> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let id_s = id.to_string();
        let text = text.to_string();
        map_interact(
            conn.interact(move |conn| {
                conn.execute(
                    "UPDATE messages SET content = content || ?1 WHERE id = ?2",
                    rusqlite::params![text, id_s],
                )
            })
            .await,
        )?;
        Ok(())
    }

    pub async fn update_usage(&self, id: Uuid, tokens: i32, cost: f64) -> Result<()> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let id_s = id.to_string();
        map_interact(
            conn.interact(move |conn| {
                conn.execute(
                    "UPDATE messages SET tokens = ?1, cost = ?2 WHERE id = ?3",
                    rusqlite::params![tokens, cost, id_s],
                )
            })
            .await,
        )?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CheckpointRepository {
    pool: Pool,
}

impl CheckpointRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        session_id: Uuid,
        level: u8,
        sequence: i64,
        original_tokens: i64,
        compressed_tokens: i64,
        summary: String,
    ) -> Result<CheckpointRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let (id_s, session_s, summary_c, now_s) = (id.to_string(), session_id.to_string(), summary.clone(), now.to_rfc3339());
        map_interact(
            conn.interact(move |conn| {
                conn.execute(
                    "INSERT INTO checkpoint_records
                     (id, session_id, level, sequence, original_tokens, compressed_tokens, summary, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![id_s, session_s, level as i64, sequence, original_tokens, compressed_tokens, summary_c, now_s],
                )
            })
            .await,
        )?;

        Ok(CheckpointRecord {
            id,
            session_id,
            level,
            sequence,
            original_tokens,
            compressed_tokens,
            summary,
            created_at: now,
        })
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<CheckpointRecord>> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        let session_s = session_id.to_string();
        map_interact(
            conn.interact(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, level, sequence, original_tokens, compressed_tokens, summary, created_at
                     FROM checkpoint_records WHERE session_id = ?1 ORDER BY sequence ASC",
                )?;
                let rows = stmt.query_map(rusqlite::params![session_s], CheckpointRecord::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn create_and_fetch_session_round_trips() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = SessionRepository::new(db.pool().clone());
        let session = repo.create(Some("demo".to_string()), None).await.unwrap();
        let fetched = repo.get(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("demo"));
    }

    #[tokio::test]
    async fn append_content_concatenates_existing_text() {
        let db = Database::connect_in_memory().await.unwrap();
        let sessions = SessionRepository::new(db.pool().clone());
        let messages = MessageRepository::new(db.pool().clone());
        let session = sessions.create(None, None).await.unwrap();
        let message = messages.create(session.id, "assistant".to_string(), "hello".to_string()).await.unwrap();
        messages.append_content(message.id, " world").await.unwrap();
        let all = messages.list_for_session(session.id).await.unwrap();
        assert_eq!(all[0].content, "hello world");
    }

    #[tokio::test]
    async fn update_session_usage_accumulates() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = SessionRepository::new(db.pool().clone());
        let session = repo.create(None, None).await.unwrap();
        repo.update_usage(session.id, 100, 0.01).await.unwrap();
        repo.update_usage(session.id, 50, 0.02).await.unwrap();
        let fetched = repo.get(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.total_tokens, 150);
        assert!((fetched.total_cost - 0.03).abs() < 1e-9);
    }
}
