//! Connection pooling and schema migrations for the local SQLite store.

use std::path::Path;
use std::sync::Arc;

use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite_migration::{Migrations, M};

use crate::error::{CoreError, Result};

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "
        CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            title TEXT,
            model TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            total_cost REAL NOT NULL DEFAULT 0.0
        );

        CREATE TABLE messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            tokens INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_messages_session ON messages(session_id, created_at);

        CREATE TABLE checkpoint_records (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            level INTEGER NOT NULL,
            sequence INTEGER NOT NULL,
            original_tokens INTEGER NOT NULL,
            compressed_tokens INTEGER NOT NULL,
            summary TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_checkpoints_session ON checkpoint_records(session_id, sequence);

        CREATE TABLE snapshots (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            payload BLOB NOT NULL,
            created_at TEXT NOT NULL
        );
        ",
    )])
}

/// Owns the connection pool. One `Database` per process; `Arc`-shared across
/// repositories and services.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::new(path.as_ref());
        let pool = config
            .create_pool(Runtime::Tokio1)
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// A private, file-backed in-memory database — isolated per instance, so
    /// concurrent tests never share state. Pool size is pinned to 1:
    /// `:memory:` connections don't share state across pool members.
    pub async fn connect_in_memory() -> Result<Self> {
        let mut config = Config::new(":memory:");
        config.pool = Some(deadpool_sqlite::PoolConfig {
            max_size: 1,
            ..Default::default()
        });
        let pool = config
            .create_pool(Runtime::Tokio1)
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        conn.interact(|conn| migrations().to_latest(conn))
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(())
    }
}

pub type SharedDatabase = Arc<Database>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_runs_migrations() {
        let db = Database::connect_in_memory().await.unwrap();
        let conn = db.pool().get().await.unwrap();
        let count: i64 = conn
            .interact(|conn| {
                conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='sessions'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count, 1);
    }
}
