//! Shared handle services are constructed from — currently just the
//! database pool, but the natural place to thread other process-wide
//! collaborators (config, pricing tables) through to services later.

use crate::db::Database;

#[derive(Clone)]
pub struct ServiceContext {
    db: Database,
}

impl ServiceContext {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}
