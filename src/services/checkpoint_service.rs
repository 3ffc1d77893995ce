//! Audit trail for compression runs — the durable counterpart to the
//! in-memory [`crate::context::Checkpoint`].

use uuid::Uuid;

use crate::context::Checkpoint;
use crate::db::{CheckpointRecord, CheckpointRepository};
use crate::error::Result;

use super::service_context::ServiceContext;

pub struct CheckpointService {
    repo: CheckpointRepository,
}

impl CheckpointService {
    pub fn new(context: ServiceContext) -> Self {
        Self {
            repo: CheckpointRepository::new(context.db().pool().clone()),
        }
    }

    pub async fn record(&self, session_id: Uuid, checkpoint: &Checkpoint, original_tokens: usize) -> Result<CheckpointRecord> {
        self.repo
            .create(
                session_id,
                checkpoint.level,
                checkpoint.sequence as i64,
                original_tokens as i64,
                checkpoint.token_count as i64,
                checkpoint.summary.clone(),
            )
            .await
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<CheckpointRecord>> {
        self.repo.list_for_session(session_id).await
    }
}
