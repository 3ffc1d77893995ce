//! Session lifecycle: create/fetch/list sessions, accumulate usage.

use uuid::Uuid;

use crate::db::{Session, SessionRepository};
use crate::error::Result;

use super::service_context::ServiceContext;

#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
}

impl SessionService {
    pub fn new(context: ServiceContext) -> Self {
        Self {
            repo: SessionRepository::new(context.db().pool().clone()),
        }
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<Session> {
        self.repo.create(title, None).await
    }

    pub async fn create_session_with_model(&self, title: Option<String>, model: Option<String>) -> Result<Session> {
        self.repo.create(title, model).await
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        self.repo.get(id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.repo.list().await
    }

    pub async fn update_session_usage(&self, id: Uuid, tokens: i32, cost: f64) -> Result<()> {
        self.repo.update_usage(id, tokens, cost).await
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.repo.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn context() -> ServiceContext {
        ServiceContext::new(Database::connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let service = SessionService::new(context().await);
        let session = service.create_session(Some("t".to_string())).await.unwrap();
        let fetched = service.get_session(session.id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn get_missing_session_returns_none() {
        let service = SessionService::new(context().await);
        assert!(service.get_session(Uuid::new_v4()).await.unwrap().is_none());
    }
}
