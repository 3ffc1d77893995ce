//! Message persistence: append-only writes plus the streaming-friendly
//! `append_content` used while an assistant reply is still arriving.

use uuid::Uuid;

use crate::db::{Message, MessageRepository};
use crate::error::Result;

use super::service_context::ServiceContext;

#[derive(Clone)]
pub struct MessageService {
    repo: MessageRepository,
}

impl MessageService {
    pub fn new(context: ServiceContext) -> Self {
        Self {
            repo: MessageRepository::new(context.db().pool().clone()),
        }
    }

    pub async fn create_message(&self, session_id: Uuid, role: String, content: String) -> Result<Message> {
        self.repo.create(session_id, role, content).await
    }

    pub async fn list_messages_for_session(&self, session_id: Uuid) -> Result<Vec<Message>> {
        self.repo.list_for_session(session_id).await
    }

    /// Append a streamed chunk to a message already created with empty
    /// content, so partial assistant replies are visible mid-stream.
    pub async fn append_content(&self, id: Uuid, text: &str) -> Result<()> {
        self.repo.append_content(id, text).await
    }

    pub async fn update_message_usage(&self, id: Uuid, tokens: i32, cost: f64) -> Result<()> {
        self.repo.update_usage(id, tokens, cost).await
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
    async fn list_returns_messages_in_creation_order() {
        let service = MessageService::new(context().await);
        let session_id = Uuid::new_v4();
        service.create_message(session_id, "user".to_string(), "hi".to_string()).await.unwrap();
        service.create_message(session_id, "assistant".to_string(), "hello".to_string()).await.unwrap();
        let messages = service.list_messages_for_session(session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
    }
}
