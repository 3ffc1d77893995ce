//! Active Context — the prompt builder.
//!
//! Holds the immutable system prompt, an ordered list of checkpoints (oldest
//! first), and an ordered list of recent messages, and enforces the
//! invariants that keep the two from ever drifting into an inconsistent
//! state: unique recent-message ids, disjoint checkpoint membership, a hard
//! token ceiling, and strictly increasing checkpoint sequence numbers.

pub mod snapshot;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::validation::{MessageTokens, Role as ValidationRole};

pub use snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl From<Role> for ValidationRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ValidationRole::User,
            Role::Assistant => ValidationRole::Assistant,
            Role::System => ValidationRole::System,
            Role::Tool => ValidationRole::Tool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: Uuid,
    pub name: String,
    pub arguments: serde_json::Value,
    pub status: ToolCallStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// A single turn in the conversation. Immutable after insertion, except for
/// `token_count`, which may be recomputed in place if the counter is
/// swapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_call_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub token_count: usize,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, token_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            token_count,
        }
    }

    fn as_tokens(&self) -> MessageTokens {
        MessageTokens {
            role: self.role.into(),
            token_count: self.token_count,
        }
    }
}

/// A folded run of older messages, produced by the Compression Pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    pub level: u8,
    pub sequence: u64,
    pub token_count: usize,
    pub original_message_ids: Vec<Uuid>,
    pub model: String,
}

/// The authoritative, in-memory conversation state.
#[derive(Debug, Clone)]
pub struct ActiveContext {
    system_prompt: Message,
    checkpoints: Vec<Checkpoint>,
    recent: Vec<Message>,
    hard_limit: usize,
    next_sequence: u64,
}

impl ActiveContext {
    pub fn new(system_prompt: Message, hard_limit: usize) -> Self {
        Self {
            system_prompt,
            checkpoints: Vec::new(),
            recent: Vec::new(),
            hard_limit,
            next_sequence: 0,
        }
    }

    pub fn system_prompt(&self) -> &Message {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, message: Message) {
        self.system_prompt = message;
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn recent(&self) -> &[Message] {
        &self.recent
    }

    pub fn hard_limit(&self) -> usize {
        self.hard_limit
    }

    /// Sum of system prompt + all checkpoints + all recent messages.
    pub fn token_count(&self) -> usize {
        self.system_prompt.token_count
            + self.checkpoints.iter().map(|c| c.token_count).sum::<usize>()
            + self.recent.iter().map(|m| m.token_count).sum::<usize>()
    }

    /// Append a message to the recent window. Fails with
    /// [`CoreError::CapacityExceeded`] if the result would exceed
    /// `hard_limit`; the context is left unchanged on failure.
    pub fn add_message(&mut self, message: Message) -> Result<()> {
        if self.recent.iter().any(|m| m.id == message.id) {
            return Err(CoreError::Invariant(format!(
                "duplicate recent message id {}",
                message.id
            )));
        }

        let projected = self.token_count() + message.token_count;
        if projected > self.hard_limit {
            return Err(CoreError::CapacityExceeded {
                tokens: projected,
                limit: self.hard_limit,
                overage: projected - self.hard_limit,
                suggestions: Vec::new(),
            });
        }

        self.recent.push(message);
        Ok(())
    }

    /// Atomically replace `targets` (identified by id) with a new
    /// checkpoint. No observer sees an intermediate state: the checkpoint
    /// is only visible once the target messages have been removed, and
    /// both mutations happen without yielding.
    pub fn apply_compression(
        &mut self,
        target_ids: &[Uuid],
        checkpoint_without_sequence: Checkpoint,
    ) -> Result<()> {
        let target_set: HashSet<Uuid> = target_ids.iter().copied().collect();

        let existing_ids: HashSet<Uuid> = self
            .checkpoints
            .iter()
            .flat_map(|c| c.original_message_ids.iter().copied())
            .collect();
        if target_set.iter().any(|id| existing_ids.contains(id)) {
            return Err(CoreError::Invariant(
                "checkpoint target overlaps an existing checkpoint's message ids".into(),
            ));
        }

        let mut checkpoint = checkpoint_without_sequence;
        checkpoint.sequence = self.next_sequence;

        let mut remaining = Vec::with_capacity(self.recent.len());
        let mut removed = Vec::with_capacity(target_ids.len());
        for message in std::mem::take(&mut self.recent) {
            if target_set.contains(&message.id) {
                removed.push(message.id);
            } else {
                remaining.push(message);
            }
        }

        self.recent = remaining;
        self.checkpoints.push(checkpoint);
        self.next_sequence += 1;

        Ok(())
    }

    /// Reset to (system prompt only). Checkpoints and recent messages are
    /// discarded from the Active Context (Session History, kept
    /// separately, retains the full log).
    pub fn clear(&mut self) {
        self.checkpoints.clear();
        self.recent.clear();
        self.next_sequence = 0;
    }

    /// View over all messages (system prompt is not included) as
    /// [`MessageTokens`], for handing to the Validation Service.
    pub fn message_tokens(&self) -> Vec<MessageTokens> {
        let mut tokens = vec![self.system_prompt.as_tokens()];
        tokens.extend(self.checkpoints.iter().map(|c| MessageTokens {
            role: ValidationRole::System,
            token_count: c.token_count,
        }));
        tokens.extend(self.recent.iter().map(Message::as_tokens));
        tokens
    }

    pub fn create_snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        snapshot.restore_into(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(limit: usize) -> ActiveContext {
        ActiveContext::new(Message::new(Role::System, "you are an agent", 10), limit)
    }

    #[test]
    fn add_message_accumulates_tokens() {
        let mut c = ctx(1000);
        c.add_message(Message::new(Role::User, "hi", 5)).unwrap();
        assert_eq!(c.token_count(), 15);
        assert_eq!(c.recent().len(), 1);
    }

    #[test]
    fn add_message_rejects_duplicate_id() {
        let mut c = ctx(1000);
        let m = Message::new(Role::User, "hi", 5);
        c.add_message(m.clone()).unwrap();
        let err = c.add_message(m).unwrap_err();
        assert!(matches!(err, CoreError::Invariant(_)));
    }

    #[test]
    fn add_message_rejects_capacity_overflow() {
        let mut c = ctx(20);
        c.add_message(Message::new(Role::User, "hi", 5)).unwrap();
        let err = c.add_message(Message::new(Role::User, "bye", 10)).unwrap_err();
        match err {
            CoreError::CapacityExceeded {
                tokens,
                limit,
                overage,
                ..
            } => {
                assert_eq!(tokens, 25);
                assert_eq!(limit, 20);
                assert_eq!(overage, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Unchanged on failure.
        assert_eq!(c.token_count(), 15);
    }

    #[test]
    fn apply_compression_is_atomic_and_increments_sequence() {
        let mut c = ctx(1000);
        let a = Message::new(Role::Assistant, "a", 50);
        let b = Message::new(Role::Assistant, "b", 50);
        let a_id = a.id;
        let b_id = b.id;
        c.add_message(a).unwrap();
        c.add_message(b).unwrap();

        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            summary: "summary".into(),
            level: 3,
            sequence: 0,
            token_count: 10,
            original_message_ids: vec![a_id, b_id],
            model: "test-model".into(),
        };
        c.apply_compression(&[a_id, b_id], checkpoint).unwrap();

        assert!(c.recent().is_empty());
        assert_eq!(c.checkpoints().len(), 1);
        assert_eq!(c.checkpoints()[0].sequence, 0);

        // A second compression gets the next sequence number.
        let d = Message::new(Role::Assistant, "d", 50);
        let d_id = d.id;
        c.add_message(d).unwrap();
        let checkpoint2 = Checkpoint {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            summary: "summary 2".into(),
            level: 3,
            sequence: 0,
            token_count: 10,
            original_message_ids: vec![d_id],
            model: "test-model".into(),
        };
        c.apply_compression(&[d_id], checkpoint2).unwrap();
        assert_eq!(c.checkpoints()[1].sequence, 1);
    }

    #[test]
    fn apply_compression_rejects_overlap_with_existing_checkpoint() {
        let mut c = ctx(1000);
        let a = Message::new(Role::Assistant, "a", 50);
        let a_id = a.id;
        c.add_message(a).unwrap();
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            summary: "s".into(),
            level: 3,
            sequence: 0,
            token_count: 10,
            original_message_ids: vec![a_id],
            model: "m".into(),
        };
        c.apply_compression(&[a_id], checkpoint.clone()).unwrap();

        let err = c.apply_compression(&[a_id], checkpoint).unwrap_err();
        assert!(matches!(err, CoreError::Invariant(_)));
    }

    #[test]
    fn clear_resets_to_system_prompt_only() {
        let mut c = ctx(1000);
        c.add_message(Message::new(Role::User, "hi", 5)).unwrap();
        c.clear();
        assert_eq!(c.token_count(), 10);
        assert!(c.recent().is_empty());
        assert!(c.checkpoints().is_empty());
    }
}
