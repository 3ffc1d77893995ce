//! Immutable point-in-time captures of an [`ActiveContext`], used for
//! rollback when a mode transition or a failed compression needs to undo
//! itself.

use uuid::Uuid;

use super::{ActiveContext, Checkpoint, Message};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: Uuid,
    system_prompt: Message,
    checkpoints: Vec<Checkpoint>,
    recent: Vec<Message>,
    hard_limit: usize,
    next_sequence: u64,
    token_count: usize,
}

impl Snapshot {
    pub(super) fn capture(context: &ActiveContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_prompt: context.system_prompt.clone(),
            checkpoints: context.checkpoints.clone(),
            recent: context.recent.clone(),
            hard_limit: context.hard_limit,
            next_sequence: context.next_sequence,
            token_count: context.token_count(),
        }
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub(super) fn restore_into(self, context: &mut ActiveContext) {
        context.system_prompt = self.system_prompt;
        context.checkpoints = self.checkpoints;
        context.recent = self.recent;
        context.hard_limit = self.hard_limit;
        context.next_sequence = self.next_sequence;
    }
}

#[cfg(test)]
mod tests {
    use super::super::Role;
    use super::*;

    #[test]
    fn snapshot_round_trips_state() {
        let mut context = ActiveContext::new(Message::new(Role::System, "sp", 10), 1000);
        context
            .add_message(Message::new(Role::User, "hi", 5))
            .unwrap();
        let snapshot = context.create_snapshot();
        assert_eq!(snapshot.token_count(), 15);

        context
            .add_message(Message::new(Role::User, "more", 5))
            .unwrap();
        assert_eq!(context.token_count(), 20);

        context.restore(snapshot);
        assert_eq!(context.token_count(), 15);
        assert_eq!(context.recent().len(), 1);
    }
}
