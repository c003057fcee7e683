use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Message;

/// A direct-message conversation between a set of participants.
///
/// Owned by the persistence boundary; the sync core only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier of the conversation.
    pub id: Uuid,
    /// Users participating in the conversation.
    pub participants: Vec<Uuid>,
    /// Most recent message, if any has been sent.
    pub last_message: Option<Message>,
}

impl Conversation {
    /// Whether `user_id` participates in this conversation.
    #[must_use]
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_lookup() {
        let member = Uuid::new_v4();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: vec![member, Uuid::new_v4()],
            last_message: None,
        };

        assert!(conversation.has_participant(member));
        assert!(!conversation.has_participant(Uuid::new_v4()));
    }
}
