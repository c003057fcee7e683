use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Timestamp, UserProfile};

/// A single direct message on the wire.
///
/// The `id` is minted by the sending client so the message can render before
/// any server round trip; the server echoes it back unchanged, which is what
/// makes merging by id safe regardless of which path delivered the copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Client-minted unique identifier for the message.
    pub id: Uuid,

    /// ID of the conversation this message belongs to.
    pub conversation_id: Uuid,

    /// ID of the user who sent the message.
    pub sender_id: Uuid,

    /// The message content.
    pub content: String,

    /// When the message was created. Authoritative once server-confirmed.
    pub created_at: Timestamp,
}

/// Client-side delivery state of a message in a conversation timeline.
///
/// Wire messages are always `Confirmed`; `Pending` and `Failed` only ever
/// describe locally-originated sends that the server has not acknowledged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Submitted locally, awaiting server confirmation.
    Pending,
    /// Acknowledged by the server (or arrived from the server to begin with).
    Confirmed,
    /// The send errored or its confirmation timed out. Terminal.
    Failed,
}

/// One message row of the history fetch response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    /// Unique identifier of the message.
    pub id: Uuid,
    /// The message content.
    pub content: String,
    /// When the message was created.
    pub created_at: Timestamp,
    /// Profile of the sending user.
    pub sender: UserProfile,
}

/// Response body of `GET /api/messages/{conversation_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessagesResponse {
    /// One page of messages, newest first.
    pub messages: Vec<HistoryMessage>,
}

impl HistoryMessage {
    /// Flattens the history row into the wire [`Message`] shape.
    #[must_use]
    pub fn into_message(self, conversation_id: Uuid) -> Message {
        Message {
            id: self.id,
            conversation_id,
            sender_id: self.sender.user_id,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_profile() -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            username: "testuser".to_string(),
            name: "Test User".to_string(),
            profile_picture: "https://example.com/avatar.png".to_string(),
        }
    }

    #[test]
    fn message_serializes_camel_case() {
        let message = Message {
            id: Uuid::parse_str("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "Hello, world!".to_string(),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], "f47ac10b-58cc-4372-a567-0e02b2c3d479");
        assert_eq!(value["content"], "Hello, world!");
        assert!(value.get("conversationId").is_some());
        assert!(value.get("senderId").is_some());
        assert!(value.get("createdAt").is_some());

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn history_row_flattens_into_message() {
        let conversation_id = Uuid::new_v4();
        let sender = sample_profile();
        let row = HistoryMessage {
            id: Uuid::new_v4(),
            content: "hi".to_string(),
            created_at: Timestamp::now(),
            sender: sender.clone(),
        };

        let message = row.clone().into_message(conversation_id);
        assert_eq!(message.id, row.id);
        assert_eq!(message.conversation_id, conversation_id);
        assert_eq!(message.sender_id, sender.user_id);
        assert_eq!(message.content, "hi");
    }

    #[test]
    fn delivery_state_round_trips() {
        for state in [
            DeliveryState::Pending,
            DeliveryState::Confirmed,
            DeliveryState::Failed,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            let back: DeliveryState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, state);
        }
    }
}
