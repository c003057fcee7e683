//! Websocket wire protocol between chat clients and the room broadcast hub.
//!
//! Frames are JSON with an `event` discriminator and a `data` payload, e.g.
//! `{"event":"sendMessage","data":{"roomId":...,"message":{...}}}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events a client emits to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Register interest in a conversation's room. Idempotent.
    #[serde(rename = "join")]
    Join {
        /// Conversation whose room to join.
        conversation_id: Uuid,
    },

    /// Drop interest in a conversation's room. Idempotent.
    #[serde(rename = "leave")]
    Leave {
        /// Conversation whose room to leave.
        conversation_id: Uuid,
    },

    /// Publish a message to a joined room. Sends to a room the connection
    /// has not joined are dropped by the server.
    #[serde(rename = "sendMessage")]
    SendMessage {
        /// Room (conversation) to publish into.
        room_id: Uuid,
        /// The message, carrying its client-minted id.
        message: Message,
    },
}

/// Events the server pushes to connected clients, in room broadcast order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A message was accepted for a room the connection has joined. The
    /// message id is the client-minted id, echoed unchanged; `created_at`
    /// is the server's authoritative stamp.
    #[serde(rename = "message-received")]
    MessageReceived {
        /// Conversation the message belongs to.
        conversation_id: Uuid,
        /// The confirmed message.
        message: Message,
    },

    /// A user came online or went offline in a room.
    #[serde(rename = "presence-changed")]
    PresenceChanged {
        /// Conversation whose room changed.
        conversation_id: Uuid,
        /// The user whose presence changed.
        user_id: Uuid,
        /// Whether the user is now online.
        online: bool,
    },

    /// Full presence announcement for a room, sent to a connection right
    /// after its join is registered. Anchors the client's presence view
    /// for the current connection epoch.
    #[serde(rename = "presence-snapshot")]
    PresenceSnapshot {
        /// Conversation whose room is described.
        conversation_id: Uuid,
        /// Every user currently online in the room.
        online: Vec<Uuid>,
    },
}
