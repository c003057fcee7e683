//! relaychat-shared: types shared between the sync core and the server
//! (models, REST DTOs, websocket events, configuration). No I/O lives here.

pub mod config;
pub mod models;
pub mod protocol;

pub use models::{
    Conversation, DeliveryState, ErrorBody, HistoryMessage, Message, MessagesResponse,
    SearchResponse, SearchUser, Timestamp, UserProfile,
};
pub use protocol::{ClientEvent, ServerEvent};
