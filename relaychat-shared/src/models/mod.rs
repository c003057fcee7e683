pub mod conversation;
pub mod errors;
pub mod message;
pub mod timestamp;
pub mod user;

pub use conversation::Conversation;
pub use errors::ErrorBody;
pub use message::{DeliveryState, HistoryMessage, Message, MessagesResponse};
pub use timestamp::Timestamp;
pub use user::{SearchResponse, SearchUser, UserProfile};
