//! relaychat-sync: the client-side message synchronization core.
//!
//! Reconciles three message sources into one ordered, deduplicated,
//! infinitely-scrollable timeline per conversation:
//!
//! - durable history fetched page-by-page over HTTP ([`history`]),
//! - live messages pushed over a persistent websocket ([`channel`]),
//! - locally-originated optimistic sends awaiting confirmation ([`outbox`]).
//!
//! [`session`] wires the three together behind a single-writer event loop;
//! [`presence`] maintains the online set per joined room.

pub mod channel;
pub mod debounce;
pub mod error;
pub mod history;
pub mod outbox;
pub mod presence;
pub mod session;
pub mod timeline;
pub mod transport;

pub use channel::{ChannelConfig, ChannelEvent, ConnectionState, PushChannel, PushChannelHandle};
pub use debounce::Debouncer;
pub use error::SyncError;
pub use history::{HistoryPage, HistoryStore, HttpHistoryStore, PageCursor};
pub use presence::PresenceHandle;
pub use session::{ChatClient, SessionHandle, TimelineSnapshot};
pub use timeline::{Timeline, TimelineEntry};
pub use transport::{Connector, Transport, WsConnector};
