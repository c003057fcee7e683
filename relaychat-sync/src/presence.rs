//! The live presence set per joined room, derived from channel events.
//!
//! The channel is the source of truth; this is a cache with eventual
//! consistency. Every reconnect starts a new epoch: the room's set is
//! discarded and nobody reports online until the server's next full
//! announcement ([`ServerEvent::PresenceSnapshot`]) anchors the epoch, so
//! deltas from before the drop can never bleed into the world after it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use relaychat_shared::protocol::ServerEvent;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::channel::ChannelEvent;

#[derive(Debug, Default)]
struct RoomPresence {
    /// Set once the epoch's snapshot arrives; deltas before it are dropped.
    anchored: bool,
    online: HashSet<Uuid>,
}

/// Aggregates presence events into per-room online sets.
#[derive(Debug, Default)]
pub struct PresenceAggregator {
    rooms: HashMap<Uuid, RoomPresence>,
    generation: u64,
}

impl PresenceAggregator {
    /// An empty aggregator; nothing is online until events arrive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one channel event into the presence view.
    pub fn apply(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Connected { generation } => {
                // New connection epoch: the server-side presence world may
                // have changed while we were away. Forget everything and
                // wait for fresh snapshots.
                self.generation = *generation;
                for room in self.rooms.values_mut() {
                    room.anchored = false;
                    room.online.clear();
                }
                debug!(generation, "presence reset for new connection epoch");
            }
            ChannelEvent::Server(ServerEvent::PresenceSnapshot {
                conversation_id,
                online,
            }) => {
                let room = self.rooms.entry(*conversation_id).or_default();
                room.online = online.iter().copied().collect();
                room.anchored = true;
            }
            ChannelEvent::Server(ServerEvent::PresenceChanged {
                conversation_id,
                user_id,
                online,
            }) => {
                let room = self.rooms.entry(*conversation_id).or_default();
                if !room.anchored {
                    // No snapshot for this epoch yet; the delta's baseline
                    // is unknown, so it cannot be applied.
                    return;
                }
                if *online {
                    room.online.insert(*user_id);
                } else {
                    room.online.remove(user_id);
                }
            }
            ChannelEvent::Disconnected
            | ChannelEvent::Server(ServerEvent::MessageReceived { .. })
            | ChannelEvent::SendFailed { .. } => {}
        }
    }

    /// Whether `user_id` is currently known online in `conversation_id`.
    /// Always false between a reconnect and the room's next snapshot.
    #[must_use]
    pub fn is_online(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.rooms
            .get(&conversation_id)
            .is_some_and(|room| room.anchored && room.online.contains(&user_id))
    }

    /// Every user currently known online in `conversation_id`.
    #[must_use]
    pub fn online_users(&self, conversation_id: Uuid) -> Vec<Uuid> {
        self.rooms
            .get(&conversation_id)
            .filter(|room| room.anchored)
            .map(|room| room.online.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Shared, read-side handle over an aggregator fed by a channel
/// subscription task (see [`crate::session::ChatClient`]).
#[derive(Debug, Clone, Default)]
pub struct PresenceHandle {
    inner: Arc<RwLock<PresenceAggregator>>,
}

impl PresenceHandle {
    /// Creates the handle and spawns the feeding task over `events`.
    #[must_use]
    pub fn spawn(mut events: broadcast::Receiver<ChannelEvent>) -> Self {
        let handle = Self::default();
        let inner = Arc::clone(&handle.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Ok(mut aggregator) = inner.write() {
                            aggregator.apply(&event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "presence feed lagged behind channel events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        handle
    }

    /// Whether `user_id` is currently known online in `conversation_id`.
    #[must_use]
    pub fn is_online(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.inner
            .read()
            .map(|aggregator| aggregator.is_online(conversation_id, user_id))
            .unwrap_or(false)
    }

    /// Every user currently known online in `conversation_id`.
    #[must_use]
    pub fn online_users(&self, conversation_id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .map(|aggregator| aggregator.online_users(conversation_id))
            .unwrap_or_default()
    }
}
