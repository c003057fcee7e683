//! Room broadcast hub: one broadcast channel per conversation room, plus
//! the membership map used to derive presence.
//!
//! A user is online in a room while at least one of their connections is a
//! member; presence transitions fire only on the first join and the last
//! leave of that user.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use relaychat_shared::protocol::ServerEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

const ROOM_EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
struct Room {
    events: broadcast::Sender<ServerEvent>,
    /// Connection id to user id.
    members: HashMap<Uuid, Uuid>,
}

impl Room {
    fn new() -> Self {
        let (events, _) = broadcast::channel(ROOM_EVENT_CAPACITY);
        Self {
            events,
            members: HashMap::new(),
        }
    }

    fn online_users(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.members.values().copied().collect();
        users.sort_unstable();
        users.dedup();
        users
    }
}

/// What a successful join hands back to the connection actor.
pub struct JoinOutcome {
    /// Subscription to the room's event feed.
    pub receiver: broadcast::Receiver<ServerEvent>,
    /// Every user online in the room, the joiner included.
    pub snapshot: Vec<Uuid>,
    /// Whether this join brought the user online in the room.
    pub newly_online: bool,
}

/// Cloneable handle over the shared room map.
#[derive(Debug, Clone, Default)]
pub struct RoomHub {
    rooms: Arc<RwLock<HashMap<Uuid, Room>>>,
}

impl RoomHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn_id` as a member of `room_id`. Returns `None` when
    /// the connection is already a member (joins are idempotent).
    #[must_use]
    pub fn join(&self, room_id: Uuid, conn_id: Uuid, user_id: Uuid) -> Option<JoinOutcome> {
        let mut rooms = self.rooms.write().expect("hub lock poisoned");
        let room = rooms.entry(room_id).or_insert_with(Room::new);
        if room.members.contains_key(&conn_id) {
            return None;
        }

        let newly_online = !room.members.values().any(|member| *member == user_id);
        room.members.insert(conn_id, user_id);
        Some(JoinOutcome {
            receiver: room.events.subscribe(),
            snapshot: room.online_users(),
            newly_online,
        })
    }

    /// Removes `conn_id` from `room_id`. Returns the member's user id and
    /// whether the user went offline in the room.
    #[must_use]
    pub fn leave(&self, room_id: Uuid, conn_id: Uuid) -> Option<(Uuid, bool)> {
        let mut rooms = self.rooms.write().expect("hub lock poisoned");
        let room = rooms.get_mut(&room_id)?;
        let user_id = room.members.remove(&conn_id)?;
        let went_offline = !room.members.values().any(|member| *member == user_id);
        if room.members.is_empty() {
            rooms.remove(&room_id);
        }
        Some((user_id, went_offline))
    }

    /// Removes `conn_id` from every room it joined. Returns, per room, the
    /// user id and whether the user went offline there.
    #[must_use]
    pub fn sweep(&self, conn_id: Uuid) -> Vec<(Uuid, Uuid, bool)> {
        let mut rooms = self.rooms.write().expect("hub lock poisoned");
        let mut departed = Vec::new();
        rooms.retain(|room_id, room| {
            if let Some(user_id) = room.members.remove(&conn_id) {
                let went_offline = !room.members.values().any(|member| *member == user_id);
                departed.push((*room_id, user_id, went_offline));
            }
            !room.members.is_empty()
        });
        departed
    }

    /// Whether `conn_id` is currently a member of `room_id`.
    #[must_use]
    pub fn is_member(&self, room_id: Uuid, conn_id: Uuid) -> bool {
        let rooms = self.rooms.read().expect("hub lock poisoned");
        rooms
            .get(&room_id)
            .is_some_and(|room| room.members.contains_key(&conn_id))
    }

    /// Broadcasts `event` to every member of `room_id`. A room with no
    /// members drops the event.
    pub fn broadcast(&self, room_id: Uuid, event: ServerEvent) {
        let rooms = self.rooms.read().expect("hub lock poisoned");
        if let Some(room) = rooms.get(&room_id) {
            let _ = room.events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_idempotent_per_connection() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(hub.join(room, conn, user).is_some());
        assert!(hub.join(room, conn, user).is_none());
        assert!(hub.is_member(room, conn));
    }

    #[test]
    fn second_connection_of_a_user_is_not_newly_online() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();

        let first = hub.join(room, Uuid::new_v4(), user).unwrap();
        assert!(first.newly_online);

        let second = hub.join(room, Uuid::new_v4(), user).unwrap();
        assert!(!second.newly_online);
        assert_eq!(second.snapshot, vec![user]);
    }

    #[test]
    fn user_goes_offline_only_with_the_last_connection() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();

        let _ = hub.join(room, conn_a, user).unwrap();
        let _ = hub.join(room, conn_b, user).unwrap();

        assert_eq!(hub.leave(room, conn_a), Some((user, false)));
        assert_eq!(hub.leave(room, conn_b), Some((user, true)));
    }

    #[test]
    fn sweep_reports_every_joined_room() {
        let hub = RoomHub::new();
        let conn = Uuid::new_v4();
        let user = Uuid::new_v4();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        let _ = hub.join(room_a, conn, user).unwrap();
        let _ = hub.join(room_b, conn, user).unwrap();

        let mut departed = hub.sweep(conn);
        departed.sort_by_key(|(room_id, _, _)| *room_id);
        assert_eq!(departed.len(), 2);
        assert!(departed.iter().all(|(_, u, offline)| *u == user && *offline));
        assert!(!hub.is_member(room_a, conn));
    }

    #[tokio::test]
    async fn broadcast_reaches_members() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut outcome = hub.join(room, Uuid::new_v4(), user).unwrap();

        hub.broadcast(
            room,
            ServerEvent::PresenceChanged {
                conversation_id: room,
                user_id: user,
                online: true,
            },
        );

        let event = outcome.receiver.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::PresenceChanged { .. }));
    }
}
