//! The merged, ordered, deduplicated view of one conversation's messages.
//!
//! Three inputs land here: history pages fetched backward from the REST
//! boundary, confirmed messages pushed over the channel, and optimistic
//! local sends. Identity is the client-minted message id; position is fully
//! determined by `(created_at, id)` for confirmed entries, so applying the
//! same message twice, or fetch-then-push versus push-then-fetch, converges
//! to the same state.

use std::collections::{BTreeMap, HashMap};

use relaychat_shared::models::{DeliveryState, Message, Timestamp};
use uuid::Uuid;

use crate::history::{HistoryPage, PageCursor};

/// One rendered row of the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    /// The message itself.
    pub message: Message,
    /// Its client-side delivery state.
    pub state: DeliveryState,
}

/// Where an id currently lives inside the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// In the confirmed ordering, keyed under this timestamp.
    Confirmed(Timestamp),
    /// In the local (pending/failed) tail.
    Local,
}

/// The merged timeline of a single conversation.
///
/// Confirmed entries sort ascending by `(created_at, id)`; pending and
/// failed local sends keep submission order and always render after the
/// last confirmed entry. Exactly one entry exists per message id.
#[derive(Debug)]
pub struct Timeline {
    conversation_id: Uuid,
    confirmed: BTreeMap<(Timestamp, Uuid), Message>,
    local: Vec<TimelineEntry>,
    slots: HashMap<Uuid, Slot>,
    cursor: PageCursor,
    has_more: bool,
    fetch_in_flight: bool,
    boundary_reached: bool,
}

impl Timeline {
    /// An empty timeline for `conversation_id`, with nothing loaded.
    #[must_use]
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            confirmed: BTreeMap::new(),
            local: Vec::new(),
            slots: HashMap::new(),
            cursor: PageCursor::none(),
            has_more: true,
            fetch_in_flight: false,
            boundary_reached: false,
        }
    }

    /// The conversation this timeline renders.
    #[must_use]
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Inserts a freshly submitted optimistic send at the tail.
    ///
    /// A duplicate id is ignored; ids are minted per submission and never
    /// reused, so a collision here means the caller resent a message.
    pub fn insert_pending(&mut self, message: Message) {
        if self.slots.contains_key(&message.id) {
            return;
        }
        self.slots.insert(message.id, Slot::Local);
        self.local.push(TimelineEntry {
            message,
            state: DeliveryState::Pending,
        });
    }

    /// Merges a server-confirmed copy of a message, wherever it came from.
    ///
    /// - unknown id: inserted as a fresh confirmed entry (another session
    ///   may have sent it);
    /// - pending id: the local entry is replaced by the server copy, whose
    ///   fields (notably `created_at`) are authoritative;
    /// - failed id: dropped - a send the client already gave up on stays
    ///   failed, even if it turns out to have succeeded server-side;
    /// - confirmed id: replaced in place, position recomputed.
    pub fn confirm(&mut self, message: Message) {
        match self.slots.get(&message.id).copied() {
            None => self.insert_confirmed(message),
            Some(Slot::Local) => {
                let index = self
                    .local
                    .iter()
                    .position(|entry| entry.message.id == message.id)
                    .expect("slot map says id is local");
                if self.local[index].state == DeliveryState::Failed {
                    return;
                }
                self.local.remove(index);
                self.slots.remove(&message.id);
                self.insert_confirmed(message);
            }
            Some(Slot::Confirmed(old_key)) => {
                self.confirmed.remove(&(old_key, message.id));
                self.slots.remove(&message.id);
                self.insert_confirmed(message);
            }
        }
    }

    fn insert_confirmed(&mut self, message: Message) {
        self.slots
            .insert(message.id, Slot::Confirmed(message.created_at));
        self.confirmed
            .insert((message.created_at, message.id), message);
    }

    /// Marks a pending send as failed. Returns false if the id is not a
    /// pending local entry (already confirmed, already failed, or unknown).
    pub fn fail(&mut self, id: Uuid) -> bool {
        if self.slots.get(&id) != Some(&Slot::Local) {
            return false;
        }
        let entry = self
            .local
            .iter_mut()
            .find(|entry| entry.message.id == id)
            .expect("slot map says id is local");
        if entry.state != DeliveryState::Pending {
            return false;
        }
        entry.state = DeliveryState::Failed;
        true
    }

    /// Notes that the visible window scrolled to the oldest loaded message.
    pub fn scrolled_to_oldest(&mut self) {
        self.boundary_reached = true;
    }

    /// Whether a backward page fetch should start now: the scroll boundary
    /// was reached, older history exists, and no fetch is in flight.
    /// Arms once per boundary-reach; [`Timeline::begin_fetch`] consumes it.
    #[must_use]
    pub fn needs_more(&self) -> bool {
        self.boundary_reached && self.has_more && !self.fetch_in_flight
    }

    /// Latches the in-flight fetch and returns the cursor to fetch at.
    pub fn begin_fetch(&mut self) -> PageCursor {
        self.fetch_in_flight = true;
        self.boundary_reached = false;
        self.cursor.clone()
    }

    /// Clears the in-flight latch after a failed fetch.
    pub fn abort_fetch(&mut self) {
        self.fetch_in_flight = false;
    }

    /// Merges a fetched history page and advances the cursor.
    pub fn apply_history_page(&mut self, page: HistoryPage) {
        for message in page.messages {
            self.confirm(message);
        }
        self.cursor = page.next_cursor;
        self.has_more = page.has_more;
        self.fetch_in_flight = false;
        self.boundary_reached = false;
    }

    /// Whether older history remains to be fetched.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Looks up an entry by message id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<TimelineEntry> {
        match self.slots.get(&id)? {
            Slot::Confirmed(key) => self.confirmed.get(&(*key, id)).map(|message| TimelineEntry {
                message: message.clone(),
                state: DeliveryState::Confirmed,
            }),
            Slot::Local => self
                .local
                .iter()
                .find(|entry| entry.message.id == id)
                .cloned(),
        }
    }

    /// Number of entries across both the confirmed order and the local tail.
    #[must_use]
    pub fn len(&self) -> usize {
        self.confirmed.len() + self.local.len()
    }

    /// Whether the timeline holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The render order: confirmed ascending by `(created_at, id)`, then
    /// local sends in submission order.
    #[must_use]
    pub fn entries(&self) -> Vec<TimelineEntry> {
        let mut entries: Vec<TimelineEntry> = self
            .confirmed
            .values()
            .map(|message| TimelineEntry {
                message: message.clone(),
                state: DeliveryState::Confirmed,
            })
            .collect();
        entries.extend(self.local.iter().cloned());
        entries
    }
}
