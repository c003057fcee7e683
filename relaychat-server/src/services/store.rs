//! In-memory chat store: users, sessions, conversations, and ordered
//! message history. A persistence engine can replace this behind the same
//! surface; handlers never see the locking.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use relaychat_shared::models::{
    Conversation, HistoryMessage, Message, SearchUser, Timestamp, UserProfile,
};
use uuid::Uuid;

/// A registered user: the public profile plus fields only the server keeps.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub profile: UserProfile,
    pub email: String,
}

#[derive(Debug, Default)]
struct StoreInner {
    users: HashMap<Uuid, UserAccount>,
    sessions: HashMap<String, Uuid>,
    conversations: HashMap<Uuid, Conversation>,
    /// Per conversation, ascending by (`created_at`, id).
    messages: HashMap<Uuid, Vec<Message>>,
}

/// Cloneable handle over the shared store.
#[derive(Debug, Clone, Default)]
pub struct ChatStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ChatStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, account: UserAccount) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.users.insert(account.profile.user_id, account);
    }

    pub fn insert_session(&self, token: impl Into<String>, user_id: Uuid) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.sessions.insert(token.into(), user_id);
    }

    pub fn insert_conversation(&self, conversation: Conversation) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.conversations.insert(conversation.id, conversation);
    }

    /// Seeds a message verbatim, keeping its `created_at`. Used for history
    /// backfill; live sends go through [`ChatStore::append_message`].
    pub fn insert_message(&self, message: Message) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let log = inner.messages.entry(message.conversation_id).or_default();
        let key = (message.created_at, message.id);
        let position = log.partition_point(|m| (m.created_at, m.id) <= key);
        log.insert(position, message);
    }

    #[must_use]
    pub fn resolve_session(&self, token: &str) -> Option<Uuid> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.sessions.get(token).copied()
    }

    #[must_use]
    pub fn user(&self, user_id: Uuid) -> Option<UserAccount> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.users.get(&user_id).cloned()
    }

    /// Stamps the server-authoritative `created_at` and appends the message
    /// to its conversation's log. The client-minted id is kept unchanged.
    #[must_use]
    pub fn append_message(&self, mut message: Message) -> Message {
        message.created_at = Timestamp::now();
        self.insert_message(message.clone());
        message
    }

    /// One newest-to-oldest page of a conversation's history. An unknown
    /// conversation is indistinguishable from an empty one.
    #[must_use]
    pub fn history_page(&self, conversation_id: Uuid, skip: u64, take: u64) -> Vec<HistoryMessage> {
        let inner = self.inner.read().expect("store lock poisoned");
        let Some(log) = inner.messages.get(&conversation_id) else {
            return Vec::new();
        };
        log.iter()
            .rev()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(take).unwrap_or(usize::MAX))
            .map(|message| HistoryMessage {
                id: message.id,
                content: message.content.clone(),
                created_at: message.created_at,
                sender: inner
                    .users
                    .get(&message.sender_id)
                    .map_or_else(|| placeholder_profile(message.sender_id), |account| {
                        account.profile.clone()
                    }),
            })
            .collect()
    }

    /// Case-insensitive substring search over username, email, and display
    /// name, ordered by username for stable paging.
    #[must_use]
    pub fn search_users(&self, query: &str, skip: usize, take: usize) -> Vec<SearchUser> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().expect("store lock poisoned");

        let mut matches: Vec<&UserAccount> = inner
            .users
            .values()
            .filter(|account| {
                account.profile.username.to_lowercase().contains(&needle)
                    || account.email.to_lowercase().contains(&needle)
                    || account.profile.name.to_lowercase().contains(&needle)
            })
            .collect();
        matches.sort_by(|a, b| a.profile.username.cmp(&b.profile.username));

        matches
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|account| SearchUser {
                user_id: account.profile.user_id,
                username: account.profile.username.clone(),
                name: account.profile.name.clone(),
                profile_picture: account.profile.profile_picture.clone(),
            })
            .collect()
    }
}

/// Stand-in profile for a sender no longer present in the identity store.
fn placeholder_profile(user_id: Uuid) -> UserProfile {
    UserProfile {
        user_id,
        username: String::new(),
        name: String::new(),
        profile_picture: String::new(),
    }
}
