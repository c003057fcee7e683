//! Cursor-paginated access to a conversation's durable message history.

use async_trait::async_trait;
use relaychat_shared::models::{ErrorBody, Message, MessagesResponse};
use reqwest::header;
use uuid::Uuid;

use crate::error::SyncError;

/// Opaque pagination token marking the oldest-loaded message boundary.
///
/// A cursor is bound to the conversation it was produced for and moves only
/// backward in time; switching conversations starts over from
/// [`PageCursor::none`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    conversation_id: Option<Uuid>,
    offset: u64,
}

impl PageCursor {
    /// The "nothing loaded yet" cursor: fetching with it returns the most
    /// recent page.
    #[must_use]
    pub fn none() -> Self {
        Self {
            conversation_id: None,
            offset: 0,
        }
    }

    /// Whether no page has been consumed through this cursor yet.
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.conversation_id.is_none()
    }

    /// Resolves the skip offset for a fetch against `conversation_id`.
    ///
    /// # Errors
    /// Rejects a cursor that was produced for a different conversation.
    pub fn offset_for(&self, conversation_id: Uuid) -> Result<u64, SyncError> {
        match self.conversation_id {
            Some(bound) if bound != conversation_id => Err(SyncError::Validation(format!(
                "cursor is bound to conversation {bound}, not {conversation_id}"
            ))),
            _ => Ok(self.offset),
        }
    }

    /// The cursor after consuming `count` more messages of `conversation_id`.
    #[must_use]
    pub fn advanced(&self, conversation_id: Uuid, count: u64) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            offset: self.offset + count,
        }
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::none()
    }
}

/// One fetched page of history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Messages of the page, newest to oldest.
    pub messages: Vec<Message>,
    /// Cursor identifying the oldest message returned.
    pub next_cursor: PageCursor,
    /// Whether older history remains beyond this page.
    pub has_more: bool,
}

/// Read-only boundary to the durable message store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Fetches one page of `conversation_id`'s history at `cursor`,
    /// newest to oldest. Pure read; never retried here.
    ///
    /// # Errors
    /// [`SyncError::Authorization`] without a valid session,
    /// [`SyncError::NotFound`] if the conversation or cursor no longer
    /// resolves, [`SyncError::Transient`] for network/backend failures.
    async fn fetch_page(
        &self,
        conversation_id: Uuid,
        cursor: PageCursor,
    ) -> Result<HistoryPage, SyncError>;
}

/// [`HistoryStore`] over the REST boundary
/// (`GET /api/messages/{conversation_id}?skip&take`).
#[derive(Debug, Clone)]
pub struct HttpHistoryStore {
    client: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
    page_size: u16,
}

impl HttpHistoryStore {
    /// Creates a store client against `base_url` with the default page size.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            session_cookie: None,
            page_size: 10,
        }
    }

    /// Attaches the session cookie sent with every request.
    #[must_use]
    pub fn with_session(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Overrides the page size requested per fetch.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u16) -> Self {
        self.page_size = page_size;
        self
    }
}

#[async_trait]
impl HistoryStore for HttpHistoryStore {
    async fn fetch_page(
        &self,
        conversation_id: Uuid,
        cursor: PageCursor,
    ) -> Result<HistoryPage, SyncError> {
        let offset = cursor.offset_for(conversation_id)?;
        let url = format!(
            "{}/api/messages/{conversation_id}",
            self.base_url.trim_end_matches('/')
        );

        let mut request = self
            .client
            .get(url)
            .query(&[("skip", offset), ("take", u64::from(self.page_size))]);
        if let Some(cookie) = &self.session_cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(SyncError::from_status(status, message));
        }

        let body: MessagesResponse = response.json().await?;
        let messages: Vec<Message> = body
            .messages
            .into_iter()
            .map(|row| row.into_message(conversation_id))
            .collect();
        let count = messages.len() as u64;

        Ok(HistoryPage {
            next_cursor: cursor.advanced(conversation_id, count),
            has_more: count == u64::from(self.page_size),
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_cursor_resolves_for_any_conversation() {
        let cursor = PageCursor::none();
        assert!(cursor.is_start());
        assert_eq!(cursor.offset_for(Uuid::new_v4()).unwrap(), 0);
    }

    #[test]
    fn advanced_cursor_binds_to_its_conversation() {
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();

        let cursor = PageCursor::none().advanced(mine, 10);
        assert_eq!(cursor.offset_for(mine).unwrap(), 10);
        assert!(matches!(
            cursor.offset_for(theirs),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn cursor_advances_monotonically() {
        let conversation = Uuid::new_v4();
        let first = PageCursor::none().advanced(conversation, 10);
        let second = first.advanced(conversation, 7);
        assert_eq!(second.offset_for(conversation).unwrap(), 17);
    }
}
