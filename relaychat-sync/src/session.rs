//! Per-conversation session wiring: one event loop owns the timeline and
//! serializes every mutation to it.
//!
//! The rendering path and the channel delivery path race in the original
//! problem; here both are funnelled through the session task's mpsc queue,
//! so merges can never interleave. A session is discarded wholesale on
//! conversation switch - its fetch task is cancelled, its send timers die
//! with the tracker, and its room is left.

use std::sync::Arc;
use std::time::Duration;

use relaychat_shared::models::Message;
use relaychat_shared::protocol::ServerEvent;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::{ChannelEvent, PushChannelHandle};
use crate::error::SyncError;
use crate::history::{HistoryPage, HistoryStore};
use crate::outbox::{DEFAULT_SEND_TIMEOUT, SendTracker};
use crate::presence::PresenceHandle;
use crate::timeline::{Timeline, TimelineEntry};

/// Immutable view of a session's timeline, published after every mutation.
#[derive(Debug, Clone)]
pub struct TimelineSnapshot {
    /// Render order: confirmed ascending, then local sends.
    pub entries: Vec<TimelineEntry>,
    /// Whether older history remains to be fetched.
    pub has_more: bool,
}

impl Default for TimelineSnapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            has_more: true,
        }
    }
}

enum SessionCommand {
    Submit {
        content: String,
        reply: oneshot::Sender<Message>,
    },
    ScrolledToOldest,
    Close,
}

/// Entry point for conversation views: opens one session per conversation
/// over a shared push channel and history store.
#[derive(Clone)]
pub struct ChatClient {
    history: Arc<dyn HistoryStore>,
    channel: PushChannelHandle,
    presence: PresenceHandle,
    local_user: Uuid,
    send_timeout: Duration,
}

impl ChatClient {
    /// Creates a client for `local_user` and starts the presence feed.
    #[must_use]
    pub fn new(
        history: Arc<dyn HistoryStore>,
        channel: PushChannelHandle,
        local_user: Uuid,
    ) -> Self {
        let presence = PresenceHandle::spawn(channel.subscribe());
        Self {
            history,
            channel,
            presence,
            local_user,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Overrides the optimistic-send confirmation timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// The live presence view across all joined rooms.
    #[must_use]
    pub fn presence(&self) -> PresenceHandle {
        self.presence.clone()
    }

    /// Opens a session on `conversation_id`: subscribes to the channel,
    /// joins the room, and starts the initial history fetch.
    #[must_use]
    pub fn open(&self, conversation_id: Uuid) -> SessionHandle {
        // Subscribe before joining so no room event can slip past.
        let events = self.channel.subscribe();
        let (tracker, expiry_rx) = SendTracker::new(self.send_timeout);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(TimelineSnapshot::default());
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

        if let Err(err) = self.channel.join(conversation_id) {
            warn!(%err, "room join could not be queued");
        }

        let session = ConversationSession {
            conversation_id,
            local_user: self.local_user,
            timeline: Timeline::new(conversation_id),
            tracker,
            history: Arc::clone(&self.history),
            channel: self.channel.clone(),
            snapshot_tx,
            fetch_tx,
            fetch_generation: 0,
            fetch_cancel: None,
        };
        tokio::spawn(session.run(command_rx, events, expiry_rx, fetch_rx));

        SessionHandle {
            conversation_id,
            commands: command_tx,
            snapshot: snapshot_rx,
        }
    }

    /// Tears down `previous` and opens the next conversation: the old room
    /// is left, its in-flight fetch is cancelled, and a fresh, empty
    /// timeline starts for `next`.
    #[must_use]
    pub fn switch(&self, previous: SessionHandle, next: Uuid) -> SessionHandle {
        previous.close();
        self.open(next)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("local_user", &self.local_user)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

/// Handle to one conversation's running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    conversation_id: Uuid,
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: watch::Receiver<TimelineSnapshot>,
}

impl SessionHandle {
    /// The conversation this session renders.
    #[must_use]
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Submits a message: a pending entry is inserted into the timeline and
    /// the push send is requested before this returns.
    ///
    /// # Errors
    /// Fails only if the session was closed.
    pub async fn submit(&self, content: impl Into<String>) -> Result<Message, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Submit {
                content: content.into(),
                reply: reply_tx,
            })
            .map_err(|_| SyncError::Internal("session is closed".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SyncError::Internal("session is closed".to_string()))
    }

    /// Notes that the visible window reached the oldest loaded message;
    /// at most one backward fetch starts per boundary-reach.
    pub fn scrolled_to_oldest(&self) {
        let _ = self.commands.send(SessionCommand::ScrolledToOldest);
    }

    /// The latest published timeline view.
    #[must_use]
    pub fn snapshot(&self) -> TimelineSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A watch over timeline updates, for render loops.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TimelineSnapshot> {
        self.snapshot.clone()
    }

    /// Closes the session: leaves the room, cancels the in-flight fetch,
    /// and drops all timers.
    pub fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close);
    }
}

struct FetchOutcome {
    generation: u64,
    result: Result<HistoryPage, SyncError>,
}

struct ConversationSession {
    conversation_id: Uuid,
    local_user: Uuid,
    timeline: Timeline,
    tracker: SendTracker,
    history: Arc<dyn HistoryStore>,
    channel: PushChannelHandle,
    snapshot_tx: watch::Sender<TimelineSnapshot>,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    fetch_generation: u64,
    fetch_cancel: Option<CancellationToken>,
}

impl ConversationSession {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut events: broadcast::Receiver<ChannelEvent>,
        mut expiry_rx: mpsc::UnboundedReceiver<Uuid>,
        mut fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    ) {
        // Load the most recent page straight away; the view starts at the
        // bottom of history.
        self.start_fetch();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(SessionCommand::Close) => {
                        self.teardown();
                        return;
                    }
                    Some(SessionCommand::Submit { content, reply }) => {
                        let message = self.handle_submit(content);
                        let _ = reply.send(message);
                    }
                    Some(SessionCommand::ScrolledToOldest) => {
                        self.timeline.scrolled_to_oldest();
                        if self.timeline.needs_more() {
                            self.start_fetch();
                        }
                    }
                },
                event = events.recv() => match event {
                    Ok(event) => self.handle_channel_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session lagged behind channel events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.teardown();
                        return;
                    }
                },
                Some(id) = expiry_rx.recv() => self.handle_expiry(id),
                Some(outcome) = fetch_rx.recv() => self.handle_fetch_outcome(outcome),
            }
        }
    }

    fn handle_submit(&mut self, content: String) -> Message {
        let message = self
            .tracker
            .submit(self.conversation_id, self.local_user, content);
        self.timeline.insert_pending(message.clone());

        if let Err(err) = self
            .channel
            .send_message(self.conversation_id, message.clone())
        {
            // Synchronous emit failure settles the send immediately, the
            // same way a confirmation timeout would.
            warn!(%err, message_id = %message.id, "optimistic send failed to queue");
            self.tracker.settle_failed(message.id);
            self.timeline.fail(message.id);
        }

        self.publish();
        message
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Server(ServerEvent::MessageReceived {
                conversation_id,
                message,
            }) if conversation_id == self.conversation_id => {
                self.tracker.confirm(message.id);
                self.timeline.confirm(message);
                self.publish();
            }
            ChannelEvent::SendFailed { message_id } => {
                if self.tracker.settle_failed(message_id) && self.timeline.fail(message_id) {
                    self.publish();
                }
            }
            // Presence is aggregated client-wide; other rooms' messages and
            // connection transitions need nothing from this session.
            _ => {}
        }
    }

    fn handle_expiry(&mut self, id: Uuid) {
        if self.tracker.settle_failed(id) {
            debug!(message_id = %id, "optimistic send timed out");
            if self.timeline.fail(id) {
                self.publish();
            }
        }
    }

    fn handle_fetch_outcome(&mut self, outcome: FetchOutcome) {
        if outcome.generation != self.fetch_generation {
            // A fetch superseded by a newer one; its result is stale.
            return;
        }
        self.fetch_cancel = None;
        match outcome.result {
            Ok(page) => {
                self.timeline.apply_history_page(page);
                self.publish();
            }
            Err(err) => {
                warn!(%err, "history fetch failed");
                self.timeline.abort_fetch();
            }
        }
    }

    fn start_fetch(&mut self) {
        let cursor = self.timeline.begin_fetch();
        self.fetch_generation += 1;
        let generation = self.fetch_generation;

        let token = CancellationToken::new();
        self.fetch_cancel = Some(token.clone());

        let history = Arc::clone(&self.history);
        let conversation_id = self.conversation_id;
        let outcomes = self.fetch_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                result = history.fetch_page(conversation_id, cursor) => {
                    let _ = outcomes.send(FetchOutcome { generation, result });
                }
            }
        });
    }

    fn teardown(&mut self) {
        if let Some(token) = self.fetch_cancel.take() {
            token.cancel();
        }
        if let Err(err) = self.channel.leave(self.conversation_id) {
            debug!(%err, "room leave could not be queued");
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(TimelineSnapshot {
            entries: self.timeline.entries(),
            has_more: self.timeline.has_more(),
        });
    }
}
