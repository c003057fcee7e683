//! The persistent push channel: room joins, outbound sends, inbound event
//! fan-out, and auto-reconnect with backoff.
//!
//! A single driver task owns the transport. Callers talk to it through a
//! [`PushChannelHandle`]: commands go in over an mpsc queue, server events
//! come back out over a broadcast channel in transport delivery order, and
//! the connection state is observable on a watch.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use relaychat_shared::models::Message;
use relaychat_shared::protocol::{ClientEvent, ServerEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::transport::{Connector, Transport};

/// Connection lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, and no attempt in progress. Terminal once the retry
    /// budget is exhausted.
    Disconnected,
    /// A connection attempt (or reconnect backoff) is in progress.
    Connecting,
    /// Connected; joins are registered and sends flow.
    Connected,
}

/// Events fanned out to channel subscribers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The channel (re)connected. The generation increments on every
    /// successful connect, so subscribers can tell presence epochs apart.
    Connected {
        /// Connection epoch, starting at 1.
        generation: u64,
    },
    /// The connection dropped (a reconnect may follow) or the channel shut
    /// down for good.
    Disconnected,
    /// An event pushed by the server, in transport delivery order.
    Server(ServerEvent),
    /// An outbound message could not be written to the wire.
    SendFailed {
        /// Client-minted id of the message that failed to send.
        message_id: Uuid,
    },
}

/// Tuning for the reconnect loop.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Connection attempts per disconnection before giving up.
    pub max_connect_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub base_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 6,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
        }
    }
}

enum Command {
    Join(Uuid),
    Leave(Uuid),
    Send { room_id: Uuid, message: Message },
    Shutdown,
}

/// Spawns push channel driver tasks.
#[derive(Debug)]
pub struct PushChannel;

impl PushChannel {
    /// Spawns the driver over `connector` and returns the caller handle.
    pub fn spawn<C: Connector>(connector: C, config: ChannelConfig) -> PushChannelHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(256);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let events = event_tx.clone();
        tokio::spawn(drive(connector, config, command_rx, events, state_tx));

        PushChannelHandle {
            commands: command_tx,
            events: event_tx,
            state: state_rx,
        }
    }
}

/// Cloneable handle to a running push channel.
///
/// Room membership is counted per registration, not idempotent: every
/// [`join`](Self::join) must be balanced by one [`leave`](Self::leave).
/// On the wire the membership stays level-triggered regardless of how
/// many handles registered, so opening a new session on a room before
/// the old session's teardown has left it never drops the subscription.
#[derive(Debug, Clone)]
pub struct PushChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ChannelEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl PushChannelHandle {
    /// Subscribes to channel events from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A watch over connection state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Registers interest in a conversation's room. Interest is counted:
    /// the wire join goes out on the first registration, and the room is
    /// re-joined automatically after every reconnect while any interest
    /// remains.
    ///
    /// # Errors
    /// Fails only if the channel task has exited.
    pub fn join(&self, conversation_id: Uuid) -> Result<(), SyncError> {
        self.command(Command::Join(conversation_id))
    }

    /// Drops one registration of interest in a conversation's room; the
    /// wire leave goes out when the last one is dropped.
    ///
    /// # Errors
    /// Fails only if the channel task has exited.
    pub fn leave(&self, conversation_id: Uuid) -> Result<(), SyncError> {
        self.command(Command::Leave(conversation_id))
    }

    /// Queues a message for fire-and-forget delivery to a joined room.
    ///
    /// # Errors
    /// Returns [`SyncError::Transient`] immediately when the channel is not
    /// connected; a later write failure surfaces as
    /// [`ChannelEvent::SendFailed`]. Either way the failure is observable
    /// to the send tracker.
    pub fn send_message(&self, room_id: Uuid, message: Message) -> Result<(), SyncError> {
        if self.state() != ConnectionState::Connected {
            return Err(SyncError::Transient(
                "push channel is not connected".to_string(),
            ));
        }
        self.command(Command::Send { room_id, message })
    }

    /// Shuts the channel down; pending commands are dropped.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn command(&self, command: Command) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::Internal("push channel task has exited".to_string()))
    }
}

async fn drive<C: Connector>(
    connector: C,
    config: ChannelConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<ChannelEvent>,
    state: watch::Sender<ConnectionState>,
) {
    // Room id to interest count; sessions pair every join with a leave, so
    // the wire membership follows the count's zero crossings.
    let mut joined: HashMap<Uuid, u32> = HashMap::new();
    let mut generation: u64 = 0;

    loop {
        state.send_replace(ConnectionState::Connecting);
        let Some(mut transport) = connect_with_backoff(&connector, &config).await else {
            warn!("push channel retry budget exhausted; staying disconnected");
            state.send_replace(ConnectionState::Disconnected);
            let _ = events.send(ChannelEvent::Disconnected);
            return;
        };

        // Joined rooms survive the drop; replay them before anything else
        // so room-scoped events resume without caller involvement.
        let mut replay_failed = false;
        for room in joined.keys() {
            if let Err(err) = transport.send(ClientEvent::Join {
                conversation_id: *room,
            })
            .await
            {
                warn!(%err, room = %room, "join replay failed; reconnecting");
                replay_failed = true;
                break;
            }
        }
        if replay_failed {
            let _ = events.send(ChannelEvent::Disconnected);
            continue;
        }

        generation += 1;
        state.send_replace(ConnectionState::Connected);
        let _ = events.send(ChannelEvent::Connected { generation });
        info!(generation, "push channel connected");

        let shutdown = run_connected(&mut transport, &mut commands, &events, &mut joined).await;
        let _ = events.send(ChannelEvent::Disconnected);
        if shutdown {
            state.send_replace(ConnectionState::Disconnected);
            return;
        }
        debug!("push channel connection lost; reconnecting");
    }
}

/// Runs one connected episode. Returns true when the channel should shut
/// down instead of reconnecting.
async fn run_connected<T: Transport>(
    transport: &mut T,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &broadcast::Sender<ChannelEvent>,
    joined: &mut HashMap<Uuid, u32>,
) -> bool {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => return true,
                Some(Command::Join(room)) => {
                    let count = joined.entry(room).or_insert(0);
                    *count += 1;
                    if *count == 1
                        && transport.send(ClientEvent::Join { conversation_id: room }).await.is_err()
                    {
                        return false;
                    }
                }
                Some(Command::Leave(room)) => {
                    let last = match joined.get_mut(&room) {
                        Some(count) if *count > 1 => {
                            *count -= 1;
                            false
                        }
                        Some(_) => {
                            joined.remove(&room);
                            true
                        }
                        None => false,
                    };
                    if last
                        && transport.send(ClientEvent::Leave { conversation_id: room }).await.is_err()
                    {
                        return false;
                    }
                }
                Some(Command::Send { room_id, message }) => {
                    let message_id = message.id;
                    if transport.send(ClientEvent::SendMessage { room_id, message }).await.is_err() {
                        let _ = events.send(ChannelEvent::SendFailed { message_id });
                        return false;
                    }
                }
            },
            inbound = transport.next_event() => match inbound {
                Some(Ok(server_event)) => {
                    let _ = events.send(ChannelEvent::Server(server_event));
                }
                Some(Err(err)) => {
                    warn!(%err, "push channel read error");
                    return false;
                }
                None => return false,
            },
        }
    }
}

async fn connect_with_backoff<C: Connector>(
    connector: &C,
    config: &ChannelConfig,
) -> Option<C::Transport> {
    for attempt in 0..config.max_connect_attempts {
        match connector.connect().await {
            Ok(transport) => return Some(transport),
            Err(err) => {
                let delay = backoff_delay(config, attempt);
                warn!(attempt, %err, ?delay, "push channel connect failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
    None
}

fn backoff_delay(config: &ChannelConfig, attempt: u32) -> Duration {
    let exponential = config
        .base_backoff
        .saturating_mul(2u32.saturating_pow(attempt));
    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
    exponential.min(config.max_backoff) + jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relaychat_shared::models::Timestamp;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

    struct FakeTransport {
        outbound: UnboundedSender<ClientEvent>,
        inbound: UnboundedReceiver<Result<ServerEvent, SyncError>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&mut self, event: ClientEvent) -> Result<(), SyncError> {
            self.outbound
                .send(event)
                .map_err(|_| SyncError::Transient("fake wire closed".to_string()))
        }

        async fn next_event(&mut self) -> Option<Result<ServerEvent, SyncError>> {
            self.inbound.recv().await
        }
    }

    /// Hands out pre-scripted connections in order; connects fail once the
    /// script runs dry.
    #[derive(Clone)]
    struct ScriptedConnector {
        connections: Arc<Mutex<VecDeque<FakeTransport>>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = FakeTransport;

        async fn connect(&self) -> Result<FakeTransport, SyncError> {
            self.connections
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SyncError::Transient("connection refused".to_string()))
        }
    }

    struct WireEnd {
        sent: UnboundedReceiver<ClientEvent>,
        push: UnboundedSender<Result<ServerEvent, SyncError>>,
    }

    fn scripted(count: usize) -> (ScriptedConnector, Vec<WireEnd>) {
        let mut connections = VecDeque::new();
        let mut ends = Vec::new();
        for _ in 0..count {
            let (outbound_tx, outbound_rx) = unbounded_channel();
            let (inbound_tx, inbound_rx) = unbounded_channel();
            connections.push_back(FakeTransport {
                outbound: outbound_tx,
                inbound: inbound_rx,
            });
            ends.push(WireEnd {
                sent: outbound_rx,
                push: inbound_tx,
            });
        }
        (
            ScriptedConnector {
                connections: Arc::new(Mutex::new(connections)),
            },
            ends,
        )
    }

    fn quick_config() -> ChannelConfig {
        ChannelConfig {
            max_connect_attempts: 2,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        }
    }

    fn sample_message(conversation_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            content: "hello".to_string(),
            created_at: Timestamp::now(),
        }
    }

    async fn wait_connected(handle: &PushChannelHandle) {
        let mut state = handle.watch_state();
        state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn join_reaches_the_wire_once() {
        let (connector, mut ends) = scripted(1);
        let handle = PushChannel::spawn(connector, quick_config());
        wait_connected(&handle).await;

        let room = Uuid::new_v4();
        handle.join(room).unwrap();
        handle.join(room).unwrap(); // second interest, no second wire join

        let mut end = ends.remove(0);
        let first = end.sent.recv().await.unwrap();
        assert_eq!(first, ClientEvent::Join { conversation_id: room });
        // Yield so a (wrong) second join would have landed by now.
        tokio::task::yield_now().await;
        assert!(end.sent.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn room_is_left_only_with_the_last_interest() {
        let (connector, mut ends) = scripted(1);
        let handle = PushChannel::spawn(connector, quick_config());
        wait_connected(&handle).await;

        let room = Uuid::new_v4();
        handle.join(room).unwrap();
        handle.join(room).unwrap();
        handle.leave(room).unwrap();

        let mut end = ends.remove(0);
        assert_eq!(
            end.sent.recv().await.unwrap(),
            ClientEvent::Join { conversation_id: room }
        );
        tokio::task::yield_now().await;
        // One interest remains; no wire leave yet.
        assert!(end.sent.try_recv().is_err());

        handle.leave(room).unwrap();
        assert_eq!(
            end.sent.recv().await.unwrap(),
            ClientEvent::Leave { conversation_id: room }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_replays_joined_rooms() {
        let (connector, mut ends) = scripted(2);
        let handle = PushChannel::spawn(connector, quick_config());
        wait_connected(&handle).await;

        let room = Uuid::new_v4();
        handle.join(room).unwrap();

        let mut first = ends.remove(0);
        assert_eq!(
            first.sent.recv().await.unwrap(),
            ClientEvent::Join { conversation_id: room }
        );

        // Kill the first connection; the driver reconnects and replays.
        drop(first.push);
        let mut second = ends.remove(0);
        assert_eq!(
            second.sent.recv().await.unwrap(),
            ClientEvent::Join { conversation_id: room }
        );
        wait_connected(&handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn server_events_fan_out_in_order() {
        let (connector, mut ends) = scripted(1);
        let handle = PushChannel::spawn(connector, quick_config());
        let mut events = handle.subscribe();
        wait_connected(&handle).await;

        let conversation_id = Uuid::new_v4();
        let end = ends.remove(0);
        let m1 = sample_message(conversation_id);
        let m2 = sample_message(conversation_id);
        for message in [m1.clone(), m2.clone()] {
            end.push
                .send(Ok(ServerEvent::MessageReceived {
                    conversation_id,
                    message,
                }))
                .unwrap();
        }

        let mut seen = Vec::new();
        while seen.len() < 2 {
            if let ChannelEvent::Server(ServerEvent::MessageReceived { message, .. }) =
                events.recv().await.unwrap()
            {
                seen.push(message.id);
            }
        }
        assert_eq!(seen, vec![m1.id, m2.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_disconnected_fails_fast() {
        let (connector, _ends) = scripted(0);
        let handle = PushChannel::spawn(connector, quick_config());

        let room = Uuid::new_v4();
        let err = handle.send_message(room, sample_message(room)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retry_budget_is_terminal() {
        let (connector, _ends) = scripted(0);
        let handle = PushChannel::spawn(connector, quick_config());
        let mut events = handle.subscribe();

        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Disconnected
        ));
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_reaches_the_room() {
        let (connector, mut ends) = scripted(1);
        let handle = PushChannel::spawn(connector, quick_config());
        wait_connected(&handle).await;

        let room = Uuid::new_v4();
        let message = sample_message(room);
        handle.send_message(room, message.clone()).unwrap();

        let mut end = ends.remove(0);
        assert_eq!(
            end.sent.recv().await.unwrap(),
            ClientEvent::SendMessage {
                room_id: room,
                message
            }
        );
    }
}
