//! Websocket endpoint: one actor per connection, fanning room broadcasts
//! into the socket and client events out to the hub.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use relaychat_shared::models::Message;
use relaychat_shared::protocol::{ClientEvent, ServerEvent};
use tokio_stream::{StreamMap, wrappers::BroadcastStream, wrappers::errors::BroadcastStreamRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::middleware::auth::{SESSION_COOKIE, extract_session_cookie};

/// Upgrades to a websocket and runs the connection actor.
///
/// A session cookie, when present and valid, binds the connection to that
/// user; otherwise the connection gets an anonymous identity. Presence and
/// message routing work either way.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = extract_session_cookie(&headers, SESSION_COOKIE)
        .and_then(|token| state.store.resolve_session(&token))
        .unwrap_or_else(Uuid::new_v4);
    ws.on_upgrade(move |socket| handle_connection(state, socket, user_id))
}

async fn handle_connection(state: Arc<AppState>, socket: WebSocket, user_id: Uuid) {
    let conn_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let mut rooms: StreamMap<Uuid, BroadcastStream<ServerEvent>> = StreamMap::new();
    debug!(%conn_id, %user_id, "websocket connected");

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        if handle_client_event(&state, &mut sink, &mut rooms, conn_id, user_id, event)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(err) => debug!(%conn_id, %err, "dropping malformed client frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                // Ping/pong is answered by the websocket layer itself.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(%conn_id, %err, "websocket read error");
                    break;
                }
            },
            Some((room_id, event)) = rooms.next(), if !rooms.is_empty() => match event {
                Ok(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(%conn_id, %room_id, skipped, "connection lagged behind room broadcast");
                }
            },
        }
    }

    // Membership sweep: the connection is gone from every room, and users
    // left without another connection go offline.
    for (room_id, member, went_offline) in state.hub.sweep(conn_id) {
        if went_offline {
            state.hub.broadcast(
                room_id,
                ServerEvent::PresenceChanged {
                    conversation_id: room_id,
                    user_id: member,
                    online: false,
                },
            );
        }
    }
    debug!(%conn_id, "websocket disconnected");
}

async fn handle_client_event(
    state: &Arc<AppState>,
    sink: &mut SplitSink<WebSocket, WsMessage>,
    rooms: &mut StreamMap<Uuid, BroadcastStream<ServerEvent>>,
    conn_id: Uuid,
    user_id: Uuid,
    event: ClientEvent,
) -> Result<(), axum::Error> {
    match event {
        ClientEvent::Join { conversation_id } => {
            let Some(outcome) = state.hub.join(conversation_id, conn_id, user_id) else {
                // Already a member; nothing to replay.
                return Ok(());
            };
            rooms.insert(conversation_id, BroadcastStream::new(outcome.receiver));

            // The joiner gets the full presence picture first; the room
            // then hears about the arrival.
            send_event(
                sink,
                &ServerEvent::PresenceSnapshot {
                    conversation_id,
                    online: outcome.snapshot,
                },
            )
            .await?;
            if outcome.newly_online {
                state.hub.broadcast(
                    conversation_id,
                    ServerEvent::PresenceChanged {
                        conversation_id,
                        user_id,
                        online: true,
                    },
                );
            }
        }
        ClientEvent::Leave { conversation_id } => {
            rooms.remove(&conversation_id);
            if let Some((member, went_offline)) = state.hub.leave(conversation_id, conn_id) {
                if went_offline {
                    state.hub.broadcast(
                        conversation_id,
                        ServerEvent::PresenceChanged {
                            conversation_id,
                            user_id: member,
                            online: false,
                        },
                    );
                }
            }
        }
        ClientEvent::SendMessage { room_id, message } => {
            if !state.hub.is_member(room_id, conn_id) {
                debug!(%conn_id, %room_id, "dropping send to an unjoined room");
                return Ok(());
            }
            let message = Message {
                conversation_id: room_id,
                ..message
            };
            // The store stamps the authoritative timestamp; the client's
            // id survives so the sender can reconcile its pending copy.
            let stored = state.store.append_message(message);
            state.hub.broadcast(
                room_id,
                ServerEvent::MessageReceived {
                    conversation_id: room_id,
                    message: stored,
                },
            );
        }
    }
    Ok(())
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event)
        .map_err(axum::Error::new)?;
    sink.send(WsMessage::Text(json.into())).await
}
