use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dao::models::{RoomId, UserId},
    dto::ws::{ClientMessage, ServerMessage},
    services::{
        broadcast::send_to_one,
        coordinator::{self, ClientSession, EventError},
    },
    state::SharedState,
};

/// Handle the full lifecycle of a player WebSocket connection.
///
/// `scope_room` and `authenticated_user` come from the upgrade request and restrict
/// which `join_room` events the socket may send.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    scope_room: Option<RoomId>,
    authenticated_user: UserId,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut client = ClientSession::new(outbound_tx.clone(), scope_room, authenticated_user);
    info!(connection_id = %client.connection_id(), user_id = authenticated_user, room_id = ?scope_room, "socket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let event = match ClientMessage::from_json_str(&text) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(
                            connection_id = %client.connection_id(),
                            error = %err,
                            "failed to parse or validate client message"
                        );
                        continue;
                    }
                };

                let kind = event.kind();
                if let Err(err) = coordinator::handle_event(&state, &mut client, event).await {
                    if matches!(err, EventError::ConnectionClosed) {
                        info!(connection_id = %client.connection_id(), "connection closed while handling event, terminating");
                        break;
                    }
                    warn!(
                        user_id = ?client.user_id(),
                        room_id = ?client.room_id(),
                        event = kind,
                        error = %err,
                        "event rejected"
                    );
                    if let Some(reply) = err.reply()
                        && send_to_one(client.tx(), &ServerMessage::error(reply)).is_err()
                    {
                        break;
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                debug!(connection_id = %client.connection_id(), "client closed the socket");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %client.connection_id(), error = %err, "websocket error");
                break;
            }
        }
    }

    coordinator::disconnect(&state, &client);
    info!(
        connection_id = %client.connection_id(),
        user_id = ?client.user_id(),
        "socket disconnected"
    );

    drop(client);
    finalize(writer_task, outbound_tx).await;
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
