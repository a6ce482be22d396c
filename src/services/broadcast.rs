use axum::extract::ws::{Message, Utf8Bytes};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{dao::models::RoomId, dto::ws::ServerMessage, state::ConnectionRegistry};

/// The socket writer of the recipient has shut down.
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload.into()),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            None
        }
    }
}

/// Push `message` to a single socket.
///
/// Serialization failures are logged and swallowed; only a closed writer is reported.
pub fn send_to_one(
    tx: &mpsc::UnboundedSender<Message>,
    message: &ServerMessage,
) -> Result<(), ConnectionClosed> {
    let Some(payload) = encode(message) else {
        return Ok(());
    };
    tx.send(Message::Text(payload)).map_err(|_| ConnectionClosed)
}

/// Deliver `message` to every open socket joined to `room_id`, returning the number reached.
pub fn broadcast(registry: &ConnectionRegistry, room_id: RoomId, message: &ServerMessage) -> usize {
    let Some(payload) = encode(message) else {
        return 0;
    };

    let mut delivered = 0;
    for connection in registry.members_of(room_id) {
        if connection.tx.send(Message::Text(payload.clone())).is_ok() {
            delivered += 1;
        } else {
            debug!(
                room_id,
                user_id = connection.user_id,
                "skipping closed connection during broadcast"
            );
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::Connection;

    fn register(
        registry: &ConnectionRegistry,
        user_id: i64,
        room_id: RoomId,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(Connection {
            id: Uuid::new_v4(),
            user_id,
            room_id,
            tx,
        });
        rx
    }

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn broadcast_reaches_only_the_room() {
        let registry = ConnectionRegistry::new();
        let mut a = register(&registry, 1, 10);
        let mut b = register(&registry, 2, 10);
        let mut other = register(&registry, 3, 11);

        let delivered = broadcast(&registry, 10, &ServerMessage::game_update(10));

        assert_eq!(delivered, 2);
        let expected = r#"{"type":"game_update","roomId":10}"#;
        assert_eq!(text(a.try_recv().unwrap()), expected);
        assert_eq!(text(b.try_recv().unwrap()), expected);
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn broadcast_skips_closed_sockets() {
        let registry = ConnectionRegistry::new();
        let closed = register(&registry, 1, 10);
        let mut open = register(&registry, 2, 10);
        drop(closed);

        assert_eq!(broadcast(&registry, 10, &ServerMessage::game_update(10)), 1);
        assert!(open.try_recv().is_ok());
    }

    #[test]
    fn unicast_reports_closed_writer() {
        let (tx, rx) = mpsc::unbounded_channel();
        send_to_one(&tx, &ServerMessage::error("nope")).unwrap();
        drop(rx);
        assert!(send_to_one(&tx, &ServerMessage::error("nope")).is_err());
    }
}
