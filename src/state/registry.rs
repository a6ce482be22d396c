use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dao::models::{RoomId, UserId};

/// Handle used to push messages to a connected player.
#[derive(Clone, Debug)]
pub struct Connection {
    /// Identifier of the underlying socket, distinct across reconnections.
    pub id: Uuid,
    pub user_id: UserId,
    pub room_id: RoomId,
    pub tx: mpsc::UnboundedSender<Message>,
}

impl Connection {
    /// Whether the socket writer is still accepting messages.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Live sockets keyed by the user they were joined as. One entry per user.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the entry it replaced for the same user.
    pub fn register(&self, connection: Connection) -> Option<Connection> {
        self.connections.insert(connection.user_id, connection)
    }

    /// Remove the entry of `user_id` only while it still points at `connection_id`.
    ///
    /// A socket closing after its user re-joined elsewhere must not evict the newer entry.
    pub fn unregister_if(&self, user_id: UserId, connection_id: Uuid) -> bool {
        self.connections
            .remove_if(&user_id, |_, connection| connection.id == connection_id)
            .is_some()
    }

    pub fn lookup(&self, user_id: UserId) -> Option<Connection> {
        self.connections
            .get(&user_id)
            .map(|entry| entry.value().clone())
    }

    /// Snapshot of the connections joined to `room_id`.
    pub fn members_of(&self, room_id: RoomId) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|entry| entry.room_id == room_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Whether `user_id` currently has a live socket joined to `room_id`.
    pub fn is_connected(&self, user_id: UserId, room_id: RoomId) -> bool {
        self.connections
            .get(&user_id)
            .is_some_and(|entry| entry.room_id == room_id && entry.is_open())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
