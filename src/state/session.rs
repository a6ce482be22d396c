use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    dao::models::RoomId,
    state::round::{PhaseKind, Round},
};

/// In-memory coordinator state of one room.
#[derive(Debug)]
pub struct RoomSession {
    pub room_id: RoomId,
    pub round: Round,
    /// Set once the persisted pending question has been loaded.
    pub hydrated: bool,
}

impl RoomSession {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            round: Round::new(),
            hydrated: false,
        }
    }
}

/// Per-room sessions. Holding a session's lock serializes the room's events and ticks.
#[derive(Default)]
pub struct RoomSessions {
    sessions: DashMap<RoomId, Arc<Mutex<RoomSession>>>,
}

impl RoomSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session of `room_id`, created on first use.
    pub fn get_or_create(&self, room_id: RoomId) -> Arc<Mutex<RoomSession>> {
        self.sessions
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomSession::new(room_id))))
            .clone()
    }

    pub fn get(&self, room_id: RoomId) -> Option<Arc<Mutex<RoomSession>>> {
        self.sessions.get(&room_id).map(|entry| entry.clone())
    }

    /// Drop the session of `room_id` when its round is idle and nothing else holds it.
    ///
    /// Returns whether an entry was removed. A later event recreates the session and
    /// hydrates it from the store again.
    pub fn evict_idle(&self, room_id: RoomId) -> bool {
        self.sessions
            .remove_if(&room_id, |_, session| {
                Arc::strong_count(session) == 1
                    && session
                        .try_lock()
                        .is_ok_and(|session| session.round.kind() == PhaseKind::Idle)
            })
            .is_some()
    }
}
