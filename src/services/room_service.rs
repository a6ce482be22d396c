use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::{
        models::{MessageEntity, RoomEntity, RoomId, UserId},
        room_store::RoomStore,
    },
    dto::{
        room::{
            JoinRoomRequest, RoomMemberResponse, RoomResponse, RoomSnapshotResponse,
            UpdateRoomRequest,
        },
        validation::ROOM_CODE_ALPHABET,
        ws::{MessageView, ServerMessage},
    },
    error::ServiceError,
    services::broadcast::broadcast,
    state::SharedState,
};

const CODE_ATTEMPTS: usize = 10;

/// Random share code drawn from the room code alphabet.
pub fn generate_code(length: usize) -> String {
    let alphabet = ROOM_CODE_ALPHABET.as_bytes();
    (0..length)
        .map(|_| char::from(alphabet[rand::random_range(0..alphabet.len())]))
        .collect()
}

async fn unique_code(store: &Arc<dyn RoomStore>, length: usize) -> Result<String, ServiceError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code(length);
        if store.get_room_by_code(code.clone()).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ServiceError::InvalidState(
        "could not allocate a unique room code".into(),
    ))
}

/// Create a room hosted by `host_id`, who joins it as its first member.
pub async fn create_room(state: &SharedState, host_id: UserId) -> Result<RoomResponse, ServiceError> {
    let store = state.require_store().await?;
    let code = unique_code(&store, state.config().room_code_length()).await?;

    let room = store.create_room(host_id, code).await?;
    store.add_user_to_room(room.id, host_id, true).await?;

    info!(room_id = room.id, code = %room.code, user_id = host_id, "room created");
    Ok(room.into())
}

/// Add `user_id` to the room behind `request.code`; joining twice is a no-op.
pub async fn join_by_code(
    state: &SharedState,
    user_id: UserId,
    request: JoinRoomRequest,
) -> Result<RoomResponse, ServiceError> {
    let store = state.require_store().await?;
    let code = request.code.trim().to_ascii_uppercase();
    let room = store
        .get_room_by_code(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))?;

    store.add_user_to_room(room.id, user_id, false).await?;
    info!(room_id = room.id, user_id, "user joined room by code");

    broadcast(
        state.connections(),
        room.id,
        &ServerMessage::game_update(room.id),
    );
    Ok(room.into())
}

async fn load_room(store: &Arc<dyn RoomStore>, room_id: RoomId) -> Result<RoomEntity, ServiceError> {
    store
        .get_room(room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}` not found")))
}

/// Room with its members and their live connection flag.
pub async fn snapshot(state: &SharedState, room_id: RoomId) -> Result<RoomSnapshotResponse, ServiceError> {
    let store = state.require_store().await?;
    let room = load_room(&store, room_id).await?;
    let users = store
        .get_room_users(room_id)
        .await?
        .into_iter()
        .map(|member| {
            let connected = state.connections().is_connected(member.user_id, room_id);
            RoomMemberResponse::new(member, connected)
        })
        .collect();

    Ok(RoomSnapshotResponse {
        room: room.into(),
        users,
    })
}

/// Apply a host-issued partial update and tell the room to refetch.
pub async fn update_room(
    state: &SharedState,
    user_id: UserId,
    room_id: RoomId,
    request: UpdateRoomRequest,
) -> Result<RoomResponse, ServiceError> {
    let store = state.require_store().await?;
    let room = load_room(&store, room_id).await?;
    if room.host_id != user_id {
        return Err(ServiceError::Forbidden(
            "only the host can update the room".into(),
        ));
    }

    let room = store.update_room(room_id, request.into()).await?;
    info!(room_id, user_id, "room updated");

    broadcast(
        state.connections(),
        room_id,
        &ServerMessage::game_update(room_id),
    );
    Ok(room.into())
}

/// Message log of a room in creation order.
pub async fn messages(state: &SharedState, room_id: RoomId) -> Result<Vec<MessageView>, ServiceError> {
    let store = state.require_store().await?;
    load_room(&store, room_id).await?;
    let messages: Vec<MessageEntity> = store.get_room_messages(room_id).await?;
    Ok(messages.into_iter().map(MessageView::from).collect())
}

/// Fill an empty question bank with the configured seed questions.
pub async fn seed_questions(store: &Arc<dyn RoomStore>, config: &AppConfig) -> Result<usize, ServiceError> {
    if store.count_questions().await? > 0 {
        return Ok(0);
    }

    let mut seeded = 0;
    for question in config.seed_questions() {
        match store.create_question(question.clone()).await {
            Ok(_) => seeded += 1,
            Err(err) => warn!(error = %err, "failed to seed question"),
        }
    }
    info!(count = seeded, "question bank seeded");
    Ok(seeded)
}
