use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dao::models::RoomId,
    dto::{
        room::{JoinRoomRequest, RoomResponse, RoomSnapshotResponse, UpdateRoomRequest},
        ws::MessageView,
    },
    error::AppError,
    services::{auth_service::AuthUser, room_service},
    state::SharedState,
};

/// Routes exposing room creation, membership and inspection.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/join", post(join_room))
        .route("/api/rooms/{id}", get(get_room).patch(update_room))
        .route("/api/rooms/{id}/messages", get(get_messages))
}

/// Create a room hosted by the caller.
#[utoipa::path(
    post,
    path = "/api/rooms",
    tag = "rooms",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Room created", body = RoomResponse),
        (status = 401, description = "Missing or unknown credentials"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<RoomResponse>), AppError> {
    let room = room_service::create_room(&state, user_id).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// Join a room using its share code.
#[utoipa::path(
    post,
    path = "/api/rooms/join",
    tag = "rooms",
    security(("bearer" = [])),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Caller is a member of the room", body = RoomResponse),
        (status = 400, description = "Malformed code"),
        (status = 404, description = "No room uses this code")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Valid(Json(payload)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = room_service::join_by_code(&state, user_id, payload).await?;
    Ok(Json(room))
}

/// Room snapshot with its members.
#[utoipa::path(
    get,
    path = "/api/rooms/{id}",
    tag = "rooms",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Identifier of the room")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshotResponse),
        (status = 401, description = "Missing or unknown credentials"),
        (status = 404, description = "Room not found")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    _caller: AuthUser,
    Path(id): Path<RoomId>,
) -> Result<Json<RoomSnapshotResponse>, AppError> {
    let snapshot = room_service::snapshot(&state, id).await?;
    Ok(Json(snapshot))
}

/// Partially update a room. Host only.
#[utoipa::path(
    patch,
    path = "/api/rooms/{id}",
    tag = "rooms",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Identifier of the room")),
    request_body = UpdateRoomRequest,
    responses(
        (status = 200, description = "Room updated", body = RoomResponse),
        (status = 403, description = "Caller is not the host"),
        (status = 404, description = "Room not found")
    )
)]
pub async fn update_room(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<RoomId>,
    Valid(Json(payload)): Valid<Json<UpdateRoomRequest>>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = room_service::update_room(&state, user_id, id, payload).await?;
    Ok(Json(room))
}

/// Message log of a room.
#[utoipa::path(
    get,
    path = "/api/rooms/{id}/messages",
    tag = "rooms",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Identifier of the room")),
    responses(
        (status = 200, description = "Messages in creation order", body = [MessageView]),
        (status = 404, description = "Room not found")
    )
)]
pub async fn get_messages(
    State(state): State<SharedState>,
    _caller: AuthUser,
    Path(id): Path<RoomId>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    let messages = room_service::messages(&state, id).await?;
    Ok(Json(messages))
}
