use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tracing::debug;
use utoipa::IntoParams;

use crate::{
    dao::models::{RoomId, UserId},
    error::AppError,
    services::{auth_service::bearer_token, websocket_service},
    state::SharedState,
};

/// Query parameters of the WebSocket endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SocketParams {
    /// Room the socket is limited to.
    pub room_id: Option<RoomId>,
    /// Credential; the `Authorization: Bearer` header is accepted as well.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    params(SocketParams),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Missing or unknown credentials")
    )
)]
/// Upgrade the HTTP connection into a player WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<SocketParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let user_id = authenticate_socket(&state, params.token, &headers).await?;
    debug!(room_id = ?params.room_id, user_id, "upgrading socket");

    let scope_room = params.room_id;
    Ok(ws.on_upgrade(move |socket| {
        websocket_service::handle_socket(state, socket, scope_room, user_id)
    }))
}

/// Resolve the user of an upgrade request from the `token` query or the bearer header.
async fn authenticate_socket(
    state: &SharedState,
    query_token: Option<String>,
    headers: &HeaderMap,
) -> Result<UserId, AppError> {
    let token = query_token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| bearer_token(headers).map(str::to_owned))
        .ok_or_else(|| AppError::Unauthorized("missing token".into()))?;

    state
        .authenticator()
        .authenticate(token)
        .await
        .ok_or_else(|| AppError::Unauthorized("invalid token".into()))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
