//! DTO definitions used by the room REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{
        GameMode, RoomEntity, RoomId, RoomStatus, RoomUpdate, RoomUserEntity, Side, Team, UserId,
    },
    dto::{
        format_system_time,
        validation::{validate_not_blank, validate_room_code},
    },
};

/// Request to join an existing room by its share code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
}

/// Partial room update; absent fields are left untouched.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomRequest {
    pub status: Option<RoomStatus>,
    pub mode: Option<GameMode>,
    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub red_name: Option<String>,
    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub blue_name: Option<String>,
    #[validate(range(min = 0))]
    pub red_score: Option<i32>,
    #[validate(range(min = 0))]
    pub blue_score: Option<i32>,
}

impl From<UpdateRoomRequest> for RoomUpdate {
    fn from(value: UpdateRoomRequest) -> Self {
        Self {
            status: value.status,
            mode: value.mode,
            current_team: None,
            red_score: value.red_score,
            blue_score: value.blue_score,
            red_name: value.red_name.map(|name| name.trim().to_owned()),
            blue_name: value.blue_name.map(|name| name.trim().to_owned()),
        }
    }
}

/// Public projection of a room.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: RoomId,
    pub code: String,
    pub host_id: UserId,
    pub status: RoomStatus,
    pub mode: GameMode,
    pub current_team: Side,
    pub red_score: i32,
    pub blue_score: i32,
    pub red_name: String,
    pub blue_name: String,
    pub created_at: String,
}

impl From<RoomEntity> for RoomResponse {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id,
            code: value.code,
            host_id: value.host_id,
            status: value.status,
            mode: value.mode,
            current_team: value.current_team,
            red_score: value.red_score,
            blue_score: value.blue_score,
            red_name: value.red_name,
            blue_name: value.blue_name,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Member of a room as listed in its snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberResponse {
    pub user_id: UserId,
    pub team: Team,
    pub is_host: bool,
    /// Whether the member currently has a live socket in the room.
    pub connected: bool,
}

impl RoomMemberResponse {
    pub fn new(member: RoomUserEntity, connected: bool) -> Self {
        Self {
            user_id: member.user_id,
            team: member.team,
            is_host: member.is_host,
            connected,
        }
    }
}

/// Room with its members.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSnapshotResponse {
    #[serde(flatten)]
    pub room: RoomResponse,
    pub users: Vec<RoomMemberResponse>,
}
