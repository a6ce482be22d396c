use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    GameMode, MessageEntity, MessageKind, QuestionEntity, RoomEntity, RoomStatus, RoomUpdate,
    RoomUserEntity, Side, Team, TeamQuestionEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: i64,
    code: String,
    host_id: i64,
    status: RoomStatus,
    #[serde(default)]
    mode: GameMode,
    current_team: Side,
    red_score: i32,
    blue_score: i32,
    red_name: String,
    blue_name: String,
    created_at: DateTime,
}

impl From<RoomEntity> for MongoRoomDocument {
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
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(value: MongoRoomDocument) -> Self {
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
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// Membership documents reuse the entity layout; (room_id, user_id) is unique.
pub type MongoRoomUserDocument = RoomUserEntity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessageDocument {
    #[serde(rename = "_id")]
    id: i64,
    room_id: i64,
    user_id: i64,
    content: String,
    kind: MessageKind,
    team: Option<Side>,
    created_at: DateTime,
}

impl From<MessageEntity> for MongoMessageDocument {
    fn from(value: MessageEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            content: value.content,
            kind: value.kind,
            team: value.team,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoMessageDocument> for MessageEntity {
    fn from(value: MongoMessageDocument) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            content: value.content,
            kind: value.kind,
            team: value.team,
            created_at: value.created_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    id: i64,
    text: String,
    answer: String,
    category: String,
    difficulty: String,
}

impl From<QuestionEntity> for MongoQuestionDocument {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            text: value.text,
            answer: value.answer,
            category: value.category,
            difficulty: value.difficulty,
        }
    }
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        Self {
            id: value.id,
            text: value.text,
            answer: value.answer,
            category: value.category,
            difficulty: value.difficulty,
        }
    }
}

/// Pending team question, keyed by its room so a room holds at most one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamQuestionDocument {
    #[serde(rename = "_id")]
    room_id: i64,
    text: String,
    answer: String,
    author_team: Side,
    selected_player_id: Option<i64>,
    created_at: DateTime,
}

impl From<TeamQuestionEntity> for MongoTeamQuestionDocument {
    fn from(value: TeamQuestionEntity) -> Self {
        Self {
            room_id: value.room_id,
            text: value.text,
            answer: value.answer,
            author_team: value.author_team,
            selected_player_id: value.selected_player_id,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoTeamQuestionDocument> for TeamQuestionEntity {
    fn from(value: MongoTeamQuestionDocument) -> Self {
        Self {
            room_id: value.room_id,
            text: value.text,
            answer: value.answer,
            author_team: value.author_team,
            selected_player_id: value.selected_player_id,
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// Monotonic counter backing serial identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterDocument {
    #[serde(rename = "_id")]
    pub name: String,
    pub seq: i64,
}

/// Translate a partial room update into a `$set` document.
pub fn room_update_document(update: &RoomUpdate) -> Document {
    let mut set = Document::new();
    if let Some(status) = update.status {
        set.insert("status", status.as_str());
    }
    if let Some(mode) = update.mode {
        set.insert("mode", mode.as_str());
    }
    if let Some(team) = update.current_team {
        set.insert("current_team", team.as_str());
    }
    if let Some(score) = update.red_score {
        set.insert("red_score", score);
    }
    if let Some(score) = update.blue_score {
        set.insert("blue_score", score);
    }
    if let Some(name) = &update.red_name {
        set.insert("red_name", name.as_str());
    }
    if let Some(name) = &update.blue_name {
        set.insert("blue_name", name.as_str());
    }
    set
}

pub fn award_point_document(side: Side) -> Document {
    let score_field = match side {
        Side::Red => "red_score",
        Side::Blue => "blue_score",
    };
    doc! {
        "$inc": { score_field: 1 },
        "$set": { "current_team": side.as_str() },
    }
}

pub fn team_set_document(team: Team) -> Document {
    doc! { "$set": { "team": team.as_str() } }
}

pub fn doc_id(id: i64) -> Document {
    doc! { "_id": id }
}

pub fn member_filter(room_id: i64, user_id: i64) -> Document {
    doc! { "room_id": room_id, "user_id": user_id }
}
