use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{
        GameMode, MessageEntity, MessageKind, QuestionEntity, RoomId, Side, Team, UserId,
    },
    dto::{format_system_time, validation::validate_not_blank},
    state::round::{QuestionView, Verdict},
};

#[derive(Debug, Deserialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinRoom(JoinRoomPayload),
    Chat(ChatPayload),
    TeamChange(TeamChangePayload),
    Spin,
    StartGame(StartGamePayload),
    SubmitTeamQuestion(SubmitQuestionPayload),
    SelectPlayer(SelectPlayerPayload),
    AnswerQuestion(AnswerPayload),
    WrongAnswer,
    #[serde(other)]
    Unknown,
}

/// Reasons an inbound frame is dropped before reaching the coordinator.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl ClientMessage {
    /// Parse a text frame and validate its payload.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Event name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join_room",
            Self::Chat(_) => "chat",
            Self::TeamChange(_) => "team_change",
            Self::Spin => "spin",
            Self::StartGame(_) => "start_game",
            Self::SubmitTeamQuestion(_) => "submit_team_question",
            Self::SelectPlayer(_) => "select_player",
            Self::AnswerQuestion(_) => "answer_question",
            Self::WrongAnswer => "wrong_answer",
            Self::Unknown => "unknown",
        }
    }
}

impl Validate for ClientMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::JoinRoom(payload) => payload.validate(),
            Self::Chat(payload) => payload.validate(),
            Self::SubmitTeamQuestion(payload) => payload.validate(),
            Self::SelectPlayer(payload) => payload.validate(),
            Self::AnswerQuestion(payload) => payload.validate(),
            Self::TeamChange(_)
            | Self::Spin
            | Self::StartGame(_)
            | Self::WrongAnswer
            | Self::Unknown => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    #[validate(range(min = 1))]
    pub room_id: RoomId,
    #[validate(range(min = 1))]
    pub user_id: UserId,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChatPayload {
    #[validate(length(min = 1, max = 1000), custom(function = "validate_not_blank"))]
    pub content: String,
    /// Team channel; absent for the global chat.
    #[serde(default)]
    pub team: Option<Side>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TeamChangePayload {
    pub team: Team,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartGamePayload {
    pub room_id: RoomId,
    /// Game flavour to play; keeps the room's current mode when absent.
    #[serde(default)]
    pub mode: Option<GameMode>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuestionPayload {
    pub room_id: RoomId,
    #[validate(length(min = 1, max = 500), custom(function = "validate_not_blank"))]
    pub question: String,
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub answer: String,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectPlayerPayload {
    pub room_id: RoomId,
    #[validate(range(min = 1))]
    pub player_id: UserId,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub room_id: RoomId,
    #[validate(length(max = 200))]
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameUpdate(GameUpdate),
    Chat(ChatBroadcast),
    SpinResult(SpinResult),
    QuestionState(QuestionState),
    AnswerResult(AnswerResult),
    WrongAnswer(WrongAnswerNotice),
    Error(ErrorNotice),
}

impl ServerMessage {
    /// Tell clients to refetch the room.
    pub fn game_update(room_id: RoomId) -> Self {
        Self::GameUpdate(GameUpdate { room_id })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorNotice {
            message: message.into(),
        })
    }

    pub fn chat(message: MessageEntity) -> Self {
        Self::Chat(ChatBroadcast {
            message: message.into(),
        })
    }

    /// Spin outcome; the answer of the drawn question is withheld.
    pub fn spin_result(user_id: UserId, question: QuestionEntity) -> Self {
        Self::SpinResult(SpinResult {
            user_id,
            question: SpinQuestion {
                id: question.id,
                text: question.text,
                category: question.category,
                difficulty: question.difficulty,
            },
        })
    }

    pub fn question_state(room_id: RoomId, view: QuestionView) -> Self {
        Self::QuestionState(QuestionState {
            room_id,
            question: view.question,
            author_team: view.author_team,
            can_answer: view.can_answer,
            selected_player_id: view.selected_player_id,
            time_left: view.time_left,
        })
    }

    /// Result of a judged answer; the expected answer is revealed only when it was found.
    pub fn answer_result(room_id: RoomId, verdict: Verdict) -> Self {
        Self::AnswerResult(AnswerResult {
            room_id,
            correct: verdict.correct,
            answering_team: verdict.answering_team,
            question: verdict.question,
            answer: verdict.correct.then_some(verdict.answer),
        })
    }

    /// Failed result emitted when the clock runs out.
    pub fn timed_out(room_id: RoomId, answering_team: Side, question: String) -> Self {
        Self::AnswerResult(AnswerResult {
            room_id,
            correct: false,
            answering_team,
            question,
            answer: None,
        })
    }

    pub fn wrong_answer(team: Side, user_id: UserId) -> Self {
        Self::WrongAnswer(WrongAnswerNotice { team, user_id })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatBroadcast {
    pub message: MessageView,
}

/// Public projection of a logged message.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: i64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub team: Option<Side>,
    pub created_at: String,
}

impl From<MessageEntity> for MessageView {
    fn from(value: MessageEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            content: value.content,
            kind: value.kind,
            team: value.team,
            created_at: format_system_time(value.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpinResult {
    pub user_id: UserId,
    pub question: SpinQuestion,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SpinQuestion {
    pub id: i64,
    pub text: String,
    pub category: String,
    pub difficulty: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionState {
    pub room_id: RoomId,
    pub question: String,
    pub author_team: Side,
    pub can_answer: bool,
    pub selected_player_id: Option<UserId>,
    pub time_left: Option<u32>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub room_id: RoomId,
    pub correct: bool,
    pub answering_team: Side,
    pub question: String,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswerNotice {
    pub team: Side,
    /// Player who missed, 0 when the clock ran out.
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorNotice {
    pub message: String,
}
