use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;

/// Serial identifier of a room.
pub type RoomId = i64;
/// Serial identifier of a user (0 is reserved for system messages).
pub type UserId = i64;

/// Author used for system messages and automatic game events.
pub const SYSTEM_USER_ID: UserId = 0;

/// Team a room member belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
    #[default]
    Spectator,
}

impl Team {
    /// Playing side of the team, `None` for spectators.
    pub fn side(self) -> Option<Side> {
        match self {
            Team::Red => Some(Side::Red),
            Team::Blue => Some(Side::Blue),
            Team::Spectator => None,
        }
    }

    /// Stable lowercase name used in persistence.
    pub fn as_str(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
            Team::Spectator => "spectator",
        }
    }
}

/// One of the two playing teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Red,
    Blue,
}

impl Side {
    /// The other playing team.
    pub fn opponent(self) -> Side {
        match self {
            Side::Red => Side::Blue,
            Side::Blue => Side::Red,
        }
    }

    /// Stable lowercase name used in persistence.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Red => "red",
            Side::Blue => "blue",
        }
    }
}

impl From<Side> for Team {
    fn from(value: Side) -> Self {
        match value {
            Side::Red => Team::Red,
            Side::Blue => Team::Blue,
        }
    }
}

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Lobby,
    Playing,
    Finished,
}

impl RoomStatus {
    /// Stable lowercase name used in persistence.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Lobby => "lobby",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
        }
    }
}

/// Game flavour played in a room. The two modes never run side by side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Teams write questions for each other and pick who answers.
    #[default]
    TeamQuestions,
    /// Legacy wheel: a random bank question for a random player.
    Spin,
}

impl GameMode {
    /// Stable lowercase name used in persistence.
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::TeamQuestions => "team_questions",
            GameMode::Spin => "spin",
        }
    }
}

/// Room row persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Serial primary key.
    pub id: RoomId,
    /// Short join code shared with players.
    pub code: String,
    /// User who created the room.
    pub host_id: UserId,
    pub status: RoomStatus,
    pub mode: GameMode,
    /// Team expected to ask the next question.
    pub current_team: Side,
    pub red_score: i32,
    pub blue_score: i32,
    pub red_name: String,
    pub blue_name: String,
    pub created_at: SystemTime,
}

impl RoomEntity {
    /// Fresh lobby room with zeroed scores and default team names.
    pub fn new(id: RoomId, host_id: UserId, code: String) -> Self {
        Self {
            id,
            code,
            host_id,
            status: RoomStatus::Lobby,
            mode: GameMode::default(),
            current_team: Side::Red,
            red_score: 0,
            blue_score: 0,
            red_name: "Red Team".into(),
            blue_name: "Blue Team".into(),
            created_at: SystemTime::now(),
        }
    }
}

/// Partial update applied to a room; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomUpdate {
    pub status: Option<RoomStatus>,
    pub mode: Option<GameMode>,
    pub current_team: Option<Side>,
    pub red_score: Option<i32>,
    pub blue_score: Option<i32>,
    pub red_name: Option<String>,
    pub blue_name: Option<String>,
}

impl RoomUpdate {
    /// Write every present field into `room`.
    pub fn apply_to(&self, room: &mut RoomEntity) {
        if let Some(status) = self.status {
            room.status = status;
        }
        if let Some(mode) = self.mode {
            room.mode = mode;
        }
        if let Some(current_team) = self.current_team {
            room.current_team = current_team;
        }
        if let Some(score) = self.red_score {
            room.red_score = score;
        }
        if let Some(score) = self.blue_score {
            room.blue_score = score;
        }
        if let Some(name) = &self.red_name {
            room.red_name = name.clone();
        }
        if let Some(name) = &self.blue_name {
            room.blue_name = name.clone();
        }
    }
}

/// Membership of a user in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomUserEntity {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub team: Team,
    pub is_host: bool,
}

/// Partial update applied to a room membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomUserUpdate {
    pub team: Option<Team>,
}

/// Category of a logged message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Chat,
    System,
    Command,
    Reaction,
}

/// Append-only chat log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEntity {
    pub id: i64,
    pub room_id: RoomId,
    /// Author, [`SYSTEM_USER_ID`] for system messages.
    pub user_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    /// Target team for team chat, `None` for the global channel.
    pub team: Option<Side>,
    pub created_at: SystemTime,
}

/// Message about to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub team: Option<Side>,
}

/// Question of the shared bank used by the spin mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    pub id: i64,
    pub text: String,
    pub answer: String,
    pub category: String,
    pub difficulty: String,
}

/// Question about to be added to the bank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewQuestion {
    pub text: String,
    pub answer: String,
    pub category: Option<String>,
    pub difficulty: Option<String>,
}

impl NewQuestion {
    /// Materialise the question with its defaults under the given identifier.
    pub fn into_entity(self, id: i64) -> QuestionEntity {
        QuestionEntity {
            id,
            text: self.text,
            answer: self.answer,
            category: self.category.unwrap_or_else(|| "general".into()),
            difficulty: self.difficulty.unwrap_or_else(|| "medium".into()),
        }
    }
}

/// Question written by a team for its opponents; at most one per room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamQuestionEntity {
    pub room_id: RoomId,
    pub text: String,
    pub answer: String,
    pub author_team: Side,
    /// Opponent chosen to answer, once selected.
    pub selected_player_id: Option<UserId>,
    pub created_at: SystemTime,
}
