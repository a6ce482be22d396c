pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{
    MessageEntity, NewMessage, NewQuestion, QuestionEntity, RoomEntity, RoomId, RoomUpdate,
    RoomUserEntity, RoomUserUpdate, Side, TeamQuestionEntity, UserId,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the durable store holding rooms, members, messages and questions.
///
/// Lookups return `Ok(None)` when nothing matches; updates of missing rows fail
/// with [`StorageError::NotFound`](crate::dao::storage::StorageError::NotFound).
pub trait RoomStore: Send + Sync {
    fn create_room(&self, host_id: UserId, code: String)
    -> BoxFuture<'static, StorageResult<RoomEntity>>;
    fn get_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    fn get_room_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    fn update_room(
        &self,
        id: RoomId,
        update: RoomUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>>;
    /// Add one point to `side` and hand it the next question, in a single write.
    fn award_point(&self, id: RoomId, side: Side) -> BoxFuture<'static, StorageResult<RoomEntity>>;

    /// Add a member as spectator; returns the existing membership when already present.
    fn add_user_to_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_host: bool,
    ) -> BoxFuture<'static, StorageResult<RoomUserEntity>>;
    fn get_room_users(&self, room_id: RoomId)
    -> BoxFuture<'static, StorageResult<Vec<RoomUserEntity>>>;
    fn update_room_user(
        &self,
        room_id: RoomId,
        user_id: UserId,
        update: RoomUserUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomUserEntity>>;

    fn create_message(&self, message: NewMessage)
    -> BoxFuture<'static, StorageResult<MessageEntity>>;
    /// Messages of a room ordered by creation time.
    fn get_room_messages(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>>;

    fn create_question(
        &self,
        question: NewQuestion,
    ) -> BoxFuture<'static, StorageResult<QuestionEntity>>;
    fn count_questions(&self) -> BoxFuture<'static, StorageResult<u64>>;
    fn get_random_question(&self) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;

    /// Store the pending question of a room, replacing any previous one.
    fn create_team_question(
        &self,
        question: TeamQuestionEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn get_team_question_for_room(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Option<TeamQuestionEntity>>>;
    fn clear_team_question_for_room(&self, room_id: RoomId)
    -> BoxFuture<'static, StorageResult<()>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
