//! In-process [`RoomStore`] used for local runs and tests.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::dao::{
    models::{
        MessageEntity, NewMessage, NewQuestion, QuestionEntity, RoomEntity, RoomId, RoomUpdate,
        RoomUserEntity, RoomUserUpdate, Side, Team, TeamQuestionEntity, UserId,
    },
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

/// Store keeping every table in memory behind a single async lock.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    next_room_id: i64,
    next_message_id: i64,
    next_question_id: i64,
    rooms: HashMap<RoomId, RoomEntity>,
    /// Keyed by (room, user); insertion order is join order.
    members: IndexMap<(RoomId, UserId), RoomUserEntity>,
    messages: Vec<MessageEntity>,
    questions: Vec<QuestionEntity>,
    team_questions: HashMap<RoomId, TeamQuestionEntity>,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for MemoryRoomStore {
    fn create_room(
        &self,
        host_id: UserId,
        code: String,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            let id = Tables::next_id(&mut tables.next_room_id);
            let room = RoomEntity::new(id, host_id, code);
            tables.rooms.insert(id, room.clone());
            Ok(room)
        }
        .boxed()
    }

    fn get_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.read().await.rooms.get(&id).cloned()) }.boxed()
    }

    fn get_room_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let inner = self.inner.clone();
        async move {
            let tables = inner.read().await;
            Ok(tables.rooms.values().find(|room| room.code == code).cloned())
        }
        .boxed()
    }

    fn update_room(
        &self,
        id: RoomId,
        update: RoomUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            let room = tables
                .rooms
                .get_mut(&id)
                .ok_or_else(|| StorageError::not_found("room", id))?;
            update.apply_to(room);
            Ok(room.clone())
        }
        .boxed()
    }

    fn award_point(&self, id: RoomId, side: Side) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            let room = tables
                .rooms
                .get_mut(&id)
                .ok_or_else(|| StorageError::not_found("room", id))?;
            match side {
                Side::Red => room.red_score += 1,
                Side::Blue => room.blue_score += 1,
            }
            room.current_team = side;
            Ok(room.clone())
        }
        .boxed()
    }

    fn add_user_to_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_host: bool,
    ) -> BoxFuture<'static, StorageResult<RoomUserEntity>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            let member = tables
                .members
                .entry((room_id, user_id))
                .or_insert_with(|| RoomUserEntity {
                    room_id,
                    user_id,
                    team: Team::Spectator,
                    is_host,
                });
            Ok(member.clone())
        }
        .boxed()
    }

    fn get_room_users(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomUserEntity>>> {
        let inner = self.inner.clone();
        async move {
            let tables = inner.read().await;
            Ok(tables
                .members
                .values()
                .filter(|member| member.room_id == room_id)
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn update_room_user(
        &self,
        room_id: RoomId,
        user_id: UserId,
        update: RoomUserUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomUserEntity>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            let member = tables
                .members
                .get_mut(&(room_id, user_id))
                .ok_or_else(|| {
                    StorageError::not_found("room member", format!("{room_id}/{user_id}"))
                })?;
            if let Some(team) = update.team {
                member.team = team;
            }
            Ok(member.clone())
        }
        .boxed()
    }

    fn create_message(
        &self,
        message: NewMessage,
    ) -> BoxFuture<'static, StorageResult<MessageEntity>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            let id = Tables::next_id(&mut tables.next_message_id);
            let entity = MessageEntity {
                id,
                room_id: message.room_id,
                user_id: message.user_id,
                content: message.content,
                kind: message.kind,
                team: message.team,
                created_at: SystemTime::now(),
            };
            tables.messages.push(entity.clone());
            Ok(entity)
        }
        .boxed()
    }

    fn get_room_messages(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let inner = self.inner.clone();
        async move {
            let tables = inner.read().await;
            Ok(tables
                .messages
                .iter()
                .filter(|message| message.room_id == room_id)
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn create_question(
        &self,
        question: NewQuestion,
    ) -> BoxFuture<'static, StorageResult<QuestionEntity>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            let id = Tables::next_id(&mut tables.next_question_id);
            let entity = question.into_entity(id);
            tables.questions.push(entity.clone());
            Ok(entity)
        }
        .boxed()
    }

    fn count_questions(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        async move { Ok(inner.read().await.questions.len() as u64) }.boxed()
    }

    fn get_random_question(&self) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let inner = self.inner.clone();
        async move {
            let tables = inner.read().await;
            if tables.questions.is_empty() {
                return Ok(None);
            }
            let index = rand::random_range(0..tables.questions.len());
            Ok(tables.questions.get(index).cloned())
        }
        .boxed()
    }

    fn create_team_question(
        &self,
        question: TeamQuestionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move {
            let mut tables = inner.write().await;
            tables.team_questions.insert(question.room_id, question);
            Ok(())
        }
        .boxed()
    }

    fn get_team_question_for_room(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Option<TeamQuestionEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.read().await.team_questions.get(&room_id).cloned()) }.boxed()
    }

    fn clear_team_question_for_room(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move {
            inner.write().await.team_questions.remove(&room_id);
            Ok(())
        }
        .boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        async { Ok(()) }.boxed()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        async { Ok(()) }.boxed()
    }
}
