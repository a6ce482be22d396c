use std::{sync::Arc, time::SystemTime};

use futures::{FutureExt, TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        CounterDocument, MongoMessageDocument, MongoQuestionDocument, MongoRoomDocument,
        MongoRoomUserDocument, MongoTeamQuestionDocument, award_point_document, doc_id,
        member_filter, room_update_document, team_set_document,
    },
};
use crate::dao::{
    models::{
        MessageEntity, NewMessage, NewQuestion, QuestionEntity, RoomEntity, RoomId, RoomUpdate,
        RoomUserEntity, RoomUserUpdate, Side, Team, TeamQuestionEntity, UserId,
    },
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

const ROOM_COLLECTION: &str = "rooms";
const ROOM_USER_COLLECTION: &str = "room_users";
const MESSAGE_COLLECTION: &str = "messages";
const QUESTION_COLLECTION: &str = "questions";
const TEAM_QUESTION_COLLECTION: &str = "team_questions";
const COUNTER_COLLECTION: &str = "counters";

#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn database(&self) -> Database {
        let guard = self.state.read().await;
        guard.database.clone()
    }

    async fn ping(&self) -> MongoResult<()> {
        self.database()
            .await
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database().await.collection(ROOM_COLLECTION)
    }

    async fn room_users(&self) -> Collection<MongoRoomUserDocument> {
        self.database().await.collection(ROOM_USER_COLLECTION)
    }

    async fn messages(&self) -> Collection<MongoMessageDocument> {
        self.database().await.collection(MESSAGE_COLLECTION)
    }

    async fn questions(&self) -> Collection<MongoQuestionDocument> {
        self.database().await.collection(QUESTION_COLLECTION)
    }

    async fn team_questions(&self) -> Collection<MongoTeamQuestionDocument> {
        self.database().await.collection(TEAM_QUESTION_COLLECTION)
    }

    /// Allocate the next serial identifier of the named sequence.
    async fn next_id(&self, counter: &'static str) -> MongoResult<i64> {
        let counters = self
            .database()
            .await
            .collection::<CounterDocument>(COUNTER_COLLECTION);
        let updated = counters
            .find_one_and_update(doc! { "_id": counter }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::NextId { counter, source })?;

        Ok(updated.map(|document| document.seq).unwrap_or(1))
    }

    async fn create_room(&self, host_id: UserId, code: String) -> MongoResult<RoomEntity> {
        let id = self.next_id(ROOM_COLLECTION).await?;
        let room = RoomEntity::new(id, host_id, code);
        let document: MongoRoomDocument = room.clone().into();
        self.rooms()
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::query("insert_one", ROOM_COLLECTION))?;
        Ok(room)
    }

    async fn find_room(&self, filter: mongodb::bson::Document) -> MongoResult<Option<RoomEntity>> {
        let room = self
            .rooms()
            .await
            .find_one(filter)
            .await
            .map_err(MongoDaoError::query("find_one", ROOM_COLLECTION))?;
        Ok(room.map(Into::into))
    }

    async fn update_room(&self, id: RoomId, update: RoomUpdate) -> StorageResult<RoomEntity> {
        let set = room_update_document(&update);
        let updated = if set.is_empty() {
            self.find_room(doc_id(id)).await?
        } else {
            self.rooms()
                .await
                .find_one_and_update(doc_id(id), doc! { "$set": set })
                .return_document(ReturnDocument::After)
                .await
                .map_err(MongoDaoError::query("find_one_and_update", ROOM_COLLECTION))?
                .map(Into::into)
        };
        updated.ok_or_else(|| StorageError::not_found("room", id))
    }

    async fn award_point(&self, id: RoomId, side: Side) -> StorageResult<RoomEntity> {
        self.rooms()
            .await
            .find_one_and_update(doc_id(id), award_point_document(side))
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::query("find_one_and_update", ROOM_COLLECTION))?
            .map(Into::into)
            .ok_or_else(|| StorageError::not_found("room", id))
    }

    async fn add_user_to_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_host: bool,
    ) -> MongoResult<RoomUserEntity> {
        let collection = self.room_users().await;
        if let Some(existing) = collection
            .find_one(member_filter(room_id, user_id))
            .await
            .map_err(MongoDaoError::query("find_one", ROOM_USER_COLLECTION))?
        {
            return Ok(existing);
        }

        let member = RoomUserEntity {
            room_id,
            user_id,
            team: Team::Spectator,
            is_host,
        };
        collection
            .insert_one(&member)
            .await
            .map_err(MongoDaoError::query("insert_one", ROOM_USER_COLLECTION))?;
        Ok(member)
    }

    async fn get_room_users(&self, room_id: RoomId) -> MongoResult<Vec<RoomUserEntity>> {
        self.room_users()
            .await
            .find(doc! { "room_id": room_id })
            .await
            .map_err(MongoDaoError::query("find", ROOM_USER_COLLECTION))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query("find", ROOM_USER_COLLECTION))
    }

    async fn update_room_user(
        &self,
        room_id: RoomId,
        user_id: UserId,
        update: RoomUserUpdate,
    ) -> StorageResult<RoomUserEntity> {
        let collection = self.room_users().await;
        let updated = match update.team {
            Some(team) => collection
                .find_one_and_update(member_filter(room_id, user_id), team_set_document(team))
                .return_document(ReturnDocument::After)
                .await
                .map_err(MongoDaoError::query("find_one_and_update", ROOM_USER_COLLECTION))?,
            None => collection
                .find_one(member_filter(room_id, user_id))
                .await
                .map_err(MongoDaoError::query("find_one", ROOM_USER_COLLECTION))?,
        };
        updated.ok_or_else(|| StorageError::not_found("room member", format!("{room_id}/{user_id}")))
    }

    async fn create_message(&self, message: NewMessage) -> MongoResult<MessageEntity> {
        let id = self.next_id(MESSAGE_COLLECTION).await?;
        let entity = MessageEntity {
            id,
            room_id: message.room_id,
            user_id: message.user_id,
            content: message.content,
            kind: message.kind,
            team: message.team,
            created_at: SystemTime::now(),
        };
        let document: MongoMessageDocument = entity.clone().into();
        self.messages()
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::query("insert_one", MESSAGE_COLLECTION))?;
        Ok(entity)
    }

    async fn get_room_messages(&self, room_id: RoomId) -> MongoResult<Vec<MessageEntity>> {
        let documents: Vec<MongoMessageDocument> = self
            .messages()
            .await
            .find(doc! { "room_id": room_id })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::query("find", MESSAGE_COLLECTION))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query("find", MESSAGE_COLLECTION))?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn create_question(&self, question: NewQuestion) -> MongoResult<QuestionEntity> {
        let id = self.next_id(QUESTION_COLLECTION).await?;
        let entity = question.into_entity(id);
        let document: MongoQuestionDocument = entity.clone().into();
        self.questions()
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::query("insert_one", QUESTION_COLLECTION))?;
        Ok(entity)
    }

    async fn count_questions(&self) -> MongoResult<u64> {
        self.questions()
            .await
            .count_documents(doc! {})
            .await
            .map_err(MongoDaoError::query("count_documents", QUESTION_COLLECTION))
    }

    async fn get_random_question(&self) -> MongoResult<Option<QuestionEntity>> {
        let mut cursor = self
            .questions()
            .await
            .aggregate(vec![doc! { "$sample": { "size": 1 } }])
            .with_type::<MongoQuestionDocument>()
            .await
            .map_err(MongoDaoError::query("aggregate", QUESTION_COLLECTION))?;
        let sampled = cursor
            .try_next()
            .await
            .map_err(MongoDaoError::query("aggregate", QUESTION_COLLECTION))?;
        Ok(sampled.map(Into::into))
    }

    async fn create_team_question(&self, question: TeamQuestionEntity) -> MongoResult<()> {
        let room_id = question.room_id;
        let document: MongoTeamQuestionDocument = question.into();
        self.team_questions()
            .await
            .replace_one(doc_id(room_id), &document)
            .upsert(true)
            .await
            .map_err(MongoDaoError::query("replace_one", TEAM_QUESTION_COLLECTION))?;
        Ok(())
    }

    async fn get_team_question_for_room(
        &self,
        room_id: RoomId,
    ) -> MongoResult<Option<TeamQuestionEntity>> {
        let found = self
            .team_questions()
            .await
            .find_one(doc_id(room_id))
            .await
            .map_err(MongoDaoError::query("find_one", TEAM_QUESTION_COLLECTION))?;
        Ok(found.map(Into::into))
    }

    async fn clear_team_question_for_room(&self, room_id: RoomId) -> MongoResult<()> {
        self.team_questions()
            .await
            .delete_one(doc_id(room_id))
            .await
            .map_err(MongoDaoError::query("delete_one", TEAM_QUESTION_COLLECTION))?;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.inner.database().await;

        let code_index = IndexModel::builder()
            .keys(doc! { "code": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("room_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<mongodb::bson::Document>(ROOM_COLLECTION)
            .create_index(code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION,
                index: "code",
                source,
            })?;

        let member_index = IndexModel::builder()
            .keys(doc! { "room_id": 1, "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("room_member_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<mongodb::bson::Document>(ROOM_USER_COLLECTION)
            .create_index(member_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_USER_COLLECTION,
                index: "room_id,user_id",
                source,
            })?;

        let message_index = IndexModel::builder()
            .keys(doc! { "room_id": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("room_message_idx".to_owned()))
                    .build(),
            )
            .build();
        database
            .collection::<mongodb::bson::Document>(MESSAGE_COLLECTION)
            .create_index(message_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MESSAGE_COLLECTION,
                index: "room_id,created_at",
                source,
            })?;

        Ok(())
    }
}

impl RoomStore for MongoRoomStore {
    fn create_room(
        &self,
        host_id: UserId,
        code: String,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let inner = self.inner.clone();
        async move { Ok(inner.create_room(host_id, code).await?) }.boxed()
    }

    fn get_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.find_room(doc_id(id)).await?) }.boxed()
    }

    fn get_room_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.find_room(doc! { "code": code }).await?) }.boxed()
    }

    fn update_room(
        &self,
        id: RoomId,
        update: RoomUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let inner = self.inner.clone();
        async move { inner.update_room(id, update).await }.boxed()
    }

    fn award_point(&self, id: RoomId, side: Side) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let inner = self.inner.clone();
        async move { inner.award_point(id, side).await }.boxed()
    }

    fn add_user_to_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_host: bool,
    ) -> BoxFuture<'static, StorageResult<RoomUserEntity>> {
        let inner = self.inner.clone();
        async move { Ok(inner.add_user_to_room(room_id, user_id, is_host).await?) }.boxed()
    }

    fn get_room_users(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomUserEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.get_room_users(room_id).await?) }.boxed()
    }

    fn update_room_user(
        &self,
        room_id: RoomId,
        user_id: UserId,
        update: RoomUserUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomUserEntity>> {
        let inner = self.inner.clone();
        async move { inner.update_room_user(room_id, user_id, update).await }.boxed()
    }

    fn create_message(
        &self,
        message: NewMessage,
    ) -> BoxFuture<'static, StorageResult<MessageEntity>> {
        let inner = self.inner.clone();
        async move { Ok(inner.create_message(message).await?) }.boxed()
    }

    fn get_room_messages(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.get_room_messages(room_id).await?) }.boxed()
    }

    fn create_question(
        &self,
        question: NewQuestion,
    ) -> BoxFuture<'static, StorageResult<QuestionEntity>> {
        let inner = self.inner.clone();
        async move { Ok(inner.create_question(question).await?) }.boxed()
    }

    fn count_questions(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        async move { Ok(inner.count_questions().await?) }.boxed()
    }

    fn get_random_question(&self) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.get_random_question().await?) }.boxed()
    }

    fn create_team_question(
        &self,
        question: TeamQuestionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move { Ok(inner.create_team_question(question).await?) }.boxed()
    }

    fn get_team_question_for_room(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Option<TeamQuestionEntity>>> {
        let inner = self.inner.clone();
        async move { Ok(inner.get_team_question_for_room(room_id).await?) }.boxed()
    }

    fn clear_team_question_for_room(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move { Ok(inner.clear_team_question_for_room(room_id).await?) }.boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move { Ok(inner.ping().await?) }.boxed()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move { Ok(inner.reconnect().await?) }.boxed()
    }
}
