//! Room session coordinator: resolves who sent an event, checks it against room and
//! team membership, then drives the round state machine or the broadcast-only handlers.

use std::sync::Arc;

use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            GameMode, MessageKind, NewMessage, RoomEntity, RoomId, RoomStatus, RoomUpdate,
            RoomUserUpdate, Side, Team, UserId,
        },
        room_store::RoomStore,
        storage::StorageError,
    },
    dto::ws::{
        ChatPayload, ClientMessage, JoinRoomPayload, ServerMessage, StartGamePayload,
        TeamChangePayload,
    },
    error::ServiceError,
    services::{
        broadcast::{ConnectionClosed, broadcast, send_to_one},
        round_service,
    },
    state::{Connection, RoomSession, SharedState, round::TurnError},
};

/// Errors raised while processing an inbound WebSocket event.
///
/// Distinct from [`ServiceError`], which is shaped for HTTP responses.
#[derive(Debug, Error)]
pub enum EventError {
    /// Writer channel closed; the socket session must end.
    #[error("connection closed")]
    ConnectionClosed,
    /// The socket has not joined a room, or another socket took over its user.
    #[error("event received from a connection that has not joined a room")]
    NotJoined,
    /// Refused for the sender; the message is reported back to it.
    #[error("{0}")]
    Rejected(String),
    /// A room or question vanished; the event is dropped.
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Turn(#[from] TurnError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

impl From<StorageError> for EventError {
    fn from(err: StorageError) -> Self {
        EventError::Service(err.into())
    }
}

impl From<ConnectionClosed> for EventError {
    fn from(_: ConnectionClosed) -> Self {
        EventError::ConnectionClosed
    }
}

impl EventError {
    /// Text to send back to the sender, or `None` when the error is only logged.
    pub fn reply(&self) -> Option<String> {
        match self {
            EventError::ConnectionClosed | EventError::NotFound(_) => None,
            EventError::NotJoined => Some("Join a room first.".into()),
            EventError::Rejected(message) => Some(message.clone()),
            EventError::Turn(err) if err.is_not_found() => None,
            EventError::Turn(err) => Some(err.to_string()),
            EventError::Service(ServiceError::NotFound(_)) => None,
            EventError::Service(ServiceError::Degraded | ServiceError::Unavailable(_)) => {
                Some("The game service is temporarily unavailable.".into())
            }
            EventError::Service(_) => Some("Something went wrong, please try again.".into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Joined {
    user_id: UserId,
    room_id: RoomId,
}

/// Per-socket context carried across the events of one connection.
pub struct ClientSession {
    connection_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
    /// Room named by the endpoint query, if any.
    scope_room: Option<RoomId>,
    /// User proven by the connection credentials.
    authenticated_user: UserId,
    joined: Option<Joined>,
}

impl ClientSession {
    pub fn new(
        tx: mpsc::UnboundedSender<Message>,
        scope_room: Option<RoomId>,
        authenticated_user: UserId,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            tx,
            scope_room,
            authenticated_user,
            joined: None,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn tx(&self) -> &mpsc::UnboundedSender<Message> {
        &self.tx
    }

    /// User this socket joined as.
    pub fn user_id(&self) -> Option<UserId> {
        self.joined.map(|joined| joined.user_id)
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.joined.map(|joined| joined.room_id)
    }
}

/// Sender of an event, resolved from the registry and the stored membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub team: Team,
    pub is_host: bool,
}

impl Actor {
    /// Playing side of the sender, `None` for spectators.
    pub fn side(&self) -> Option<Side> {
        self.team.side()
    }

    fn ensure_room(&self, room_id: RoomId) -> Result<(), EventError> {
        if self.room_id == room_id {
            Ok(())
        } else {
            Err(EventError::Rejected("You are not in this room.".into()))
        }
    }
}

/// Process one inbound event for `client`.
pub async fn handle_event(
    state: &SharedState,
    client: &mut ClientSession,
    message: ClientMessage,
) -> Result<(), EventError> {
    let kind = message.kind();
    match message {
        ClientMessage::JoinRoom(payload) => join_room(state, client, payload).await,
        ClientMessage::Unknown => {
            debug!(user_id = ?client.user_id(), "ignoring unknown event type");
            Ok(())
        }
        event => {
            let (actor, store) = resolve_actor(state, client).await?;
            debug!(
                room_id = actor.room_id,
                user_id = actor.user_id,
                event = kind,
                "handling event"
            );

            let session = state.sessions().get_or_create(actor.room_id);
            let mut session = session.lock().await;
            dispatch(state, &mut session, &store, &actor, event).await
        }
    }
}

async fn dispatch(
    state: &SharedState,
    session: &mut RoomSession,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
    event: ClientMessage,
) -> Result<(), EventError> {
    match event {
        ClientMessage::Chat(payload) => chat(state, store, actor, payload).await,
        ClientMessage::TeamChange(payload) => team_change(state, store, actor, payload).await,
        ClientMessage::Spin => spin(state, store, actor).await,
        ClientMessage::StartGame(payload) => start_game(state, store, actor, payload).await,
        ClientMessage::SubmitTeamQuestion(payload) => {
            actor.ensure_room(payload.room_id)?;
            require_mode(store, actor.room_id, GameMode::TeamQuestions).await?;
            round_service::hydrate(session, store).await?;
            round_service::submit_question(state, session, store, actor, payload).await
        }
        ClientMessage::SelectPlayer(payload) => {
            actor.ensure_room(payload.room_id)?;
            require_mode(store, actor.room_id, GameMode::TeamQuestions).await?;
            round_service::hydrate(session, store).await?;
            round_service::select_player(state, session, store, actor, payload).await
        }
        ClientMessage::AnswerQuestion(payload) => {
            actor.ensure_room(payload.room_id)?;
            require_mode(store, actor.room_id, GameMode::TeamQuestions).await?;
            round_service::hydrate(session, store).await?;
            round_service::answer_question(state, session, store, actor, payload).await
        }
        ClientMessage::WrongAnswer => round_service::announce_wrong_answer(state, actor),
        ClientMessage::JoinRoom(_) | ClientMessage::Unknown => Ok(()),
    }
}

/// Unregister the socket on close. Timers and pending questions are left untouched.
pub fn disconnect(state: &SharedState, client: &ClientSession) {
    if let Some(joined) = client.joined
        && state
            .connections()
            .unregister_if(joined.user_id, client.connection_id)
    {
        info!(
            room_id = joined.room_id,
            user_id = joined.user_id,
            "player disconnected"
        );
        state.release_room_if_unused(joined.room_id);
    }
}

async fn join_room(
    state: &SharedState,
    client: &mut ClientSession,
    payload: JoinRoomPayload,
) -> Result<(), EventError> {
    let JoinRoomPayload { room_id, user_id } = payload;

    if client.scope_room.is_some_and(|scope| scope != room_id) {
        return Err(EventError::Rejected(
            "This connection belongs to another room.".into(),
        ));
    }
    if client.authenticated_user != user_id {
        return Err(EventError::Rejected("You can only join as yourself.".into()));
    }

    let store = state.require_store().await?;
    if store.get_room(room_id).await?.is_none() {
        return Err(EventError::Rejected("Room not found".into()));
    }
    let is_member = store
        .get_room_users(room_id)
        .await?
        .iter()
        .any(|member| member.user_id == user_id);
    if !is_member {
        return Err(EventError::Rejected(
            "You are not a member of this room".into(),
        ));
    }

    client.joined = Some(Joined { user_id, room_id });
    let replaced = state.connections().register(Connection {
        id: client.connection_id,
        user_id,
        room_id,
        tx: client.tx.clone(),
    });
    if let Some(previous) = replaced {
        if previous.id != client.connection_id {
            debug!(room_id, user_id, "newer connection replaced an older one");
        }
        if previous.room_id != room_id {
            state.release_room_if_unused(previous.room_id);
        }
    }
    info!(room_id, user_id, "player joined room");

    broadcast(state.connections(), room_id, &ServerMessage::game_update(room_id));

    let session = state.sessions().get_or_create(room_id);
    let mut session = session.lock().await;
    round_service::hydrate(&mut session, &store).await?;
    if let Some(view) = session.round.view() {
        send_to_one(&client.tx, &ServerMessage::question_state(room_id, view))?;
    }
    Ok(())
}

async fn resolve_actor(
    state: &SharedState,
    client: &ClientSession,
) -> Result<(Actor, Arc<dyn RoomStore>), EventError> {
    let joined = client.joined.ok_or(EventError::NotJoined)?;
    let registered = state
        .connections()
        .lookup(joined.user_id)
        .is_some_and(|connection| connection.id == client.connection_id);
    if !registered {
        return Err(EventError::NotJoined);
    }

    let store = state.require_store().await?;
    let member = store
        .get_room_users(joined.room_id)
        .await?
        .into_iter()
        .find(|member| member.user_id == joined.user_id)
        .ok_or_else(|| EventError::Rejected("You are not a member of this room".into()))?;

    Ok((
        Actor {
            user_id: member.user_id,
            room_id: member.room_id,
            team: member.team,
            is_host: member.is_host,
        },
        store,
    ))
}

async fn load_room(store: &Arc<dyn RoomStore>, room_id: RoomId) -> Result<RoomEntity, EventError> {
    store
        .get_room(room_id)
        .await?
        .ok_or_else(|| EventError::NotFound(format!("room {room_id}")))
}

async fn require_mode(
    store: &Arc<dyn RoomStore>,
    room_id: RoomId,
    mode: GameMode,
) -> Result<RoomEntity, EventError> {
    let room = load_room(store, room_id).await?;
    if room.mode == mode {
        return Ok(room);
    }
    let message = match mode {
        GameMode::TeamQuestions => "Team questions are not enabled in this room.",
        GameMode::Spin => "Spin is only available in spin mode.",
    };
    Err(EventError::Rejected(message.into()))
}

async fn chat(
    state: &SharedState,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
    payload: ChatPayload,
) -> Result<(), EventError> {
    if let Some(team) = payload.team
        && actor.side() != Some(team)
    {
        return Err(EventError::Rejected(
            "You can only chat with your own team.".into(),
        ));
    }

    let message = store
        .create_message(NewMessage {
            room_id: actor.room_id,
            user_id: actor.user_id,
            content: payload.content,
            kind: MessageKind::Chat,
            team: payload.team,
        })
        .await?;
    broadcast(
        state.connections(),
        actor.room_id,
        &ServerMessage::chat(message),
    );
    Ok(())
}

async fn team_change(
    state: &SharedState,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
    payload: TeamChangePayload,
) -> Result<(), EventError> {
    store
        .update_room_user(
            actor.room_id,
            actor.user_id,
            RoomUserUpdate {
                team: Some(payload.team),
            },
        )
        .await?;
    info!(
        room_id = actor.room_id,
        user_id = actor.user_id,
        team = payload.team.as_str(),
        "player changed team"
    );
    broadcast(
        state.connections(),
        actor.room_id,
        &ServerMessage::game_update(actor.room_id),
    );
    Ok(())
}

async fn spin(
    state: &SharedState,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
) -> Result<(), EventError> {
    require_mode(store, actor.room_id, GameMode::Spin).await?;

    let eligible: Vec<UserId> = store
        .get_room_users(actor.room_id)
        .await?
        .into_iter()
        .filter(|member| member.team.side().is_some())
        .map(|member| member.user_id)
        .collect();
    if eligible.is_empty() {
        return Err(EventError::Rejected("No players have joined a team yet.".into()));
    }
    let question = store
        .get_random_question()
        .await?
        .ok_or_else(|| EventError::Rejected("No questions are available.".into()))?;
    let selected = eligible[rand::random_range(0..eligible.len())];

    info!(room_id = actor.room_id, user_id = selected, "spin landed");
    broadcast(
        state.connections(),
        actor.room_id,
        &ServerMessage::spin_result(selected, question),
    );
    Ok(())
}

async fn start_game(
    state: &SharedState,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
    payload: StartGamePayload,
) -> Result<(), EventError> {
    actor.ensure_room(payload.room_id)?;
    let room = store
        .get_room(actor.room_id)
        .await?
        .ok_or_else(|| EventError::Rejected("Room not found".into()))?;
    if room.host_id != actor.user_id {
        return Err(EventError::Rejected("Only the host can start the game".into()));
    }
    if room.status == RoomStatus::Playing {
        return Err(EventError::Rejected("The game has already started.".into()));
    }

    store
        .update_room(
            room.id,
            RoomUpdate {
                status: Some(RoomStatus::Playing),
                mode: payload.mode,
                ..RoomUpdate::default()
            },
        )
        .await?;
    info!(room_id = room.id, mode = ?payload.mode, "game started");
    broadcast(
        state.connections(),
        room.id,
        &ServerMessage::game_update(room.id),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{FutureExt, future::BoxFuture};
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{
                MessageEntity, NewQuestion, QuestionEntity, RoomUserEntity, TeamQuestionEntity,
            },
            room_store::{RoomStore, memory::MemoryRoomStore},
            storage::StorageResult,
        },
        state::{AppState, round::PhaseKind},
    };

    const HOST: UserId = 1;
    const RED: UserId = 2;
    const BLUE: UserId = 7;
    const BLUE_MATE: UserId = 8;
    const SPECTATOR: UserId = 9;

    struct Harness {
        state: SharedState,
        store: MemoryRoomStore,
        room_id: RoomId,
    }

    struct Player {
        client: ClientSession,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Player {
        fn new(scope_room: Option<RoomId>, authenticated_user: UserId) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                client: ClientSession::new(tx, scope_room, authenticated_user),
                rx,
            }
        }

        /// Frames received since the last call, parsed as JSON.
        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                if let Message::Text(text) = message {
                    frames.push(serde_json::from_str(text.as_str()).unwrap());
                }
            }
            frames
        }
    }

    /// Memory store whose selected writes fail as if the database went away.
    #[derive(Clone)]
    struct FlakyStore {
        inner: MemoryRoomStore,
        fail_award: bool,
        fail_clear: bool,
    }

    fn outage() -> StorageError {
        StorageError::unavailable(
            "write rejected".into(),
            std::io::Error::other("connection reset"),
        )
    }

    impl RoomStore for FlakyStore {
        fn create_room(
            &self,
            host_id: UserId,
            code: String,
        ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
            self.inner.create_room(host_id, code)
        }
        fn get_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
            self.inner.get_room(id)
        }
        fn get_room_by_code(
            &self,
            code: String,
        ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
            self.inner.get_room_by_code(code)
        }
        fn update_room(
            &self,
            id: RoomId,
            update: RoomUpdate,
        ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
            self.inner.update_room(id, update)
        }
        fn award_point(
            &self,
            id: RoomId,
            side: Side,
        ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
            if self.fail_award {
                return async { Err(outage()) }.boxed();
            }
            self.inner.award_point(id, side)
        }
        fn add_user_to_room(
            &self,
            room_id: RoomId,
            user_id: UserId,
            is_host: bool,
        ) -> BoxFuture<'static, StorageResult<RoomUserEntity>> {
            self.inner.add_user_to_room(room_id, user_id, is_host)
        }
        fn get_room_users(
            &self,
            room_id: RoomId,
        ) -> BoxFuture<'static, StorageResult<Vec<RoomUserEntity>>> {
            self.inner.get_room_users(room_id)
        }
        fn update_room_user(
            &self,
            room_id: RoomId,
            user_id: UserId,
            update: RoomUserUpdate,
        ) -> BoxFuture<'static, StorageResult<RoomUserEntity>> {
            self.inner.update_room_user(room_id, user_id, update)
        }
        fn create_message(
            &self,
            message: NewMessage,
        ) -> BoxFuture<'static, StorageResult<MessageEntity>> {
            self.inner.create_message(message)
        }
        fn get_room_messages(
            &self,
            room_id: RoomId,
        ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
            self.inner.get_room_messages(room_id)
        }
        fn create_question(
            &self,
            question: NewQuestion,
        ) -> BoxFuture<'static, StorageResult<QuestionEntity>> {
            self.inner.create_question(question)
        }
        fn count_questions(&self) -> BoxFuture<'static, StorageResult<u64>> {
            self.inner.count_questions()
        }
        fn get_random_question(&self) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
            self.inner.get_random_question()
        }
        fn create_team_question(
            &self,
            question: TeamQuestionEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.create_team_question(question)
        }
        fn get_team_question_for_room(
            &self,
            room_id: RoomId,
        ) -> BoxFuture<'static, StorageResult<Option<TeamQuestionEntity>>> {
            self.inner.get_team_question_for_room(room_id)
        }
        fn clear_team_question_for_room(
            &self,
            room_id: RoomId,
        ) -> BoxFuture<'static, StorageResult<()>> {
            if self.fail_clear {
                return async { Err(outage()) }.boxed();
            }
            self.inner.clear_team_question_for_room(room_id)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    fn of_type<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
        frames.iter().filter(|frame| frame["type"] == kind).collect()
    }

    async fn harness_with(config: AppConfig) -> Harness {
        let state = AppState::new(config);
        let store = MemoryRoomStore::new();
        state.set_store(Arc::new(store.clone())).await;

        let room = store.create_room(HOST, "ROOM01".into()).await.unwrap();
        for (user_id, team, is_host) in [
            (HOST, Team::Red, true),
            (RED, Team::Red, false),
            (BLUE, Team::Blue, false),
            (BLUE_MATE, Team::Blue, false),
            (SPECTATOR, Team::Spectator, false),
        ] {
            store.add_user_to_room(room.id, user_id, is_host).await.unwrap();
            store
                .update_room_user(room.id, user_id, RoomUserUpdate { team: Some(team) })
                .await
                .unwrap();
        }

        Harness {
            state,
            store,
            room_id: room.id,
        }
    }

    async fn harness() -> Harness {
        harness_with(AppConfig::default()).await
    }

    impl Harness {
        async fn send(&self, player: &mut Player, payload: Value) -> Result<(), EventError> {
            let message = ClientMessage::from_json_str(&payload.to_string()).unwrap();
            handle_event(&self.state, &mut player.client, message).await
        }

        async fn join(&self, user_id: UserId) -> Player {
            let mut player = Player::new(None, user_id);
            self.send(
                &mut player,
                json!({"type": "join_room", "roomId": self.room_id, "userId": user_id}),
            )
            .await
            .unwrap();
            player
        }

        async fn join_all(&self) -> (Player, Player, Player) {
            let red = self.join(RED).await;
            let blue = self.join(BLUE).await;
            let spectator = self.join(SPECTATOR).await;
            (red, blue, spectator)
        }

        async fn submit(&self, player: &mut Player, question: &str, answer: &str) {
            self.send(
                player,
                json!({"type": "submit_team_question", "roomId": self.room_id, "question": question, "answer": answer}),
            )
            .await
            .unwrap();
        }

        async fn select(&self, player: &mut Player, player_id: UserId) -> Result<(), EventError> {
            self.send(
                player,
                json!({"type": "select_player", "roomId": self.room_id, "playerId": player_id}),
            )
            .await
        }

        async fn answer(&self, player: &mut Player, answer: &str) -> Result<(), EventError> {
            self.send(
                player,
                json!({"type": "answer_question", "roomId": self.room_id, "answer": answer}),
            )
            .await
        }

        async fn phase(&self) -> PhaseKind {
            let session = self.state.sessions().get_or_create(self.room_id);
            session.lock().await.round.kind()
        }

        async fn time_left(&self) -> Option<u32> {
            let session = self.state.sessions().get_or_create(self.room_id);
            session.lock().await.round.view().and_then(|view| view.time_left)
        }

        async fn room(&self) -> RoomEntity {
            self.store.get_room(self.room_id).await.unwrap().unwrap()
        }

        async fn stored_question(&self) -> Option<TeamQuestionEntity> {
            self.store
                .get_team_question_for_room(self.room_id)
                .await
                .unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn correct_answer_scores_for_the_answering_team() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();
        spectator.drain();
        h.answer(&mut blue, "paris").await.unwrap();

        let frames = spectator.drain();
        assert_eq!(frames[0]["type"], "answer_result");
        assert_eq!(frames[0]["correct"], true);
        assert_eq!(frames[0]["answeringTeam"], "blue");
        assert_eq!(frames[0]["question"], "Capital of France?");
        assert_eq!(frames[0]["answer"], "Paris");
        assert_eq!(frames[1]["type"], "game_update");

        let room = h.room().await;
        assert_eq!(room.blue_score, 1);
        assert_eq!(room.red_score, 0);
        assert_eq!(room.current_team, Side::Blue);
        assert!(h.stored_question().await.is_none());
        assert_eq!(h.phase().await, PhaseKind::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_question_cleanup_still_scores_once() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;
        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();

        h.state
            .set_store(Arc::new(FlakyStore {
                inner: h.store.clone(),
                fail_award: false,
                fail_clear: true,
            }))
            .await;

        h.answer(&mut blue, "paris").await.unwrap();
        let err = h.answer(&mut blue, "paris").await.unwrap_err();
        assert!(matches!(err, EventError::Turn(TurnError::NoPendingQuestion)));

        assert_eq!(h.room().await.blue_score, 1);
        assert_eq!(h.phase().await, PhaseKind::Idle);

        spectator.drain();
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(spectator.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_score_write_still_ends_the_round() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;
        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();

        h.state
            .set_store(Arc::new(FlakyStore {
                inner: h.store.clone(),
                fail_award: true,
                fail_clear: false,
            }))
            .await;
        spectator.drain();

        let err = h.answer(&mut blue, "paris").await.unwrap_err();
        assert_eq!(
            err.reply().as_deref(),
            Some("The game service is temporarily unavailable.")
        );
        assert_eq!(h.phase().await, PhaseKind::Idle);
        assert_eq!(h.room().await.blue_score, 0);
        assert_eq!(
            spectator.drain(),
            vec![json!({"type": "game_update", "roomId": h.room_id})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_answer_keeps_the_round_running() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();
        spectator.drain();
        h.answer(&mut blue, "Lyon").await.unwrap();

        let frames = spectator.drain();
        assert_eq!(frames[0]["type"], "answer_result");
        assert_eq!(frames[0]["correct"], false);
        assert!(frames[0].get("answer").is_none());
        assert_eq!(
            frames[1],
            json!({"type": "wrong_answer", "team": "blue", "userId": BLUE})
        );

        let room = h.room().await;
        assert_eq!((room.red_score, room.blue_score), (0, 0));
        assert!(h.stored_question().await.is_some());
        assert_eq!(h.phase().await, PhaseKind::AwaitingAnswer);

        h.answer(&mut blue, " PARIS ").await.unwrap();
        assert_eq!(h.room().await.blue_score, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_answer_can_end_the_round() {
        let config = AppConfig::from_json_str(r#"{ "wrongAnswerEndsRound": true }"#).unwrap();
        let h = harness_with(config).await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();
        spectator.drain();
        h.answer(&mut blue, "Lyon").await.unwrap();

        let frames = spectator.drain();
        assert_eq!(of_type(&frames, "answer_result").len(), 1);
        assert_eq!(of_type(&frames, "game_update").len(), 1);
        assert_eq!(h.phase().await, PhaseKind::Idle);
        assert!(h.stored_question().await.is_none());
        assert_eq!(h.room().await.blue_score, 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(of_type(&spectator.drain(), "question_state").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn authoring_team_cannot_select() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        red.drain();
        blue.drain();
        spectator.drain();

        let err = h.select(&mut red, RED).await.unwrap_err();
        assert!(matches!(err, EventError::Turn(TurnError::WrongSelector)));
        assert_eq!(
            err.reply().as_deref(),
            Some("Only the opposing team can select a player to answer.")
        );
        assert!(blue.drain().is_empty());
        assert!(spectator.drain().is_empty());
        assert_eq!(h.phase().await, PhaseKind::AwaitingSelection);
        assert_eq!(h.stored_question().await.unwrap().selected_player_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_starts_the_countdown() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        let frames = spectator.drain();
        let submitted = of_type(&frames, "question_state");
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0]["canAnswer"], false);
        assert_eq!(submitted[0]["authorTeam"], "red");
        assert!(submitted[0].get("answer").is_none());
        assert!(submitted[0].get("timeLeft").is_none());

        h.select(&mut blue, BLUE_MATE).await.unwrap();
        let frames = spectator.drain();
        assert_eq!(frames[0]["canAnswer"], true);
        assert_eq!(frames[0]["selectedPlayerId"], BLUE_MATE);
        assert_eq!(frames[0]["timeLeft"], 20);
        assert_eq!(
            h.stored_question().await.unwrap().selected_player_id,
            Some(BLUE_MATE)
        );

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let ticks: Vec<_> = of_type(&spectator.drain(), "question_state")
            .into_iter()
            .map(|frame| frame["timeLeft"].as_u64().unwrap())
            .collect();
        assert_eq!(ticks, vec![19, 18, 17]);

        let err = h.select(&mut blue, BLUE).await.unwrap_err();
        assert!(matches!(err, EventError::Turn(TurnError::AlreadySelected)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_the_round_without_scoring() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();
        spectator.drain();

        tokio::time::sleep(Duration::from_millis(20_500)).await;

        let frames = spectator.drain();
        let ticks = of_type(&frames, "question_state");
        assert_eq!(ticks.len(), 19);
        assert_eq!(ticks.last().unwrap()["timeLeft"], 1);

        let tail: Vec<_> = frames[ticks.len()..].to_vec();
        assert_eq!(tail[0]["type"], "answer_result");
        assert_eq!(tail[0]["correct"], false);
        assert_eq!(tail[0]["answeringTeam"], "blue");
        assert_eq!(
            tail[1],
            json!({"type": "wrong_answer", "team": "blue", "userId": 0})
        );
        assert_eq!(tail[2]["type"], "game_update");

        let room = h.room().await;
        assert_eq!((room.red_score, room.blue_score), (0, 0));
        assert_eq!(room.current_team, Side::Blue);
        assert!(h.stored_question().await.is_none());
        assert_eq!(h.phase().await, PhaseKind::Idle);

        let err = h.answer(&mut blue, "Paris").await.unwrap_err();
        assert!(err.reply().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resubmission_replaces_question_and_countdown() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(h.time_left().await, Some(15));

        h.submit(&mut red, "What has keys but can't open locks?", "Piano")
            .await;
        assert_eq!(h.phase().await, PhaseKind::AwaitingSelection);
        assert_eq!(
            h.stored_question().await.unwrap().text,
            "What has keys but can't open locks?"
        );

        h.select(&mut blue, BLUE).await.unwrap();
        spectator.drain();
        tokio::time::sleep(Duration::from_millis(5_500)).await;

        assert_eq!(h.time_left().await, Some(15));
        let ticks: Vec<_> = of_type(&spectator.drain(), "question_state")
            .into_iter()
            .map(|frame| frame["timeLeft"].as_u64().unwrap())
            .collect();
        assert_eq!(ticks, vec![19, 18, 17, 16, 15]);
    }

    #[tokio::test(start_paused = true)]
    async fn opposing_team_cannot_replace_a_pending_question() {
        let h = harness().await;
        let (mut red, mut blue, _spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        let err = h
            .send(
                &mut blue,
                json!({"type": "submit_team_question", "roomId": h.room_id, "question": "2+2?", "answer": "4"}),
            )
            .await
            .unwrap_err();

        assert_eq!(err.reply().as_deref(), Some("A question is already in play."));
        assert_eq!(h.stored_question().await.unwrap().text, "Capital of France?");
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_opposing_team_may_answer() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        let err = h.answer(&mut blue, "Paris").await.unwrap_err();
        assert_eq!(
            err.reply().as_deref(),
            Some("It's not your team's turn to answer!")
        );

        h.select(&mut blue, BLUE).await.unwrap();
        for player in [&mut red, &mut spectator] {
            let err = h.answer(player, "Paris").await.unwrap_err();
            assert!(matches!(err, EventError::Turn(TurnError::NotYourTurn)));
        }
        assert_eq!(h.room().await.red_score, 0);
        assert_eq!(h.phase().await, PhaseKind::AwaitingAnswer);
    }

    #[tokio::test(start_paused = true)]
    async fn turn_events_without_question_are_dropped_silently() {
        let h = harness().await;
        let (_red, mut blue, _spectator) = h.join_all().await;

        let err = h.select(&mut blue, BLUE).await.unwrap_err();
        assert!(matches!(err, EventError::Turn(TurnError::NoPendingQuestion)));
        assert!(err.reply().is_none());

        let err = h.answer(&mut blue, "Paris").await.unwrap_err();
        assert!(err.reply().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn selected_player_must_be_on_the_selecting_team() {
        let h = harness().await;
        let (mut red, mut blue, _spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        for player_id in [RED, SPECTATOR, 999] {
            let err = h.select(&mut blue, player_id).await.unwrap_err();
            assert_eq!(
                err.reply().as_deref(),
                Some("The selected player is not on your team.")
            );
        }
        assert_eq!(h.phase().await, PhaseKind::AwaitingSelection);
    }

    #[tokio::test(start_paused = true)]
    async fn events_require_a_joined_connection() {
        let h = harness().await;
        let mut stranger = Player::new(None, BLUE);

        let err = h
            .send(&mut stranger, json!({"type": "chat", "content": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::NotJoined));

        let mut first = h.join(BLUE).await;
        let _second = h.join(BLUE).await;
        let err = h
            .send(&mut first, json!({"type": "chat", "content": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::NotJoined));
    }

    #[tokio::test(start_paused = true)]
    async fn join_checks_room_membership_and_identity() {
        let h = harness().await;

        let mut outsider = Player::new(None, 404);
        let err = h
            .send(
                &mut outsider,
                json!({"type": "join_room", "roomId": h.room_id, "userId": 404}),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.reply().as_deref(),
            Some("You are not a member of this room")
        );

        let err = h
            .send(
                &mut outsider,
                json!({"type": "join_room", "roomId": 999, "userId": 404}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reply().as_deref(), Some("Room not found"));

        let mut scoped = Player::new(Some(h.room_id + 1), BLUE);
        let err = h
            .send(
                &mut scoped,
                json!({"type": "join_room", "roomId": h.room_id, "userId": BLUE}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Rejected(_)));

        let mut impostor = Player::new(Some(h.room_id), RED);
        let err = h
            .send(
                &mut impostor,
                json!({"type": "join_room", "roomId": h.room_id, "userId": BLUE}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reply().as_deref(), Some("You can only join as yourself."));
        assert!(h.state.connections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn socket_cannot_act_as_another_user() {
        let h = harness().await;
        let mut red = Player::new(None, RED);

        let err = h
            .send(
                &mut red,
                json!({"type": "join_room", "roomId": h.room_id, "userId": HOST}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reply().as_deref(), Some("You can only join as yourself."));

        let err = h
            .send(&mut red, json!({"type": "start_game", "roomId": h.room_id}))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::NotJoined));
        assert_eq!(h.room().await.status, RoomStatus::Lobby);
        assert!(h.state.connections().lookup(HOST).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn join_announces_the_player_and_syncs_late_joiners() {
        let h = harness().await;
        let mut red = h.join(RED).await;
        assert_eq!(
            red.drain(),
            vec![json!({"type": "game_update", "roomId": h.room_id})]
        );

        h.submit(&mut red, "Capital of France?", "Paris").await;
        red.drain();

        let mut late = h.join(BLUE).await;
        assert_eq!(of_type(&red.drain(), "game_update").len(), 1);
        let frames = late.drain();
        assert_eq!(frames[0]["type"], "game_update");
        assert_eq!(frames[1]["type"], "question_state");
        assert_eq!(frames[1]["question"], "Capital of France?");
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_question_is_restored_awaiting_selection() {
        let h = harness().await;
        h.store
            .create_team_question(TeamQuestionEntity {
                room_id: h.room_id,
                text: "Capital of France?".into(),
                answer: "Paris".into(),
                author_team: Side::Red,
                selected_player_id: Some(BLUE),
                created_at: std::time::SystemTime::now(),
            })
            .await
            .unwrap();

        let mut blue = h.join(BLUE).await;
        let frames = blue.drain();
        assert_eq!(frames[1]["type"], "question_state");
        assert_eq!(frames[1]["canAnswer"], false);
        assert!(frames[1].get("selectedPlayerId").is_none());

        h.select(&mut blue, BLUE).await.unwrap();
        h.answer(&mut blue, "Paris").await.unwrap();
        assert_eq!(h.room().await.blue_score, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnecting_keeps_the_countdown_running() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();
        disconnect(&h.state, &blue.client);
        assert!(h.state.connections().lookup(BLUE).is_none());
        spectator.drain();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(of_type(&spectator.drain(), "question_state").len(), 2);
        assert_eq!(h.time_left().await, Some(18));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_released_when_the_room_empties() {
        let h = harness().await;
        let red = h.join(RED).await;
        let blue = h.join(BLUE).await;
        assert!(h.state.sessions().get(h.room_id).is_some());

        disconnect(&h.state, &red.client);
        assert!(h.state.sessions().get(h.room_id).is_some());
        disconnect(&h.state, &blue.client);
        assert!(h.state.sessions().get(h.room_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_question_keeps_the_session_until_time_runs_out() {
        let h = harness().await;
        let mut red = h.join(RED).await;
        let mut blue = h.join(BLUE).await;

        h.submit(&mut red, "Capital of France?", "Paris").await;
        h.select(&mut blue, BLUE).await.unwrap();
        disconnect(&h.state, &red.client);
        disconnect(&h.state, &blue.client);
        assert!(h.state.sessions().get(h.room_id).is_some());

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(h.state.sessions().get(h.room_id).is_none());
        assert!(h.stored_question().await.is_none());
        assert_eq!(h.room().await.current_team, Side::Blue);
    }

    #[tokio::test(start_paused = true)]
    async fn start_game_is_reserved_to_the_host() {
        let h = harness().await;
        let mut host = h.join(HOST).await;
        let mut red = h.join(RED).await;
        host.drain();
        red.drain();

        let start = json!({"type": "start_game", "roomId": h.room_id});
        let err = h.send(&mut red, start.clone()).await.unwrap_err();
        assert_eq!(
            err.reply().as_deref(),
            Some("Only the host can start the game")
        );
        assert!(host.drain().is_empty());

        h.send(&mut host, start.clone()).await.unwrap();
        assert_eq!(h.room().await.status, RoomStatus::Playing);
        assert_eq!(of_type(&red.drain(), "game_update").len(), 1);

        let err = h.send(&mut host, start).await.unwrap_err();
        assert_eq!(err.reply().as_deref(), Some("The game has already started."));
    }

    #[tokio::test(start_paused = true)]
    async fn chat_is_persisted_and_team_channels_are_guarded() {
        let h = harness().await;
        let (mut red, mut blue, mut spectator) = h.join_all().await;
        spectator.drain();

        h.send(&mut red, json!({"type": "chat", "content": "hello all"}))
            .await
            .unwrap();
        let frames = spectator.drain();
        assert_eq!(frames[0]["type"], "chat");
        assert_eq!(frames[0]["message"]["content"], "hello all");
        assert_eq!(frames[0]["message"]["userId"], RED);
        assert!(frames[0]["message"].get("team").is_none());

        let err = h
            .send(&mut blue, json!({"type": "chat", "content": "psst", "team": "red"}))
            .await
            .unwrap_err();
        assert_eq!(
            err.reply().as_deref(),
            Some("You can only chat with your own team.")
        );

        h.send(&mut blue, json!({"type": "chat", "content": "psst", "team": "blue"}))
            .await
            .unwrap();
        let messages = h.store.get_room_messages(h.room_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].team, Some(Side::Blue));
    }

    #[tokio::test(start_paused = true)]
    async fn team_change_is_persisted_and_announced() {
        let h = harness().await;
        let (_red, _blue, mut spectator) = h.join_all().await;
        spectator.drain();

        h.send(&mut spectator, json!({"type": "team_change", "team": "red"}))
            .await
            .unwrap();

        assert_eq!(of_type(&spectator.drain(), "game_update").len(), 1);
        let members = h.store.get_room_users(h.room_id).await.unwrap();
        let member = members.iter().find(|m| m.user_id == SPECTATOR).unwrap();
        assert_eq!(member.team, Team::Red);
    }

    #[tokio::test(start_paused = true)]
    async fn spin_is_gated_by_the_room_mode() {
        let h = harness().await;
        let mut host = h.join(HOST).await;
        let mut spectator = h.join(SPECTATOR).await;

        let err = h.send(&mut host, json!({"type": "spin"})).await.unwrap_err();
        assert_eq!(
            err.reply().as_deref(),
            Some("Spin is only available in spin mode.")
        );

        h.send(
            &mut host,
            json!({"type": "start_game", "roomId": h.room_id, "mode": "spin"}),
        )
        .await
        .unwrap();
        let err = h.send(&mut host, json!({"type": "spin"})).await.unwrap_err();
        assert_eq!(err.reply().as_deref(), Some("No questions are available."));

        for question in AppConfig::default().seed_questions() {
            h.store.create_question(question.clone()).await.unwrap();
        }
        spectator.drain();
        h.send(&mut host, json!({"type": "spin"})).await.unwrap();

        let frames = spectator.drain();
        assert_eq!(frames[0]["type"], "spin_result");
        let picked = frames[0]["userId"].as_i64().unwrap();
        assert!([HOST, RED, BLUE, BLUE_MATE].contains(&picked));
        assert!(frames[0]["question"].get("answer").is_none());

        let err = h
            .send(
                &mut host,
                json!({"type": "submit_team_question", "roomId": h.room_id, "question": "Q?", "answer": "A"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_answer_notice_requires_a_team() {
        let h = harness().await;
        let (_red, mut blue, mut spectator) = h.join_all().await;
        spectator.drain();

        h.send(&mut blue, json!({"type": "wrong_answer"})).await.unwrap();
        assert_eq!(
            spectator.drain(),
            vec![json!({"type": "wrong_answer", "team": "blue", "userId": BLUE})]
        );

        let err = h
            .send(&mut spectator, json!({"type": "wrong_answer"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_mode_is_reported() {
        let h = harness().await;
        h.state.update_degraded(true);

        let mut player = Player::new(None, BLUE);
        let err = h
            .send(
                &mut player,
                json!({"type": "join_room", "roomId": h.room_id, "userId": BLUE}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Service(ServiceError::Degraded)));
        assert_eq!(
            err.reply().as_deref(),
            Some("The game service is temporarily unavailable.")
        );
    }
}
