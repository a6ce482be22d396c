use std::{sync::Arc, time::SystemTime};

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{RoomId, RoomUpdate, SYSTEM_USER_ID, Side, TeamQuestionEntity},
        room_store::RoomStore,
    },
    dto::ws::{AnswerPayload, SelectPlayerPayload, ServerMessage, SubmitQuestionPayload},
    services::{
        broadcast::broadcast,
        coordinator::{Actor, EventError},
    },
    state::{
        RoomSession, SharedState,
        countdown::TimerTask,
        round::{PendingQuestion, Tick, TurnError},
    },
};

/// Load the persisted pending question the first time a room session is used.
///
/// A restored question waits for a new selection; countdowns are not resumed.
pub async fn hydrate(session: &mut RoomSession, store: &Arc<dyn RoomStore>) -> Result<(), EventError> {
    if session.hydrated {
        return Ok(());
    }

    if let Some(record) = store.get_team_question_for_room(session.room_id).await? {
        if session.round.restore(record.into()) {
            info!(room_id = session.room_id, "restored pending question");
        }
    }
    session.hydrated = true;
    Ok(())
}

fn broadcast_question_state(state: &SharedState, session: &RoomSession) {
    if let Some(view) = session.round.view() {
        broadcast(
            state.connections(),
            session.room_id,
            &ServerMessage::question_state(session.room_id, view),
        );
    }
}

/// Record a question written by the sender's team and wait for the opponents to pick an answerer.
pub async fn submit_question(
    state: &SharedState,
    session: &mut RoomSession,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
    payload: SubmitQuestionPayload,
) -> Result<(), EventError> {
    let asker = actor
        .side()
        .ok_or_else(|| EventError::Rejected("Spectators cannot ask questions.".into()))?;
    session.round.ensure_can_submit(asker)?;

    let question = PendingQuestion {
        text: payload.question.trim().to_owned(),
        answer: payload.answer.trim().to_owned(),
        author_team: asker,
    };

    store.clear_team_question_for_room(session.room_id).await?;
    store
        .create_team_question(TeamQuestionEntity {
            room_id: session.room_id,
            text: question.text.clone(),
            answer: question.answer.clone(),
            author_team: asker,
            selected_player_id: None,
            created_at: SystemTime::now(),
        })
        .await?;

    if session.round.submit(question).is_some() {
        debug!(room_id = session.room_id, "pending question replaced");
    }
    info!(
        room_id = session.room_id,
        user_id = actor.user_id,
        team = asker.as_str(),
        "question submitted"
    );
    broadcast_question_state(state, session);
    Ok(())
}

/// Pick the player who answers the pending question and start the countdown.
pub async fn select_player(
    state: &SharedState,
    session: &mut RoomSession,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
    payload: SelectPlayerPayload,
) -> Result<(), EventError> {
    let selector = actor.side().ok_or(TurnError::WrongSelector)?;
    let question = session.round.ensure_can_select(selector)?.clone();
    let room_id = session.room_id;

    let on_team = store
        .get_room_users(room_id)
        .await?
        .iter()
        .any(|member| member.user_id == payload.player_id && member.team.side() == Some(selector));
    if !on_team {
        return Err(EventError::Rejected(
            "The selected player is not on your team.".into(),
        ));
    }

    let record = match store.get_team_question_for_room(room_id).await? {
        Some(mut record) => {
            record.selected_player_id = Some(payload.player_id);
            record
        }
        None => TeamQuestionEntity {
            room_id,
            text: question.text,
            answer: question.answer,
            author_team: question.author_team,
            selected_player_id: Some(payload.player_id),
            created_at: SystemTime::now(),
        },
    };
    store.create_team_question(record).await?;

    let round_id = Uuid::new_v4();
    let time_left = state.config().answer_time_secs();
    let timer = spawn_countdown(state.clone(), room_id, round_id);
    session
        .round
        .begin_answer(payload.player_id, time_left, round_id, timer)?;

    info!(
        room_id,
        user_id = actor.user_id,
        player_id = payload.player_id,
        "answerer selected"
    );
    broadcast_question_state(state, session);
    Ok(())
}

/// Judge an answer from the answering team.
///
/// A correct answer scores one point and ends the round. A wrong one is announced and
/// the clock keeps running unless the room is configured to end the round on a miss.
pub async fn answer_question(
    state: &SharedState,
    session: &mut RoomSession,
    store: &Arc<dyn RoomStore>,
    actor: &Actor,
    payload: AnswerPayload,
) -> Result<(), EventError> {
    let answerer = actor.side().ok_or(TurnError::NotYourTurn)?;
    let verdict = session.round.judge(answerer, &payload.answer)?;
    let room_id = session.room_id;

    if verdict.correct {
        // Ended in memory before any write; a failed write leaves no answerable question.
        session.round.finish();
        if let Err(err) = store.award_point(room_id, answerer).await {
            broadcast(state.connections(), room_id, &ServerMessage::game_update(room_id));
            return Err(err.into());
        }
        if let Err(err) = store.clear_team_question_for_room(room_id).await {
            warn!(room_id, error = %err, "failed to clear answered question");
        }

        info!(room_id, user_id = actor.user_id, team = answerer.as_str(), "correct answer");
        broadcast(
            state.connections(),
            room_id,
            &ServerMessage::answer_result(room_id, verdict),
        );
        broadcast(state.connections(), room_id, &ServerMessage::game_update(room_id));
        return Ok(());
    }

    debug!(room_id, user_id = actor.user_id, "wrong answer");
    broadcast(
        state.connections(),
        room_id,
        &ServerMessage::answer_result(room_id, verdict),
    );
    broadcast(
        state.connections(),
        room_id,
        &ServerMessage::wrong_answer(answerer, actor.user_id),
    );

    if state.config().wrong_answer_ends_round() {
        close_round(state, session, store, answerer).await?;
    }
    Ok(())
}

/// Clear the pending question, hand the next question to `next_asker` and tell clients.
async fn close_round(
    state: &SharedState,
    session: &mut RoomSession,
    store: &Arc<dyn RoomStore>,
    next_asker: Side,
) -> Result<(), EventError> {
    let room_id = session.room_id;
    session.round.finish();
    store.clear_team_question_for_room(room_id).await?;
    store
        .update_room(
            room_id,
            RoomUpdate {
                current_team: Some(next_asker),
                ..RoomUpdate::default()
            },
        )
        .await?;
    broadcast(state.connections(), room_id, &ServerMessage::game_update(room_id));
    Ok(())
}

/// Cosmetic miss announcement sent by a player.
pub fn announce_wrong_answer(state: &SharedState, actor: &Actor) -> Result<(), EventError> {
    let team = actor
        .side()
        .ok_or_else(|| EventError::Rejected("Spectators cannot do that.".into()))?;
    broadcast(
        state.connections(),
        actor.room_id,
        &ServerMessage::wrong_answer(team, actor.user_id),
    );
    Ok(())
}

/// Spawn the countdown of round `round_id`, ticking at the configured interval.
pub fn spawn_countdown(state: SharedState, room_id: RoomId, round_id: Uuid) -> TimerTask {
    let period = state.config().tick_interval();
    TimerTask::new(tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !countdown_tick(&state, room_id, round_id).await {
                break;
            }
        }
        debug!(room_id, %round_id, "countdown finished");
    }))
}

/// Apply one tick; returns whether the countdown must keep running.
async fn countdown_tick(state: &SharedState, room_id: RoomId, round_id: Uuid) -> bool {
    let Some(session) = state.sessions().get(room_id) else {
        return false;
    };
    let tick = {
        let mut session = session.lock().await;
        let tick = session.round.tick(round_id);
        match tick {
            Tick::Stale => {}
            Tick::Remaining(_) => broadcast_question_state(state, &session),
            Tick::Expired => expire_round(state, &mut session, round_id).await,
        }
        tick
    };
    drop(session);

    match tick {
        Tick::Stale => false,
        Tick::Remaining(_) => true,
        Tick::Expired => {
            state.release_room_if_unused(room_id);
            false
        }
    }
}

/// End a round whose clock ran out. No score changes.
async fn expire_round(state: &SharedState, session: &mut RoomSession, round_id: Uuid) {
    // The countdown calling this owns the timer; detach it so ending the round does not abort us.
    if !session.round.release_timer(round_id) {
        return;
    }
    let Some(question) = session.round.pending().cloned() else {
        return;
    };
    let room_id = session.room_id;
    let answering = question.answering_team();

    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.clear_team_question_for_room(room_id).await {
                warn!(room_id, error = %err, "failed to clear timed out question");
            }
            let update = RoomUpdate {
                current_team: Some(answering),
                ..RoomUpdate::default()
            };
            if let Err(err) = store.update_room(room_id, update).await {
                warn!(room_id, error = %err, "failed to hand over the turn after timeout");
            }
        }
        Err(err) => warn!(room_id, error = %err, "store unavailable while expiring round"),
    }
    session.round.finish();

    info!(room_id, team = answering.as_str(), "answer time expired");
    broadcast(
        state.connections(),
        room_id,
        &ServerMessage::timed_out(room_id, answering, question.text),
    );
    broadcast(
        state.connections(),
        room_id,
        &ServerMessage::wrong_answer(answering, SYSTEM_USER_ID),
    );
    broadcast(state.connections(), room_id, &ServerMessage::game_update(room_id));
}

