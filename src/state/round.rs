//! Turn and question state machine of a single room.
//!
//! The machine is pure: it validates and records transitions while the caller
//! persists changes and broadcasts the resulting views. The countdown handle lives
//! inside [`RoundPhase::AwaitingAnswer`], so any transition out of that phase drops
//! and cancels it.

use std::mem;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{Side, TeamQuestionEntity, UserId},
    state::countdown::TimerTask,
};

/// Question written by a team and waiting to be answered by its opponents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub text: String,
    pub answer: String,
    pub author_team: Side,
}

impl PendingQuestion {
    /// Team allowed to pick the answerer and answer.
    pub fn answering_team(&self) -> Side {
        self.author_team.opponent()
    }
}

impl From<TeamQuestionEntity> for PendingQuestion {
    fn from(value: TeamQuestionEntity) -> Self {
        Self {
            text: value.text,
            answer: value.answer,
            author_team: value.author_team,
        }
    }
}

/// Question whose answerer has been chosen and whose countdown is running.
#[derive(Debug)]
pub struct ActiveAnswer {
    pub question: PendingQuestion,
    pub selected_player_id: UserId,
    pub time_left: u32,
    /// Identifies this countdown so ticks from a cancelled one are ignored.
    pub round_id: Uuid,
    timer: TimerTask,
}

/// Phases of a round.
#[derive(Debug, Default)]
pub enum RoundPhase {
    /// No question in play.
    #[default]
    Idle,
    /// A question was submitted; the opposing team must pick who answers.
    AwaitingSelection(PendingQuestion),
    /// The selected player is answering against the clock.
    AwaitingAnswer(ActiveAnswer),
}

/// Data-free discriminant of [`RoundPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    AwaitingSelection,
    AwaitingAnswer,
}

/// Rejections raised when an event does not fit the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("A question is already in play.")]
    QuestionInPlay,
    #[error("Only the opposing team can select a player to answer.")]
    WrongSelector,
    #[error("A player has already been selected to answer.")]
    AlreadySelected,
    #[error("It's not your team's turn to answer!")]
    NotYourTurn,
    #[error("There is no question in play.")]
    NoPendingQuestion,
}

impl TurnError {
    /// Missing-question errors are logged and dropped instead of reported to the sender.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TurnError::NoPendingQuestion)
    }
}

/// Outcome of judging an answer against the pending question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub correct: bool,
    pub answering_team: Side,
    pub question: String,
    pub answer: String,
}

/// Result of a countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The tick belongs to a countdown that is no longer current.
    Stale,
    Remaining(u32),
    /// The clock reached zero; the caller must end the round.
    Expired,
}

/// State of the pending question as shown to clients. The answer is never part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub question: String,
    pub author_team: Side,
    pub can_answer: bool,
    pub selected_player_id: Option<UserId>,
    pub time_left: Option<u32>,
}

/// Per-room round state.
#[derive(Debug, Default)]
pub struct Round {
    phase: RoundPhase,
}

impl Round {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> PhaseKind {
        match &self.phase {
            RoundPhase::Idle => PhaseKind::Idle,
            RoundPhase::AwaitingSelection(_) => PhaseKind::AwaitingSelection,
            RoundPhase::AwaitingAnswer(_) => PhaseKind::AwaitingAnswer,
        }
    }

    pub fn pending(&self) -> Option<&PendingQuestion> {
        match &self.phase {
            RoundPhase::Idle => None,
            RoundPhase::AwaitingSelection(question) => Some(question),
            RoundPhase::AwaitingAnswer(active) => Some(&active.question),
        }
    }

    /// Identifier of the running countdown, if any.
    pub fn round_id(&self) -> Option<Uuid> {
        match &self.phase {
            RoundPhase::AwaitingAnswer(active) => Some(active.round_id),
            _ => None,
        }
    }

    pub fn view(&self) -> Option<QuestionView> {
        match &self.phase {
            RoundPhase::Idle => None,
            RoundPhase::AwaitingSelection(question) => Some(QuestionView {
                question: question.text.clone(),
                author_team: question.author_team,
                can_answer: false,
                selected_player_id: None,
                time_left: None,
            }),
            RoundPhase::AwaitingAnswer(active) => Some(QuestionView {
                question: active.question.text.clone(),
                author_team: active.question.author_team,
                can_answer: true,
                selected_player_id: Some(active.selected_player_id),
                time_left: Some(active.time_left),
            }),
        }
    }

    /// Check that `asker` may submit a question now.
    ///
    /// The authoring team may replace its own pending question; the opposing team may not.
    pub fn ensure_can_submit(&self, asker: Side) -> Result<(), TurnError> {
        match self.pending() {
            None => Ok(()),
            Some(pending) if pending.author_team == asker => Ok(()),
            Some(_) => Err(TurnError::QuestionInPlay),
        }
    }

    /// Install a new pending question, returning the one it replaced.
    pub fn submit(&mut self, question: PendingQuestion) -> Option<PendingQuestion> {
        match mem::replace(&mut self.phase, RoundPhase::AwaitingSelection(question)) {
            RoundPhase::Idle => None,
            RoundPhase::AwaitingSelection(previous) => Some(previous),
            RoundPhase::AwaitingAnswer(active) => Some(active.question),
        }
    }

    /// Check that `selector` may pick the answerer of the pending question.
    pub fn ensure_can_select(&self, selector: Side) -> Result<&PendingQuestion, TurnError> {
        match &self.phase {
            RoundPhase::Idle => Err(TurnError::NoPendingQuestion),
            RoundPhase::AwaitingSelection(question) if question.answering_team() == selector => {
                Ok(question)
            }
            RoundPhase::AwaitingAnswer(active) if active.question.answering_team() == selector => {
                Err(TurnError::AlreadySelected)
            }
            _ => Err(TurnError::WrongSelector),
        }
    }

    /// Move the pending question to the answering phase under a fresh countdown.
    pub fn begin_answer(
        &mut self,
        selected_player_id: UserId,
        time_left: u32,
        round_id: Uuid,
        timer: TimerTask,
    ) -> Result<&ActiveAnswer, TurnError> {
        let question = match mem::take(&mut self.phase) {
            RoundPhase::AwaitingSelection(question) => question,
            other => {
                self.phase = other;
                return Err(TurnError::NoPendingQuestion);
            }
        };

        self.phase = RoundPhase::AwaitingAnswer(ActiveAnswer {
            question,
            selected_player_id,
            time_left,
            round_id,
            timer,
        });
        match &self.phase {
            RoundPhase::AwaitingAnswer(active) => Ok(active),
            _ => Err(TurnError::NoPendingQuestion),
        }
    }

    /// Judge `given` for `answerer` without changing state.
    pub fn judge(&self, answerer: Side, given: &str) -> Result<Verdict, TurnError> {
        match &self.phase {
            RoundPhase::Idle => Err(TurnError::NoPendingQuestion),
            RoundPhase::AwaitingAnswer(active) if active.question.answering_team() == answerer => {
                Ok(Verdict {
                    correct: answers_match(&active.question.answer, given),
                    answering_team: answerer,
                    question: active.question.text.clone(),
                    answer: active.question.answer.clone(),
                })
            }
            _ => Err(TurnError::NotYourTurn),
        }
    }

    /// Advance the countdown identified by `round_id` by one step.
    pub fn tick(&mut self, round_id: Uuid) -> Tick {
        match &mut self.phase {
            RoundPhase::AwaitingAnswer(active) if active.round_id == round_id => {
                active.time_left = active.time_left.saturating_sub(1);
                if active.time_left == 0 {
                    Tick::Expired
                } else {
                    Tick::Remaining(active.time_left)
                }
            }
            _ => Tick::Stale,
        }
    }

    /// Detach the running countdown so it can finish the round it belongs to.
    pub fn release_timer(&mut self, round_id: Uuid) -> bool {
        match &mut self.phase {
            RoundPhase::AwaitingAnswer(active) if active.round_id == round_id => {
                active.timer.detach();
                true
            }
            _ => false,
        }
    }

    /// End the round, cancelling any countdown, and return the question that was in play.
    pub fn finish(&mut self) -> Option<PendingQuestion> {
        match mem::take(&mut self.phase) {
            RoundPhase::Idle => None,
            RoundPhase::AwaitingSelection(question) => Some(question),
            RoundPhase::AwaitingAnswer(active) => Some(active.question),
        }
    }

    /// Reinstate a persisted question. Only applies while idle; the answerer must be picked again.
    pub fn restore(&mut self, question: PendingQuestion) -> bool {
        if matches!(self.phase, RoundPhase::Idle) {
            self.phase = RoundPhase::AwaitingSelection(question);
            true
        } else {
            false
        }
    }
}

/// Canonical form used to compare answers: trimmed and lowercased.
pub fn normalize_answer(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn answers_match(expected: &str, given: &str) -> bool {
    normalize_answer(expected) == normalize_answer(given)
}
