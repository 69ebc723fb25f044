use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    dto::{
        format_system_time,
        matches::{MatchSnapshot, ParticipantSummary},
        sse::{
            JoinAcceptedEvent, JoinRequestedEvent, MatchCreatedEvent, MatchEndedEvent,
            MatchUpdatedEvent, QuestionDispatchedEvent, QuestionRevealedEvent,
            QuestionTimedOutEvent, ScoreUpdatedEvent, ServerEvent,
        },
    },
    dao::models::QuestionPrompt,
    services::results::MatchOutcome,
    state::{
        SharedState,
        match_state::{Match, MatchId, QuestionId, UserId},
        state_machine::EndReason,
    },
};

pub const EVENT_MATCH_CREATED: &str = "match.created";
pub const EVENT_MATCH_UPDATED: &str = "match.updated";
pub const EVENT_JOIN_REQUESTED: &str = "join.requested";
pub const EVENT_JOIN_ACCEPTED: &str = "join.accepted";
pub const EVENT_MATCH_STARTED: &str = "match.started";
pub const EVENT_QUESTION_DISPATCHED: &str = "question.dispatched";
pub const EVENT_SCORE_UPDATED: &str = "score.updated";
pub const EVENT_QUESTION_REVEALED: &str = "question.revealed";
pub const EVENT_QUESTION_TIMED_OUT: &str = "question.timed_out";
pub const EVENT_MATCH_ENDED: &str = "match.ended";

/// Audience of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelScope {
    /// Everybody browsing open matches.
    Lobby,
    /// Both participants of one match.
    Match(MatchId),
    /// A single user.
    User(UserId),
}

impl fmt::Display for ChannelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelScope::Lobby => f.write_str("lobby"),
            ChannelScope::Match(id) => write!(f, "match-{id}"),
            ChannelScope::User(id) => write!(f, "user-{id}"),
        }
    }
}

/// Failure reported by a notification transport.
#[derive(Debug, Error)]
#[error("failed to publish on `{scope}`: {message}")]
pub struct NotifyError {
    pub scope: ChannelScope,
    pub message: String,
}

/// Fire-and-forget publisher of lifecycle events.
pub trait NotificationSink: Send + Sync {
    /// Deliver `event` to every subscriber of `scope`.
    fn publish(&self, scope: ChannelScope, event: ServerEvent) -> Result<(), NotifyError>;

    /// Release resources held for a match that will not emit anything else.
    fn close_match(&self, _match_id: MatchId) {}
}

/// Announce a freshly opened match to the lobby.
pub fn announce_created(state: &SharedState, game: &Match) {
    let payload = MatchCreatedEvent {
        match_id: game.id,
        owner: game.owner,
        created_at: format_system_time(game.created_at),
    };
    send_event(state, ChannelScope::Lobby, EVENT_MATCH_CREATED, &payload);
}

/// Tell the owner someone asked to join.
pub fn announce_join_requested(state: &SharedState, game: &Match, user: UserId) {
    let payload = JoinRequestedEvent {
        match_id: game.id,
        user,
    };
    send_event(
        state,
        ChannelScope::User(game.owner),
        EVENT_JOIN_REQUESTED,
        &payload,
    );
}

/// Announce an accepted challenger and the match start.
pub fn announce_started(state: &SharedState, game: &Match, challenger: UserId) {
    send_event(
        state,
        ChannelScope::User(challenger),
        EVENT_JOIN_ACCEPTED,
        &JoinAcceptedEvent { match_id: game.id },
    );
    announce_status(state, game);
    send_event(
        state,
        ChannelScope::Match(game.id),
        EVENT_MATCH_STARTED,
        &MatchSnapshot::from(game),
    );
}

/// Push the current status of a match to the lobby.
pub fn announce_status(state: &SharedState, game: &Match) {
    let payload = MatchUpdatedEvent {
        match_id: game.id,
        status: game.status,
    };
    send_event(state, ChannelScope::Lobby, EVENT_MATCH_UPDATED, &payload);
}

/// Open a question to the participants.
pub fn announce_question(
    state: &SharedState,
    match_id: MatchId,
    question: &QuestionPrompt,
    deadline: std::time::SystemTime,
) {
    let payload = QuestionDispatchedEvent {
        question_id: question.id,
        prompt: question.prompt.clone(),
        options: question.options.clone(),
        deadline: format_system_time(deadline),
    };
    send_event(
        state,
        ChannelScope::Match(match_id),
        EVENT_QUESTION_DISPATCHED,
        &payload,
    );
}

/// Broadcast participant scores.
pub fn announce_scores(state: &SharedState, game: &Match, answered_by: Option<UserId>) {
    let payload = ScoreUpdatedEvent {
        participants: game.participants.iter().map(Into::into).collect(),
        answered_by,
    };
    send_event(
        state,
        ChannelScope::Match(game.id),
        EVENT_SCORE_UPDATED,
        &payload,
    );
}

/// Disclose the answer key once everybody answered.
pub fn announce_reveal(
    state: &SharedState,
    match_id: MatchId,
    question_id: QuestionId,
    correct_index: u32,
) {
    let payload = QuestionRevealedEvent {
        question_id,
        correct_index,
    };
    send_event(
        state,
        ChannelScope::Match(match_id),
        EVENT_QUESTION_REVEALED,
        &payload,
    );
}

/// Tell participants the deadline passed with answers missing.
pub fn announce_timed_out(state: &SharedState, match_id: MatchId, question_id: QuestionId) {
    send_event(
        state,
        ChannelScope::Match(match_id),
        EVENT_QUESTION_TIMED_OUT,
        &QuestionTimedOutEvent { question_id },
    );
}

/// Publish the final outcome then release the match channel.
pub fn announce_ended(
    state: &SharedState,
    game: &Match,
    reason: EndReason,
    outcome: &MatchOutcome,
) {
    let participants: Vec<ParticipantSummary> = game.participants.iter().map(Into::into).collect();
    let payload = MatchEndedEvent {
        reason,
        winner: outcome.winner,
        participants,
    };
    send_event(
        state,
        ChannelScope::Match(game.id),
        EVENT_MATCH_ENDED,
        &payload,
    );
    announce_status(state, game);
    state.notifier().close_match(game.id);
}

fn send_event(state: &SharedState, scope: ChannelScope, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(server_event) => {
            if let Err(err) = state.notifier().publish(scope, server_event) {
                warn!(event, %scope, error = %err, "failed to publish notification");
            }
        }
        Err(err) => warn!(event, %scope, error = %err, "failed to serialize notification payload"),
    }
}
