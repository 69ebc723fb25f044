use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::MatchListItemEntity,
    dto::{format_system_time, validation::validate_tags},
    services::results::MatchOutcome,
    state::{
        match_state::{Answer, Difficulty, Match, Participant, QuestionRecord},
        state_machine::{EndReason, MatchStatus},
    },
};

/// Payload used to open a new match.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(default)]
pub struct CreateMatchRequest {
    /// Exact difficulty of the questions to serve; the server default applies when omitted.
    pub difficulty: Option<Difficulty>,
    /// Serve only questions carrying at least one of these tags.
    #[validate(length(max = 10), custom(function = "validate_tags"))]
    pub tags: Vec<String>,
}

/// Payload sent by the owner to accept a pending join request.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AcceptJoinRequest {
    pub user_id: Uuid,
}

/// Payload carrying a participant's answer to the current question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    /// Index of the chosen option.
    #[validate(range(max = 5))]
    pub selected_index: u32,
}

/// Result of a recorded answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResponse {
    pub accepted: bool,
    pub is_correct: bool,
}

/// Bare acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct AckResponse {
    pub ok: bool,
}

impl AckResponse {
    /// Positive acknowledgement.
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Public view of a participant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub user: Uuid,
    pub score: u32,
    pub wrong_count: u32,
    /// RFC3339 timestamp of the disqualification, if any.
    pub disqualified_at: Option<String>,
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self {
            user: participant.user,
            score: participant.score,
            wrong_count: participant.wrong_count,
            disqualified_at: participant.disqualified_at.map(format_system_time),
        }
    }
}

/// Pending join request as shown to the owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinRequestSummary {
    pub user: Uuid,
    pub requested_at: String,
}

/// Sanitized match snapshot. Answer keys never appear here.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchSnapshot {
    pub id: Uuid,
    pub status: MatchStatus,
    pub owner: Uuid,
    pub participants: Vec<ParticipantSummary>,
    pub pending_join_requests: Vec<JoinRequestSummary>,
    pub started_at: Option<String>,
    pub ends_at: Option<String>,
    pub current_question_id: Option<Uuid>,
    pub current_question_deadline: Option<String>,
    /// Number of questions served so far.
    pub served_questions: usize,
    pub difficulty: Option<Difficulty>,
    pub tags: Vec<String>,
    pub end_reason: Option<EndReason>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Match> for MatchSnapshot {
    fn from(game: &Match) -> Self {
        Self {
            id: game.id,
            status: game.status,
            owner: game.owner,
            participants: game.participants.iter().map(Into::into).collect(),
            pending_join_requests: game
                .pending_join_requests
                .iter()
                .map(|request| JoinRequestSummary {
                    user: request.user,
                    requested_at: format_system_time(request.requested_at),
                })
                .collect(),
            started_at: game.started_at.map(format_system_time),
            ends_at: game.ends_at.map(format_system_time),
            current_question_id: game.current_question.map(|current| current.id),
            current_question_deadline: game
                .current_question
                .map(|current| format_system_time(current.deadline)),
            served_questions: game.served_question_ids.len(),
            difficulty: game.filters.difficulty,
            tags: game.filters.tags.iter().cloned().collect(),
            end_reason: game.end_reason,
            created_at: format_system_time(game.created_at),
            updated_at: format_system_time(game.updated_at),
        }
    }
}

/// Lobby entry for a match waiting for a challenger.
#[derive(Debug, Serialize, ToSchema)]
pub struct WaitingMatchSummary {
    pub id: Uuid,
    pub owner: Uuid,
    pub created_at: String,
    pub difficulty: Option<Difficulty>,
    pub tags: Vec<String>,
}

impl From<MatchListItemEntity> for WaitingMatchSummary {
    fn from(item: MatchListItemEntity) -> Self {
        Self {
            id: item.id,
            owner: item.owner,
            created_at: format_system_time(item.created_at),
            difficulty: item.difficulty,
            tags: item.tags,
        }
    }
}

/// One recorded answer in the results view.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerSummary {
    pub user: Uuid,
    pub selected_index: u32,
    pub is_correct: bool,
    pub answered_at: String,
}

impl From<&Answer> for AnswerSummary {
    fn from(answer: &Answer) -> Self {
        Self {
            user: answer.user,
            selected_index: answer.selected_index,
            is_correct: answer.is_correct,
            answered_at: format_system_time(answer.answered_at),
        }
    }
}

/// Answers given to one served question.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionRecordSummary {
    pub question_id: Uuid,
    pub answers: Vec<AnswerSummary>,
}

impl From<&QuestionRecord> for QuestionRecordSummary {
    fn from(record: &QuestionRecord) -> Self {
        Self {
            question_id: record.question_id,
            answers: record.answers.iter().map(Into::into).collect(),
        }
    }
}

/// Final standings of a completed match.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResultsResponse {
    pub match_id: Uuid,
    pub reason: Option<EndReason>,
    /// `null` on a draw.
    pub winner: Option<Uuid>,
    pub participants: Vec<ParticipantSummary>,
    pub questions: Vec<QuestionRecordSummary>,
}

impl MatchResultsResponse {
    /// Assemble the results view from a completed match and its computed outcome.
    pub fn new(game: &Match, outcome: &MatchOutcome) -> Self {
        Self {
            match_id: game.id,
            reason: game.end_reason,
            winner: outcome.winner,
            participants: game.participants.iter().map(Into::into).collect(),
            questions: game.question_records.iter().map(Into::into).collect(),
        }
    }
}
