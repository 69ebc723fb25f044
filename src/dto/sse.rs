use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::matches::ParticipantSummary,
    state::state_machine::{EndReason, MatchStatus},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Raw event with a pre-rendered data field.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`lobby`, `match` or `user`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Lobby event emitted when a match is opened.
pub struct MatchCreatedEvent {
    pub match_id: Uuid,
    pub owner: Uuid,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Lobby event emitted when a match changes status.
pub struct MatchUpdatedEvent {
    pub match_id: Uuid,
    pub status: MatchStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Sent to the owner when someone asks to join.
pub struct JoinRequestedEvent {
    pub match_id: Uuid,
    pub user: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Sent to the challenger once the owner accepted them.
pub struct JoinAcceptedEvent {
    pub match_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// A new question is open. Carries option texts only.
pub struct QuestionDispatchedEvent {
    pub question_id: Uuid,
    pub prompt: String,
    pub options: Vec<String>,
    /// RFC3339 deadline for answers.
    pub deadline: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Scores after an answer or a timeout.
pub struct ScoreUpdatedEvent {
    pub participants: Vec<ParticipantSummary>,
    /// Participant whose answer triggered the update, absent after a timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_by: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Both participants answered: the key is disclosed.
pub struct QuestionRevealedEvent {
    pub question_id: Uuid,
    pub correct_index: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// The question deadline passed with answers missing.
pub struct QuestionTimedOutEvent {
    pub question_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Final outcome of a match.
pub struct MatchEndedEvent {
    pub reason: EndReason,
    /// `null` on a draw.
    pub winner: Option<Uuid>,
    pub participants: Vec<ParticipantSummary>,
}
