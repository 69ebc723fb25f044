use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    match_state::Difficulty,
    state_machine::{EndReason, MatchStatus},
};

/// Aggregate match entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// Current lifecycle status.
    pub status: MatchStatus,
    /// User who created the match.
    pub owner: Uuid,
    /// Owner first, then the accepted challenger if any.
    pub participants: Vec<ParticipantEntity>,
    /// Join requests not yet accepted.
    pub pending_join_requests: Vec<JoinRequestEntity>,
    /// Set when the match becomes active.
    pub started_at: Option<SystemTime>,
    /// Match-level deadline, fixed when the match becomes active.
    pub ends_at: Option<SystemTime>,
    /// Question currently open for answers.
    pub current_question_id: Option<Uuid>,
    /// Deadline of the current question.
    pub current_question_deadline: Option<SystemTime>,
    /// Every question served so far, in serve order.
    pub served_question_ids: Vec<Uuid>,
    /// One record per served question, in serve order.
    pub question_records: Vec<QuestionRecordEntity>,
    /// Optional difficulty filter used when picking questions.
    pub difficulty: Option<Difficulty>,
    /// Optional tag filter (match-any) used when picking questions.
    pub tags: Vec<String>,
    /// Why the match ended, once completed.
    pub end_reason: Option<EndReason>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the entity was updated.
    pub updated_at: SystemTime,
    /// Incremented on every committed mutation.
    pub version: u64,
}

/// Persisted participant state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    pub user: Uuid,
    pub score: u32,
    pub wrong_count: u32,
    pub disqualified_at: Option<SystemTime>,
}

/// Persisted join request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequestEntity {
    pub user: Uuid,
    pub requested_at: SystemTime,
}

/// Persisted answers collected for a served question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionRecordEntity {
    pub question_id: Uuid,
    pub answers: Vec<AnswerEntity>,
}

/// Persisted answer of one participant to one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    pub user: Uuid,
    pub selected_index: u32,
    pub is_correct: bool,
    pub answered_at: SystemTime,
}

/// Lobby listing projection of a waiting match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchListItemEntity {
    pub id: Uuid,
    pub owner: Uuid,
    pub created_at: SystemTime,
    pub difficulty: Option<Difficulty>,
    pub tags: Vec<String>,
}

impl From<MatchEntity> for MatchListItemEntity {
    fn from(entity: MatchEntity) -> Self {
        Self {
            id: entity.id,
            owner: entity.owner,
            created_at: entity.created_at,
            difficulty: entity.difficulty,
            tags: entity.tags,
        }
    }
}

/// Multiple-choice question as held by the question source, answer key included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    pub id: Uuid,
    pub prompt: String,
    /// Between 2 and 6 option texts.
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    pub correct_index: u32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Question projection safe to show to players: the answer key never appears here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionPrompt {
    pub id: Uuid,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<&QuestionEntity> for QuestionPrompt {
    fn from(question: &QuestionEntity) -> Self {
        Self {
            id: question.id,
            prompt: question.prompt.clone(),
            options: question.options.clone(),
        }
    }
}

/// Outcome of a completed match from one participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Win,
    Loss,
    Draw,
}

/// Aggregated leaderboard row for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderEntity {
    pub user: Uuid,
    pub matches: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub total_score: u64,
    pub best_score: u32,
}

impl LeaderEntity {
    /// Fold one match result into the aggregate.
    pub fn record(&mut self, score: u32, result: ResultKind) {
        self.matches += 1;
        match result {
            ResultKind::Win => self.wins += 1,
            ResultKind::Loss => self.losses += 1,
            ResultKind::Draw => self.draws += 1,
        }
        self.total_score += u64::from(score);
        self.best_score = self.best_score.max(score);
    }
}
