use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{
        AnswerEntity, JoinRequestEntity, LeaderEntity, MatchEntity, ParticipantEntity,
        QuestionPrompt, QuestionRecordEntity,
    },
    state::{
        match_state::Difficulty,
        state_machine::{EndReason, MatchStatus},
    },
};

pub const MATCH_COLLECTION_NAME: &str = "matches";
pub const QUESTION_COLLECTION_NAME: &str = "questions";
pub const LEADER_COLLECTION_NAME: &str = "leaders";

/// Identifiers are stored as their hyphenated string form.
pub fn parse_id(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Malformed {
        collection,
        id: raw.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_match_ref(raw: &str) -> MongoResult<Uuid> {
    parse_id(MATCH_COLLECTION_NAME, raw)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: MatchStatus,
    pub owner: String,
    pub participants: Vec<MongoParticipantDocument>,
    #[serde(default)]
    pub pending_join_requests: Vec<MongoJoinRequestDocument>,
    pub started_at: Option<DateTime>,
    pub ends_at: Option<DateTime>,
    pub current_question_id: Option<String>,
    pub current_question_deadline: Option<DateTime>,
    #[serde(default)]
    pub served_question_ids: Vec<String>,
    #[serde(default)]
    pub question_records: Vec<MongoQuestionRecordDocument>,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub end_reason: Option<EndReason>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    pub user: String,
    pub score: u32,
    pub wrong_count: u32,
    pub disqualified_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoJoinRequestDocument {
    pub user: String,
    pub requested_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionRecordDocument {
    pub question_id: String,
    pub answers: Vec<MongoAnswerDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    pub user: String,
    pub selected_index: u32,
    pub is_correct: bool,
    pub answered_at: DateTime,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id.to_string(),
            status: value.status,
            owner: value.owner.to_string(),
            participants: value
                .participants
                .into_iter()
                .map(|participant| MongoParticipantDocument {
                    user: participant.user.to_string(),
                    score: participant.score,
                    wrong_count: participant.wrong_count,
                    disqualified_at: participant.disqualified_at.map(DateTime::from_system_time),
                })
                .collect(),
            pending_join_requests: value
                .pending_join_requests
                .into_iter()
                .map(|request| MongoJoinRequestDocument {
                    user: request.user.to_string(),
                    requested_at: DateTime::from_system_time(request.requested_at),
                })
                .collect(),
            started_at: value.started_at.map(DateTime::from_system_time),
            ends_at: value.ends_at.map(DateTime::from_system_time),
            current_question_id: value.current_question_id.map(|id| id.to_string()),
            current_question_deadline: value
                .current_question_deadline
                .map(DateTime::from_system_time),
            served_question_ids: value
                .served_question_ids
                .iter()
                .map(Uuid::to_string)
                .collect(),
            question_records: value
                .question_records
                .into_iter()
                .map(|record| MongoQuestionRecordDocument {
                    question_id: record.question_id.to_string(),
                    answers: record
                        .answers
                        .into_iter()
                        .map(|answer| MongoAnswerDocument {
                            user: answer.user.to_string(),
                            selected_index: answer.selected_index,
                            is_correct: answer.is_correct,
                            answered_at: DateTime::from_system_time(answer.answered_at),
                        })
                        .collect(),
                })
                .collect(),
            difficulty: value.difficulty,
            tags: value.tags,
            end_reason: value.end_reason,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            version: i64::try_from(value.version).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<MongoMatchDocument> for MatchEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMatchDocument) -> MongoResult<Self> {
        let participants = value
            .participants
            .into_iter()
            .map(|participant| {
                Ok(ParticipantEntity {
                    user: parse_match_ref(&participant.user)?,
                    score: participant.score,
                    wrong_count: participant.wrong_count,
                    disqualified_at: participant.disqualified_at.map(DateTime::to_system_time),
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        let pending_join_requests = value
            .pending_join_requests
            .into_iter()
            .map(|request| {
                Ok(JoinRequestEntity {
                    user: parse_match_ref(&request.user)?,
                    requested_at: request.requested_at.to_system_time(),
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        let question_records = value
            .question_records
            .into_iter()
            .map(|record| {
                let answers = record
                    .answers
                    .into_iter()
                    .map(|answer| {
                        Ok(AnswerEntity {
                            user: parse_match_ref(&answer.user)?,
                            selected_index: answer.selected_index,
                            is_correct: answer.is_correct,
                            answered_at: answer.answered_at.to_system_time(),
                        })
                    })
                    .collect::<MongoResult<Vec<_>>>()?;
                Ok(QuestionRecordEntity {
                    question_id: parse_match_ref(&record.question_id)?,
                    answers,
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        Ok(Self {
            id: parse_match_ref(&value.id)?,
            status: value.status,
            owner: parse_match_ref(&value.owner)?,
            participants,
            pending_join_requests,
            started_at: value.started_at.map(DateTime::to_system_time),
            ends_at: value.ends_at.map(DateTime::to_system_time),
            current_question_id: value
                .current_question_id
                .as_deref()
                .map(parse_match_ref)
                .transpose()?,
            current_question_deadline: value
                .current_question_deadline
                .map(DateTime::to_system_time),
            served_question_ids: value
                .served_question_ids
                .iter()
                .map(|id| parse_match_ref(id))
                .collect::<MongoResult<Vec<_>>>()?,
            question_records,
            difficulty: value.difficulty,
            tags: value.tags,
            end_reason: value.end_reason,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            version: u64::try_from(value.version).unwrap_or_default(),
        })
    }
}

/// Question projection returned by the sampling pipeline; the key is projected away.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoQuestionPromptDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

impl TryFrom<MongoQuestionPromptDocument> for QuestionPrompt {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuestionPromptDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(QUESTION_COLLECTION_NAME, &value.id)?,
            prompt: value.prompt,
            options: value.options,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoAnswerKeyDocument {
    pub correct_index: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoLeaderDocument {
    #[serde(rename = "_id")]
    pub user: String,
    #[serde(default)]
    pub matches: i64,
    #[serde(default)]
    pub wins: i64,
    #[serde(default)]
    pub losses: i64,
    #[serde(default)]
    pub draws: i64,
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub best_score: i64,
}

impl TryFrom<MongoLeaderDocument> for LeaderEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoLeaderDocument) -> MongoResult<Self> {
        let counter = |raw: i64| u64::try_from(raw).unwrap_or_default();
        Ok(Self {
            user: parse_id(LEADER_COLLECTION_NAME, &value.user)?,
            matches: counter(value.matches),
            wins: counter(value.wins),
            losses: counter(value.losses),
            draws: counter(value.draws),
            total_score: counter(value.total_score),
            best_score: u32::try_from(value.best_score).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::state::match_state::{Match, QuestionFilters};

    #[test]
    fn match_document_round_trip_keeps_ids() {
        // bson DateTime keeps milliseconds only.
        let now = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let mut game = Match::new(Uuid::new_v4(), QuestionFilters::default(), now);
        game.participants.add(Uuid::new_v4()).unwrap();
        game.activate(now, Duration::from_secs(600)).unwrap();
        game.serve_question(Uuid::new_v4(), now + Duration::from_secs(30))
            .unwrap();
        game.version = 3;

        let entity: MatchEntity = game.into();
        let document = MongoMatchDocument::from(entity.clone());
        assert_eq!(document.id, entity.id.to_string());
        assert_eq!(document.version, 3);

        let back = MatchEntity::try_from(document).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn malformed_ids_are_reported() {
        let now = SystemTime::now();
        let entity: MatchEntity = Match::new(Uuid::new_v4(), QuestionFilters::default(), now).into();
        let mut document = MongoMatchDocument::from(entity);
        document.owner = "not-a-uuid".into();
        assert!(matches!(
            MatchEntity::try_from(document),
            Err(MongoDaoError::Malformed { .. })
        ));
    }
}
