use std::{
    collections::BTreeSet,
    time::{Duration, SystemTime},
};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{
        AnswerEntity, JoinRequestEntity, MatchEntity, ParticipantEntity, QuestionRecordEntity,
    },
    state::state_machine::{self, EndReason, InvalidTransition, MatchEvent, MatchStatus},
};

/// Identifier of a user, issued by the external identity provider.
pub type UserId = Uuid;
/// Identifier of a match.
pub type MatchId = Uuid;
/// Identifier of a question in the question source.
pub type QuestionId = Uuid;

/// Number of players in a duel.
pub const MATCH_CAPACITY: usize = 2;

/// Question difficulty used as an exact-match filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Warm-up questions.
    Easy,
    /// Regular questions.
    Medium,
    /// Hard questions.
    Hard,
}

/// Filters applied when picking the next question of a match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionFilters {
    /// Exact difficulty to match, if any.
    pub difficulty: Option<Difficulty>,
    /// Questions carrying at least one of these tags qualify; empty means no tag filter.
    pub tags: BTreeSet<String>,
}

/// Structural violations of the match data model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchInvariantError {
    #[error("a match holds at most {MATCH_CAPACITY} participants")]
    RosterFull,
    #[error("user `{0}` is already a participant")]
    AlreadyParticipant(UserId),
    #[error("a match must hold 1 or {MATCH_CAPACITY} participants, got {0}")]
    Cardinality(usize),
    #[error("the first participant must be the owner")]
    OwnerNotFirst,
    #[error("question `{0}` was already served in this match")]
    QuestionAlreadyServed(QuestionId),
    #[error("served questions and question records diverge")]
    RecordMismatch,
    #[error("user `{user}` already answered question `{question_id}`")]
    DuplicateAnswer {
        user: UserId,
        question_id: QuestionId,
    },
    #[error("user `{0}` answered but is not a participant")]
    StrangerAnswer(UserId),
    #[error("no question is currently open")]
    NoCurrentQuestion,
    #[error("a current question is set while the match is {0:?}")]
    StrayCurrentQuestion(MatchStatus),
    #[error("an active match needs both its start and end times")]
    MissingSchedule,
}

/// Match-scoped player record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user: UserId,
    pub score: u32,
    pub wrong_count: u32,
    /// Set once, the first time `wrong_count` reaches the threshold; never cleared.
    pub disqualified_at: Option<SystemTime>,
}

impl Participant {
    /// Fresh participant with a clean sheet.
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            score: 0,
            wrong_count: 0,
            disqualified_at: None,
        }
    }

    pub fn is_disqualified(&self) -> bool {
        self.disqualified_at.is_some()
    }

    /// Count a wrong or missing answer. Returns `true` when this miss disqualified the player.
    pub fn record_miss(&mut self, threshold: u32, now: SystemTime) -> bool {
        self.wrong_count += 1;
        if self.disqualified_at.is_none() && self.wrong_count >= threshold {
            self.disqualified_at = Some(now);
            return true;
        }
        false
    }
}

/// Fixed-capacity roster: the owner always holds the first slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    owner: Participant,
    challenger: Option<Participant>,
}

impl Roster {
    /// Roster holding only the owner.
    pub fn new(owner: UserId) -> Self {
        Self {
            owner: Participant::new(owner),
            challenger: None,
        }
    }

    pub fn len(&self) -> usize {
        1 + usize::from(self.challenger.is_some())
    }

    pub fn is_full(&self) -> bool {
        self.len() == MATCH_CAPACITY
    }

    /// Participants in slot order (owner first).
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        std::iter::once(&self.owner).chain(self.challenger.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        std::iter::once(&mut self.owner).chain(self.challenger.iter_mut())
    }

    pub fn get(&self, user: UserId) -> Option<&Participant> {
        self.iter().find(|participant| participant.user == user)
    }

    pub fn get_mut(&mut self, user: UserId) -> Option<&mut Participant> {
        self.iter_mut().find(|participant| participant.user == user)
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.get(user).is_some()
    }

    /// Seat a challenger in the free slot.
    pub fn add(&mut self, user: UserId) -> Result<(), MatchInvariantError> {
        if self.contains(user) {
            return Err(MatchInvariantError::AlreadyParticipant(user));
        }
        if self.challenger.is_some() {
            return Err(MatchInvariantError::RosterFull);
        }
        self.challenger = Some(Participant::new(user));
        Ok(())
    }

    pub fn any_disqualified(&self) -> bool {
        self.iter().any(Participant::is_disqualified)
    }
}

/// A pending request from a user to join a waiting match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub user: UserId,
    pub requested_at: SystemTime,
}

/// An answer recorded for a served question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub user: UserId,
    pub selected_index: u32,
    pub is_correct: bool,
    pub answered_at: SystemTime,
}

/// Answers collected for one served question, at most one per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    pub question_id: QuestionId,
    pub answers: Vec<Answer>,
}

impl QuestionRecord {
    fn new(question_id: QuestionId) -> Self {
        Self {
            question_id,
            answers: Vec::with_capacity(MATCH_CAPACITY),
        }
    }

    pub fn has_answered(&self, user: UserId) -> bool {
        self.answers.iter().any(|answer| answer.user == user)
    }
}

/// The question currently open for answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentQuestion {
    pub id: QuestionId,
    pub deadline: SystemTime,
}

/// One timed two-player quiz duel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub status: MatchStatus,
    pub owner: UserId,
    pub participants: Roster,
    pub pending_join_requests: Vec<JoinRequest>,
    pub started_at: Option<SystemTime>,
    pub ends_at: Option<SystemTime>,
    pub current_question: Option<CurrentQuestion>,
    pub served_question_ids: IndexSet<QuestionId>,
    pub question_records: Vec<QuestionRecord>,
    pub filters: QuestionFilters,
    pub end_reason: Option<EndReason>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub version: u64,
}

impl Match {
    /// Build a waiting match whose only participant is its owner.
    pub fn new(owner: UserId, filters: QuestionFilters, now: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: MatchStatus::Waiting,
            owner,
            participants: Roster::new(owner),
            pending_join_requests: Vec::new(),
            started_at: None,
            ends_at: None,
            current_question: None,
            served_question_ids: IndexSet::new(),
            question_records: Vec::new(),
            filters,
            end_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn touch(&mut self, now: SystemTime) {
        self.updated_at = now;
    }

    /// Apply a lifecycle event through the transition table.
    pub fn apply(&mut self, event: MatchEvent) -> Result<MatchStatus, InvalidTransition> {
        self.status = state_machine::transition(self.status, event)?;
        Ok(self.status)
    }

    pub fn has_pending_request(&self, user: UserId) -> bool {
        self.pending_join_requests
            .iter()
            .any(|request| request.user == user)
    }

    /// Queue a join request. Returns `false` when the user already asked or already plays.
    pub fn add_join_request(&mut self, user: UserId, now: SystemTime) -> bool {
        if self.has_pending_request(user) || self.participants.contains(user) {
            return false;
        }
        self.pending_join_requests.push(JoinRequest {
            user,
            requested_at: now,
        });
        true
    }

    /// Move to active with a fixed match-level deadline.
    pub fn activate(
        &mut self,
        now: SystemTime,
        duration: Duration,
    ) -> Result<(), InvalidTransition> {
        self.apply(MatchEvent::Accept)?;
        self.pending_join_requests.clear();
        self.started_at = Some(now);
        self.ends_at = Some(now + duration);
        Ok(())
    }

    /// Close the match for good, dropping the open question.
    pub fn finish(&mut self, reason: EndReason) -> Result<(), InvalidTransition> {
        self.apply(MatchEvent::End(reason))?;
        self.current_question = None;
        self.end_reason = Some(reason);
        Ok(())
    }

    pub fn match_expired(&self, now: SystemTime) -> bool {
        self.ends_at.is_some_and(|ends_at| now >= ends_at)
    }

    pub fn question_expired(&self, now: SystemTime) -> bool {
        self.current_question
            .is_some_and(|current| now > current.deadline)
    }

    /// Open `question_id` for answers until `deadline`.
    pub fn serve_question(
        &mut self,
        question_id: QuestionId,
        deadline: SystemTime,
    ) -> Result<(), MatchInvariantError> {
        if !self.served_question_ids.insert(question_id) {
            return Err(MatchInvariantError::QuestionAlreadyServed(question_id));
        }
        self.question_records.push(QuestionRecord::new(question_id));
        self.current_question = Some(CurrentQuestion {
            id: question_id,
            deadline,
        });
        Ok(())
    }

    pub fn current_record(&self) -> Option<&QuestionRecord> {
        let current = self.current_question?;
        self.question_records
            .iter()
            .rev()
            .find(|record| record.question_id == current.id)
    }

    fn current_record_mut(&mut self) -> Option<&mut QuestionRecord> {
        let current = self.current_question?;
        self.question_records
            .iter_mut()
            .rev()
            .find(|record| record.question_id == current.id)
    }

    /// Append an answer to the current question.
    pub fn record_answer(&mut self, answer: Answer) -> Result<(), MatchInvariantError> {
        if !self.participants.contains(answer.user) {
            return Err(MatchInvariantError::StrangerAnswer(answer.user));
        }
        let record = self
            .current_record_mut()
            .ok_or(MatchInvariantError::NoCurrentQuestion)?;
        if record.has_answered(answer.user) {
            return Err(MatchInvariantError::DuplicateAnswer {
                user: answer.user,
                question_id: record.question_id,
            });
        }
        record.answers.push(answer);
        Ok(())
    }

    pub fn all_answered_current(&self) -> bool {
        self.current_record().is_some_and(|record| {
            self.participants
                .iter()
                .all(|participant| record.has_answered(participant.user))
        })
    }

    /// Validate the structural invariants of the data model.
    pub fn check_invariants(&self) -> Result<(), MatchInvariantError> {
        let roster_len = self.participants.len();
        let expected_len = match self.status {
            MatchStatus::Waiting => 1,
            MatchStatus::Active | MatchStatus::Completed => MATCH_CAPACITY,
            MatchStatus::Cancelled => roster_len,
        };
        if roster_len != expected_len {
            return Err(MatchInvariantError::Cardinality(roster_len));
        }
        if self.participants.owner.user != self.owner {
            return Err(MatchInvariantError::OwnerNotFirst);
        }

        if self.served_question_ids.len() != self.question_records.len()
            || self
                .served_question_ids
                .iter()
                .zip(&self.question_records)
                .any(|(served, record)| *served != record.question_id)
        {
            return Err(MatchInvariantError::RecordMismatch);
        }

        for record in &self.question_records {
            if record.answers.len() > roster_len {
                return Err(MatchInvariantError::RecordMismatch);
            }
            for (index, answer) in record.answers.iter().enumerate() {
                if !self.participants.contains(answer.user) {
                    return Err(MatchInvariantError::StrangerAnswer(answer.user));
                }
                if record.answers[..index]
                    .iter()
                    .any(|earlier| earlier.user == answer.user)
                {
                    return Err(MatchInvariantError::DuplicateAnswer {
                        user: answer.user,
                        question_id: record.question_id,
                    });
                }
            }
        }

        if let Some(current) = self.current_question {
            if self.status != MatchStatus::Active {
                return Err(MatchInvariantError::StrayCurrentQuestion(self.status));
            }
            if self.served_question_ids.last() != Some(&current.id) {
                return Err(MatchInvariantError::RecordMismatch);
            }
        }

        if self.status == MatchStatus::Active
            && (self.started_at.is_none() || self.ends_at.is_none())
        {
            return Err(MatchInvariantError::MissingSchedule);
        }

        Ok(())
    }
}

impl From<Participant> for ParticipantEntity {
    fn from(value: Participant) -> Self {
        Self {
            user: value.user,
            score: value.score,
            wrong_count: value.wrong_count,
            disqualified_at: value.disqualified_at,
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user: value.user,
            score: value.score,
            wrong_count: value.wrong_count,
            disqualified_at: value.disqualified_at,
        }
    }
}

impl From<Answer> for AnswerEntity {
    fn from(value: Answer) -> Self {
        Self {
            user: value.user,
            selected_index: value.selected_index,
            is_correct: value.is_correct,
            answered_at: value.answered_at,
        }
    }
}

impl From<AnswerEntity> for Answer {
    fn from(value: AnswerEntity) -> Self {
        Self {
            user: value.user,
            selected_index: value.selected_index,
            is_correct: value.is_correct,
            answered_at: value.answered_at,
        }
    }
}

impl From<Match> for MatchEntity {
    fn from(value: Match) -> Self {
        let Roster { owner, challenger } = value.participants;
        Self {
            id: value.id,
            status: value.status,
            owner: value.owner,
            participants: std::iter::once(owner)
                .chain(challenger)
                .map(Into::into)
                .collect(),
            pending_join_requests: value
                .pending_join_requests
                .into_iter()
                .map(|request| JoinRequestEntity {
                    user: request.user,
                    requested_at: request.requested_at,
                })
                .collect(),
            started_at: value.started_at,
            ends_at: value.ends_at,
            current_question_id: value.current_question.map(|current| current.id),
            current_question_deadline: value.current_question.map(|current| current.deadline),
            served_question_ids: value.served_question_ids.into_iter().collect(),
            question_records: value
                .question_records
                .into_iter()
                .map(|record| QuestionRecordEntity {
                    question_id: record.question_id,
                    answers: record.answers.into_iter().map(Into::into).collect(),
                })
                .collect(),
            difficulty: value.filters.difficulty,
            tags: value.filters.tags.into_iter().collect(),
            end_reason: value.end_reason,
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        }
    }
}

impl TryFrom<MatchEntity> for Match {
    type Error = MatchInvariantError;

    fn try_from(value: MatchEntity) -> Result<Self, Self::Error> {
        let count = value.participants.len();
        let mut participants = value.participants.into_iter().map(Participant::from);
        let (Some(owner), challenger, None) =
            (participants.next(), participants.next(), participants.next())
        else {
            return Err(MatchInvariantError::Cardinality(count));
        };
        if challenger
            .as_ref()
            .is_some_and(|challenger| challenger.user == owner.user)
        {
            return Err(MatchInvariantError::AlreadyParticipant(owner.user));
        }

        let mut served_question_ids = IndexSet::with_capacity(value.served_question_ids.len());
        for id in value.served_question_ids {
            if !served_question_ids.insert(id) {
                return Err(MatchInvariantError::QuestionAlreadyServed(id));
            }
        }

        let current_question = match (value.current_question_id, value.current_question_deadline)
        {
            (Some(id), Some(deadline)) => Some(CurrentQuestion { id, deadline }),
            (None, None) => None,
            _ => return Err(MatchInvariantError::NoCurrentQuestion),
        };

        let game = Self {
            id: value.id,
            status: value.status,
            owner: value.owner,
            participants: Roster { owner, challenger },
            pending_join_requests: value
                .pending_join_requests
                .into_iter()
                .map(|request| JoinRequest {
                    user: request.user,
                    requested_at: request.requested_at,
                })
                .collect(),
            started_at: value.started_at,
            ends_at: value.ends_at,
            current_question,
            served_question_ids,
            question_records: value
                .question_records
                .into_iter()
                .map(|record| QuestionRecord {
                    question_id: record.question_id,
                    answers: record.answers.into_iter().map(Into::into).collect(),
                })
                .collect(),
            filters: QuestionFilters {
                difficulty: value.difficulty,
                tags: value.tags.into_iter().collect(),
            },
            end_reason: value.end_reason,
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        };

        game.check_invariants()?;
        Ok(game)
    }
}
