use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::seq::IndexedRandom;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::{
        models::{QuestionEntity, QuestionPrompt},
        storage::StorageResult,
    },
    dto::validation::validate_question_options,
    state::match_state::QuestionFilters,
};

/// Supplier of randomized quiz content and answer keys.
pub trait QuestionSource: Send + Sync {
    /// Pick one question outside `exclude` that satisfies `filters`, without its answer key.
    fn fetch_random(
        &self,
        exclude: Vec<Uuid>,
        filters: QuestionFilters,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionPrompt>>>;
    /// Index of the correct option of `id`, if the question exists.
    fn fetch_answer_key(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<u32>>>;
}

/// Whether `question` passes the difficulty (exact) and tag (match-any) filters.
pub fn matches_filters(question: &QuestionEntity, filters: &QuestionFilters) -> bool {
    let difficulty_ok = filters
        .difficulty
        .is_none_or(|difficulty| difficulty == question.difficulty);
    let tags_ok =
        filters.tags.is_empty() || question.tags.iter().any(|tag| filters.tags.contains(tag));
    difficulty_ok && tags_ok
}

/// Process-local question bank seeded from configuration.
#[derive(Clone, Default)]
pub struct InMemoryQuestionBank {
    questions: Arc<DashMap<Uuid, QuestionEntity>>,
}

impl InMemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bank from `questions`, skipping malformed entries.
    pub fn from_questions(questions: impl IntoIterator<Item = QuestionEntity>) -> Self {
        let bank = Self::new();
        for question in questions {
            bank.insert(question);
        }
        bank
    }

    /// Add or replace a question. Returns `false` when it was rejected as malformed.
    pub fn insert(&self, question: QuestionEntity) -> bool {
        if let Err(err) = validate_question_options(&question.options, question.correct_index) {
            warn!(question_id = %question.id, error = %err, "skipping malformed question");
            return false;
        }
        self.questions.insert(question.id, question);
        true
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionSource for InMemoryQuestionBank {
    fn fetch_random(
        &self,
        exclude: Vec<Uuid>,
        filters: QuestionFilters,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionPrompt>>> {
        let questions = Arc::clone(&self.questions);
        Box::pin(async move {
            let exclude: HashSet<Uuid> = exclude.into_iter().collect();
            let candidates: Vec<QuestionPrompt> = questions
                .iter()
                .filter(|entry| !exclude.contains(entry.key()))
                .filter(|entry| matches_filters(entry.value(), &filters))
                .map(|entry| QuestionPrompt::from(entry.value()))
                .collect();
            Ok(candidates.choose(&mut rand::rng()).cloned())
        })
    }

    fn fetch_answer_key(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<u32>>> {
        let questions = Arc::clone(&self.questions);
        Box::pin(async move { Ok(questions.get(&id).map(|question| question.correct_index)) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::state::match_state::Difficulty;

    fn question(difficulty: Difficulty, tags: &[&str]) -> QuestionEntity {
        QuestionEntity {
            id: Uuid::new_v4(),
            prompt: "2 + 2 = ?".into(),
            options: vec!["3".into(), "4".into()],
            correct_index: 1,
            difficulty,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    #[test]
    fn filters_use_exact_difficulty_and_any_tag() {
        let q = question(Difficulty::Easy, &["math", "warmup"]);
        assert!(matches_filters(&q, &QuestionFilters::default()));
        assert!(matches_filters(
            &q,
            &QuestionFilters {
                difficulty: Some(Difficulty::Easy),
                tags: BTreeSet::from(["history".to_string(), "math".to_string()]),
            }
        ));
        assert!(!matches_filters(
            &q,
            &QuestionFilters {
                difficulty: Some(Difficulty::Hard),
                tags: BTreeSet::new(),
            }
        ));
        assert!(!matches_filters(
            &q,
            &QuestionFilters {
                difficulty: None,
                tags: BTreeSet::from(["history".to_string()]),
            }
        ));
    }

    #[tokio::test]
    async fn fetch_random_skips_excluded_and_hides_key() {
        let first = question(Difficulty::Medium, &[]);
        let second = question(Difficulty::Medium, &[]);
        let bank = InMemoryQuestionBank::from_questions([first.clone(), second.clone()]);

        let picked = bank
            .fetch_random(vec![first.id], QuestionFilters::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, second.id);

        let none = bank
            .fetch_random(vec![first.id, second.id], QuestionFilters::default())
            .await
            .unwrap();
        assert!(none.is_none());

        assert_eq!(bank.fetch_answer_key(first.id).await.unwrap(), Some(1));
        assert_eq!(bank.fetch_answer_key(Uuid::new_v4()).await.unwrap(), None);
    }

    #[test]
    fn malformed_questions_are_skipped() {
        let mut bad = question(Difficulty::Easy, &[]);
        bad.correct_index = 9;
        let bank = InMemoryQuestionBank::from_questions([bad, question(Difficulty::Easy, &[])]);
        assert_eq!(bank.len(), 1);
    }
}
