use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Database,
    bson::{Document, doc},
};
use uuid::Uuid;

use super::{
    error::{MongoDaoError, MongoResult},
    models::{MongoAnswerKeyDocument, MongoQuestionPromptDocument, QUESTION_COLLECTION_NAME},
};
use crate::{
    dao::{models::QuestionPrompt, question_source::QuestionSource, storage::StorageResult},
    state::match_state::{Difficulty, QuestionFilters},
};

/// Question source reading the `questions` collection.
#[derive(Clone)]
pub struct MongoQuestionSource {
    database: Database,
}

impl MongoQuestionSource {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    async fn sample(
        &self,
        exclude: Vec<Uuid>,
        filters: QuestionFilters,
    ) -> MongoResult<Option<QuestionPrompt>> {
        let pipeline = vec![
            doc! {"$match": sample_filter(&exclude, &filters)},
            doc! {"$sample": {"size": 1}},
            // The answer key never leaves the database on this path.
            doc! {"$project": {"prompt": 1, "options": 1}},
        ];

        let mut documents: Vec<MongoQuestionPromptDocument> = self
            .database
            .collection::<Document>(QUESTION_COLLECTION_NAME)
            .aggregate(pipeline)
            .with_type::<MongoQuestionPromptDocument>()
            .await
            .map_err(|source| MongoDaoError::SampleQuestion { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::SampleQuestion { source })?;

        documents.pop().map(QuestionPrompt::try_from).transpose()
    }

    async fn answer_key(&self, id: Uuid) -> MongoResult<Option<u32>> {
        let document = self
            .database
            .collection::<MongoAnswerKeyDocument>(QUESTION_COLLECTION_NAME)
            .find_one(doc! {"_id": id.to_string()})
            .projection(doc! {"correct_index": 1})
            .await
            .map_err(|source| MongoDaoError::LoadAnswerKey { id, source })?;

        Ok(document.map(|document| document.correct_index))
    }
}

fn sample_filter(exclude: &[Uuid], filters: &QuestionFilters) -> Document {
    let excluded: Vec<String> = exclude.iter().map(Uuid::to_string).collect();
    let mut filter = doc! {"_id": {"$nin": excluded}};
    if let Some(difficulty) = filters.difficulty {
        let key = match difficulty {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        filter.insert("difficulty", key);
    }
    if !filters.tags.is_empty() {
        let tags: Vec<&str> = filters.tags.iter().map(String::as_str).collect();
        filter.insert("tags", doc! {"$in": tags});
    }
    filter
}

impl QuestionSource for MongoQuestionSource {
    fn fetch_random(
        &self,
        exclude: Vec<Uuid>,
        filters: QuestionFilters,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionPrompt>>> {
        let source = self.clone();
        Box::pin(async move { source.sample(exclude, filters).await.map_err(Into::into) })
    }

    fn fetch_answer_key(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<u32>>> {
        let source = self.clone();
        Box::pin(async move { source.answer_key(id).await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn filter_without_constraints_only_excludes() {
        let served = Uuid::new_v4();
        let filter = sample_filter(&[served], &QuestionFilters::default());
        assert_eq!(filter, doc! {"_id": {"$nin": [served.to_string()]}});
    }

    #[test]
    fn filter_applies_difficulty_and_any_tag() {
        let filters = QuestionFilters {
            difficulty: Some(Difficulty::Hard),
            tags: BTreeSet::from(["geo".to_string(), "math".to_string()]),
        };
        let filter = sample_filter(&[], &filters);
        let expected_ids: Vec<String> = Vec::new();
        assert_eq!(
            filter,
            doc! {
                "_id": {"$nin": expected_ids},
                "difficulty": "hard",
                "tags": {"$in": ["geo", "math"]},
            }
        );
    }
}
