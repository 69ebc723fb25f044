use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Collection, Database, bson::doc};
use uuid::Uuid;

use super::{
    connection::ping,
    error::{MongoDaoError, MongoResult},
    models::{MATCH_COLLECTION_NAME, MongoMatchDocument},
};
use crate::{
    dao::{
        match_store::MatchStore,
        models::{MatchEntity, MatchListItemEntity},
        storage::{StorageError, StorageResult},
    },
    state::state_machine::MatchStatus,
};

/// MongoDB-backed [`MatchStore`] implementation.
#[derive(Clone)]
pub struct MongoMatchStore {
    database: Database,
}

impl MongoMatchStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn collection(&self) -> Collection<MongoMatchDocument> {
        self.database
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn insert(&self, game: MatchEntity) -> MongoResult<()> {
        let id = game.id;
        let document: MongoMatchDocument = game.into();
        self.collection()
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::InsertMatch { id, source })?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> MongoResult<Option<MatchEntity>> {
        let document = self
            .collection()
            .find_one(doc! {"_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::LoadMatch { id, source })?;

        document.map(MatchEntity::try_from).transpose()
    }

    /// Returns `false` when no document matched both the id and the expected version.
    async fn replace(&self, game: MatchEntity, expected_version: u64) -> MongoResult<bool> {
        let id = game.id;
        let document: MongoMatchDocument = game.into();
        let expected = i64::try_from(expected_version).unwrap_or(i64::MAX);
        let result = self
            .collection()
            .replace_one(doc! {"_id": id.to_string(), "version": expected}, &document)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;

        Ok(result.matched_count == 1)
    }

    async fn list_waiting(&self) -> MongoResult<Vec<MatchListItemEntity>> {
        let status = match_status_key(MatchStatus::Waiting);
        let documents: Vec<MongoMatchDocument> = self
            .collection()
            .find(doc! {"status": status})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?;

        documents
            .into_iter()
            .map(|document| MatchEntity::try_from(document).map(Into::into))
            .collect()
    }

    async fn ping(&self) -> MongoResult<()> {
        ping(&self.database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }
}

fn match_status_key(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Waiting => "waiting",
        MatchStatus::Active => "active",
        MatchStatus::Completed => "completed",
        MatchStatus::Cancelled => "cancelled",
    }
}

impl MatchStore for MongoMatchStore {
    fn insert_match(&self, game: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert(game).await.map_err(Into::into) })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find(id).await.map_err(Into::into) })
    }

    fn replace_match(
        &self,
        game: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = game.id;
            if store.replace(game, expected_version).await? {
                Ok(())
            } else {
                Err(StorageError::Conflict {
                    id,
                    expected: expected_version,
                })
            }
        })
    }

    fn list_waiting(&self) -> BoxFuture<'static, StorageResult<Vec<MatchListItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_waiting().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_keys_match_serde_names() {
        for status in [
            MatchStatus::Waiting,
            MatchStatus::Active,
            MatchStatus::Completed,
            MatchStatus::Cancelled,
        ] {
            let serialized = serde_json::to_value(status).unwrap();
            assert_eq!(serialized, match_status_key(status));
        }
    }
}
