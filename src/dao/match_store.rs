use std::{cmp::Reverse, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{MatchEntity, MatchListItemEntity},
        storage::{StorageError, StorageResult},
    },
    state::state_machine::MatchStatus,
};

/// Abstraction over the persistence layer for matches.
pub trait MatchStore: Send + Sync {
    /// Persist a brand-new match.
    fn insert_match(&self, game: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Overwrite a match, provided the stored copy is still at `expected_version`.
    fn replace_match(
        &self,
        game: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Matches waiting for a challenger, newest first.
    fn list_waiting(&self) -> BoxFuture<'static, StorageResult<Vec<MatchListItemEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Short name of the backend, reported by the health check.
    fn backend(&self) -> &'static str;
}

/// Process-local [`MatchStore`].
#[derive(Clone, Default)]
pub struct InMemoryMatchStore {
    matches: Arc<DashMap<Uuid, MatchEntity>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert_match(&self, game: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let matches = Arc::clone(&self.matches);
        Box::pin(async move {
            match matches.entry(game.id) {
                Entry::Occupied(_) => Err(StorageError::Rejected {
                    id: game.id,
                    reason: "already stored",
                }),
                Entry::Vacant(vacant) => {
                    vacant.insert(game);
                    Ok(())
                }
            }
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let matches = Arc::clone(&self.matches);
        Box::pin(async move { Ok(matches.get(&id).map(|entry| entry.value().clone())) })
    }

    fn replace_match(
        &self,
        game: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let matches = Arc::clone(&self.matches);
        Box::pin(async move {
            let Some(mut stored) = matches.get_mut(&game.id) else {
                return Err(StorageError::Rejected {
                    id: game.id,
                    reason: "not stored",
                });
            };
            if stored.version != expected_version {
                return Err(StorageError::Conflict {
                    id: game.id,
                    expected: expected_version,
                });
            }
            *stored = game;
            Ok(())
        })
    }

    fn list_waiting(&self) -> BoxFuture<'static, StorageResult<Vec<MatchListItemEntity>>> {
        let matches = Arc::clone(&self.matches);
        Box::pin(async move {
            let mut waiting: Vec<MatchListItemEntity> = matches
                .iter()
                .filter(|entry| entry.status == MatchStatus::Waiting)
                .map(|entry| entry.value().clone().into())
                .collect();
            waiting.sort_by_key(|item| Reverse(item.created_at));
            Ok(waiting)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::match_state::{Match, QuestionFilters};

    fn waiting_entity(created_at: SystemTime) -> MatchEntity {
        Match::new(Uuid::new_v4(), QuestionFilters::default(), created_at).into()
    }

    #[tokio::test]
    async fn replace_checks_expected_version() {
        let store = InMemoryMatchStore::new();
        let mut entity = waiting_entity(SystemTime::now());
        store.insert_match(entity.clone()).await.unwrap();

        entity.version = 1;
        store.replace_match(entity.clone(), 0).await.unwrap();

        entity.version = 2;
        let err = store.replace_match(entity.clone(), 0).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 0, .. }));

        let stored = store.find_match(entity.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn insert_refuses_existing_id() {
        let store = InMemoryMatchStore::new();
        let entity = waiting_entity(SystemTime::now());
        store.insert_match(entity.clone()).await.unwrap();
        assert!(matches!(
            store.insert_match(entity).await,
            Err(StorageError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn list_waiting_is_newest_first() {
        let store = InMemoryMatchStore::new();
        let now = SystemTime::now();
        let older = waiting_entity(now);
        let newer = waiting_entity(now + Duration::from_secs(5));
        let mut active = waiting_entity(now + Duration::from_secs(10));
        active.status = MatchStatus::Active;

        for entity in [older.clone(), newer.clone(), active] {
            store.insert_match(entity).await.unwrap();
        }

        let ids: Vec<Uuid> = store
            .list_waiting()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
