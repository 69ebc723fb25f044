use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{LeaderEntity, ResultKind},
    storage::StorageResult,
};

/// Receives one result per participant of every completed match.
pub trait LeaderboardAggregator: Send + Sync {
    /// Upsert the row of `user`: one more match, the matching counter, and the score totals.
    fn record_result(
        &self,
        user: Uuid,
        score: u32,
        result: ResultKind,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_leader(&self, user: Uuid) -> BoxFuture<'static, StorageResult<Option<LeaderEntity>>>;
}

/// Process-local [`LeaderboardAggregator`].
#[derive(Clone, Default)]
pub struct InMemoryLeaderboard {
    leaders: Arc<DashMap<Uuid, LeaderEntity>>,
}

impl InMemoryLeaderboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaderboardAggregator for InMemoryLeaderboard {
    fn record_result(
        &self,
        user: Uuid,
        score: u32,
        result: ResultKind,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let leaders = Arc::clone(&self.leaders);
        Box::pin(async move {
            leaders
                .entry(user)
                .or_insert_with(|| LeaderEntity {
                    user,
                    ..LeaderEntity::default()
                })
                .record(score, result);
            Ok(())
        })
    }

    fn find_leader(&self, user: Uuid) -> BoxFuture<'static, StorageResult<Option<LeaderEntity>>> {
        let leaders = Arc::clone(&self.leaders);
        Box::pin(async move { Ok(leaders.get(&user).map(|entry| entry.value().clone())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn results_accumulate_per_user() {
        let board = InMemoryLeaderboard::new();
        let user = Uuid::new_v4();

        board.record_result(user, 4, ResultKind::Win).await.unwrap();
        board.record_result(user, 7, ResultKind::Draw).await.unwrap();
        board.record_result(user, 2, ResultKind::Loss).await.unwrap();

        let row = board.find_leader(user).await.unwrap().unwrap();
        assert_eq!(row.user, user);
        assert_eq!((row.matches, row.wins, row.losses, row.draws), (3, 1, 1, 1));
        assert_eq!(row.total_score, 13);
        assert_eq!(row.best_score, 7);
    }
}
