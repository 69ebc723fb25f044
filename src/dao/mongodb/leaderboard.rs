use futures::future::BoxFuture;
use mongodb::{Database, bson::doc};
use uuid::Uuid;

use super::{
    error::{MongoDaoError, MongoResult},
    models::{LEADER_COLLECTION_NAME, MongoLeaderDocument},
};
use crate::dao::{
    leaderboard::LeaderboardAggregator,
    models::{LeaderEntity, ResultKind},
    storage::StorageResult,
};

/// Leaderboard rows kept in the `leaders` collection, one per user.
#[derive(Clone)]
pub struct MongoLeaderboard {
    database: Database,
}

impl MongoLeaderboard {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    async fn record(&self, user: Uuid, score: u32, result: ResultKind) -> MongoResult<()> {
        let (wins, losses, draws) = match result {
            ResultKind::Win => (1_i64, 0_i64, 0_i64),
            ResultKind::Loss => (0, 1, 0),
            ResultKind::Draw => (0, 0, 1),
        };
        let score = i64::from(score);

        self.database
            .collection::<MongoLeaderDocument>(LEADER_COLLECTION_NAME)
            .update_one(
                doc! {"_id": user.to_string()},
                doc! {
                    "$inc": {
                        "matches": 1_i64,
                        "wins": wins,
                        "losses": losses,
                        "draws": draws,
                        "total_score": score,
                    },
                    "$max": {"best_score": score},
                },
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::RecordResult { user, source })?;

        Ok(())
    }

    async fn find(&self, user: Uuid) -> MongoResult<Option<LeaderEntity>> {
        let document = self
            .database
            .collection::<MongoLeaderDocument>(LEADER_COLLECTION_NAME)
            .find_one(doc! {"_id": user.to_string()})
            .await
            .map_err(|source| MongoDaoError::LoadLeader { user, source })?;

        document.map(LeaderEntity::try_from).transpose()
    }
}

impl LeaderboardAggregator for MongoLeaderboard {
    fn record_result(
        &self,
        user: Uuid,
        score: u32,
        result: ResultKind,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let board = self.clone();
        Box::pin(async move { board.record(user, score, result).await.map_err(Into::into) })
    }

    fn find_leader(&self, user: Uuid) -> BoxFuture<'static, StorageResult<Option<LeaderEntity>>> {
        let board = self.clone();
        Box::pin(async move { board.find(user).await.map_err(Into::into) })
    }
}
