mod config;
mod connection;
mod error;
mod leaderboard;
mod match_store;
mod models;
mod question_source;

use mongodb::{Database, IndexModel, bson::doc, options::IndexOptions};
use tracing::info;

pub use config::MongoConfig;
pub use error::{MongoDaoError, MongoResult};
pub use leaderboard::MongoLeaderboard;
pub use match_store::MongoMatchStore;
pub use question_source::MongoQuestionSource;

use crate::dao::storage::StorageError;
use connection::establish_connection;
use models::{MATCH_COLLECTION_NAME, QUESTION_COLLECTION_NAME};

/// Every MongoDB-backed collaborator, sharing one connection pool.
pub struct MongoBackends {
    pub matches: MongoMatchStore,
    pub questions: MongoQuestionSource,
    pub leaderboard: MongoLeaderboard,
}

/// Connect, make sure indexes exist, and hand out the stores.
pub async fn connect(config: MongoConfig) -> MongoResult<MongoBackends> {
    let (_client, database) =
        establish_connection(&config.options, &config.database_name).await?;
    ensure_indexes(&database).await?;
    info!(database = %config.database_name, "connected to MongoDB");

    Ok(MongoBackends {
        matches: MongoMatchStore::new(database.clone()),
        questions: MongoQuestionSource::new(database.clone()),
        leaderboard: MongoLeaderboard::new(database),
    })
}

async fn ensure_indexes(database: &Database) -> MongoResult<()> {
    let lobby_index = IndexModel::builder()
        .keys(doc! {"status": 1, "created_at": -1})
        .options(
            IndexOptions::builder()
                .name(Some("match_status_created_idx".to_owned()))
                .build(),
        )
        .build();
    database
        .collection::<mongodb::bson::Document>(MATCH_COLLECTION_NAME)
        .create_index(lobby_index)
        .await
        .map_err(|source| MongoDaoError::EnsureIndex {
            collection: MATCH_COLLECTION_NAME,
            index: "status,created_at",
            source,
        })?;

    let filter_index = IndexModel::builder()
        .keys(doc! {"difficulty": 1, "tags": 1})
        .options(
            IndexOptions::builder()
                .name(Some("question_filter_idx".to_owned()))
                .build(),
        )
        .build();
    database
        .collection::<mongodb::bson::Document>(QUESTION_COLLECTION_NAME)
        .create_index(filter_index)
        .await
        .map_err(|source| MongoDaoError::EnsureIndex {
            collection: QUESTION_COLLECTION_NAME,
            index: "difficulty,tags",
            source,
        })?;

    Ok(())
}

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
