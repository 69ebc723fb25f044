/// Leaderboard aggregation of completed match results.
pub mod leaderboard;
/// Match persistence and retrieval operations.
pub mod match_store;
/// Database model definitions.
pub mod models;
#[cfg(feature = "mongo-store")]
pub mod mongodb;
/// Randomized question supply and answer keys.
pub mod question_source;
/// Storage abstraction layer for database operations.
pub mod storage;
