use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the match store and report which backend is in use.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store = state.match_store();
    match store.health_check().await {
        Ok(()) => HealthResponse::ok(store.backend()),
        Err(err) => {
            warn!(backend = store.backend(), error = %err, "storage health check failed");
            HealthResponse::degraded(store.backend())
        }
    }
}
