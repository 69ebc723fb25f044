use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    routes::matches::CurrentUser,
    services::{notifications::ChannelScope, sse_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/lobby",
    tag = "sse",
    responses((status = 200, description = "Lobby SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream lobby events: matches opened and status changes.
pub async fn lobby_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_lobby(&state);
    info!("New lobby SSE connection");
    sse_service::to_sse_stream(&state, receiver, ChannelScope::Lobby)
}

#[utoipa::path(
    get,
    path = "/sse/matches/{id}",
    tag = "sse",
    params(("id" = String, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown match"),
        (status = 409, description = "Match already over")
    )
)]
/// Stream the events of one match: questions, scores and the final outcome.
pub async fn match_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = sse_service::subscribe_match(&state, id).await?;
    info!(match_id = %id, "New match SSE connection");
    Ok(sse_service::to_sse_stream(
        &state,
        receiver,
        ChannelScope::Match(id),
    ))
}

#[utoipa::path(
    get,
    path = "/sse/users/{id}",
    tag = "sse",
    params(
        ("id" = String, Path, description = "User identifier"),
        ("X-User-Id" = String, Header, description = "Caller user id, must match `id`")
    ),
    responses(
        (status = 200, description = "Per-user SSE stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "Missing or invalid caller identity"),
        (status = 403, description = "Stream belongs to another user")
    )
)]
/// Stream events addressed to the caller, such as join requests and acceptances.
pub async fn user_stream(
    State(state): State<SharedState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if caller != id {
        return Err(AppError::Forbidden(
            "cannot subscribe to another user's stream".into(),
        ));
    }
    let receiver = sse_service::subscribe_user(&state, id);
    info!(user = %id, "New user SSE connection");
    Ok(sse_service::to_sse_stream(
        &state,
        receiver,
        ChannelScope::User(id),
    ))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/lobby", get(lobby_stream))
        .route("/sse/matches/{id}", get(match_stream))
        .route("/sse/users/{id}", get(user_stream))
}
