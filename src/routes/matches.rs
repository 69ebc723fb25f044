use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::matches::{
        AcceptJoinRequest, AckResponse, AnswerResponse, CreateMatchRequest, MatchResultsResponse,
        MatchSnapshot, SubmitAnswerRequest, WaitingMatchSummary,
    },
    error::AppError,
    services::match_service,
    state::{SharedState, match_state::UserId},
};

/// Header carrying the caller's user id, issued by an external identity service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity taken from the [`USER_ID_HEADER`] header.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        raw.to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))
    }
}

/// Match lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", post(create_match))
        .route("/matches/waiting", get(list_waiting))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/join", post(request_join))
        .route("/matches/{id}/accept", post(accept_join))
        .route("/matches/{id}/answer", post(submit_answer))
        .route("/matches/{id}/end", post(force_end))
        .route("/matches/{id}/results", get(get_results))
}

/// Open a new match owned by the caller.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    params(("X-User-Id" = String, Header, description = "Caller user id")),
    request_body = CreateMatchRequest,
    responses(
        (status = 201, description = "Match created", body = MatchSnapshot),
        (status = 400, description = "Invalid filters"),
        (status = 401, description = "Missing caller identity")
    )
)]
pub async fn create_match(
    State(state): State<SharedState>,
    CurrentUser(owner): CurrentUser,
    Valid(Json(payload)): Valid<Json<CreateMatchRequest>>,
) -> Result<(StatusCode, Json<MatchSnapshot>), AppError> {
    let game = match_service::create_match(&state, owner, payload).await?;
    Ok((StatusCode::CREATED, Json(MatchSnapshot::from(&game))))
}

/// List matches waiting for a challenger, newest first.
#[utoipa::path(
    get,
    path = "/matches/waiting",
    tag = "matches",
    responses((status = 200, description = "Waiting matches", body = [WaitingMatchSummary]))
)]
pub async fn list_waiting(
    State(state): State<SharedState>,
) -> Result<Json<Vec<WaitingMatchSummary>>, AppError> {
    let matches = match_service::list_waiting(&state).await?;
    Ok(Json(matches.into_iter().map(Into::into).collect()))
}

/// Fetch the public snapshot of a match.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = String, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match snapshot", body = MatchSnapshot),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    let game = match_service::get_match(&state, id).await?;
    Ok(Json(MatchSnapshot::from(&game)))
}

/// Ask the owner of a waiting match to let the caller in.
#[utoipa::path(
    post,
    path = "/matches/{id}/join",
    tag = "matches",
    params(
        ("X-User-Id" = String, Header, description = "Caller user id"),
        ("id" = String, Path, description = "Match identifier")
    ),
    responses(
        (status = 200, description = "Join request recorded", body = AckResponse),
        (status = 400, description = "Owner cannot join their own match"),
        (status = 404, description = "Match unknown or not joinable")
    )
)]
pub async fn request_join(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AckResponse>, AppError> {
    match_service::request_join(&state, id, user).await?;
    Ok(Json(AckResponse::ok()))
}

/// Accept a pending join request and start the match.
#[utoipa::path(
    post,
    path = "/matches/{id}/accept",
    tag = "matches",
    params(
        ("X-User-Id" = String, Header, description = "Owner user id"),
        ("id" = String, Path, description = "Match identifier")
    ),
    request_body = AcceptJoinRequest,
    responses(
        (status = 200, description = "Match started", body = MatchSnapshot),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Match already started or no such request")
    )
)]
pub async fn accept_join(
    State(state): State<SharedState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AcceptJoinRequest>>,
) -> Result<Json<MatchSnapshot>, AppError> {
    let game = match_service::accept_join(&state, id, caller, payload.user_id).await?;
    Ok(Json(MatchSnapshot::from(&game)))
}

/// Answer the current question.
#[utoipa::path(
    post,
    path = "/matches/{id}/answer",
    tag = "matches",
    params(
        ("X-User-Id" = String, Header, description = "Participant user id"),
        ("id" = String, Path, description = "Match identifier")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerResponse),
        (status = 403, description = "Not an eligible participant"),
        (status = 409, description = "Not the current question or already answered"),
        (status = 410, description = "Question or match deadline passed")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<AnswerResponse>, AppError> {
    let response = match_service::submit_answer(
        &state,
        id,
        user,
        payload.question_id,
        payload.selected_index,
    )
    .await?;
    Ok(Json(response))
}

/// End an active match early.
#[utoipa::path(
    post,
    path = "/matches/{id}/end",
    tag = "matches",
    params(
        ("X-User-Id" = String, Header, description = "Owner user id"),
        ("id" = String, Path, description = "Match identifier")
    ),
    responses(
        (status = 200, description = "Match ended", body = AckResponse),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Match is not active")
    )
)]
pub async fn force_end(
    State(state): State<SharedState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AckResponse>, AppError> {
    match_service::force_end(&state, id, caller).await?;
    Ok(Json(AckResponse::ok()))
}

/// Final standings and per-question answers of a completed match.
#[utoipa::path(
    get,
    path = "/matches/{id}/results",
    tag = "matches",
    params(("id" = String, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match results", body = MatchResultsResponse),
        (status = 409, description = "Match not completed yet")
    )
)]
pub async fn get_results(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchResultsResponse>, AppError> {
    let (game, outcome) = match_service::get_results(&state, id).await?;
    Ok(Json(MatchResultsResponse::new(&game, &outcome)))
}
