use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Duel Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::lobby_stream,
        crate::routes::sse::match_stream,
        crate::routes::sse::user_stream,
        crate::routes::matches::create_match,
        crate::routes::matches::list_waiting,
        crate::routes::matches::get_match,
        crate::routes::matches::request_join,
        crate::routes::matches::accept_join,
        crate::routes::matches::submit_answer,
        crate::routes::matches::force_end,
        crate::routes::matches::get_results,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::CreateMatchRequest,
            crate::dto::matches::AcceptJoinRequest,
            crate::dto::matches::SubmitAnswerRequest,
            crate::dto::matches::AnswerResponse,
            crate::dto::matches::AckResponse,
            crate::dto::matches::MatchSnapshot,
            crate::dto::matches::ParticipantSummary,
            crate::dto::matches::JoinRequestSummary,
            crate::dto::matches::WaitingMatchSummary,
            crate::dto::matches::MatchResultsResponse,
            crate::dto::matches::QuestionRecordSummary,
            crate::dto::matches::AnswerSummary,
            crate::dto::sse::Handshake,
            crate::dto::sse::MatchCreatedEvent,
            crate::dto::sse::MatchUpdatedEvent,
            crate::dto::sse::JoinRequestedEvent,
            crate::dto::sse::JoinAcceptedEvent,
            crate::dto::sse::QuestionDispatchedEvent,
            crate::dto::sse::ScoreUpdatedEvent,
            crate::dto::sse::QuestionRevealedEvent,
            crate::dto::sse::QuestionTimedOutEvent,
            crate::dto::sse::MatchEndedEvent,
            crate::state::match_state::Difficulty,
            crate::state::state_machine::MatchStatus,
            crate::state::state_machine::EndReason,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "matches", description = "Match lifecycle, answers and results"),
    )
)]
pub struct ApiDoc;
