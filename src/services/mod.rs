/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match orchestration: lifecycle, answers, timeouts and question dispatch.
pub mod match_service;
/// Lifecycle event catalog and the sink it is published through.
pub mod notifications;
/// Winner computation and leaderboard glue.
pub mod results;
/// Server-Sent Events streaming service.
pub mod sse_service;
