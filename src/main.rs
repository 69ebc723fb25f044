//! Quiz Duel Back binary entrypoint wiring REST, SSE and the storage backends.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_duel_back::{
    config::AppConfig,
    routes,
    state::{AppState, AppStateBuilder, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    info!(
        match_duration_ms = config.match_duration.as_millis() as u64,
        question_duration_ms = config.question_duration.as_millis() as u64,
        max_wrong = config.max_wrong,
        "configuration ready"
    );

    let app_state = with_storage(AppState::builder(config)).await?.build();
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Plug the MongoDB backends in when `MONGO_URI` is set; in-memory ones otherwise.
#[cfg(feature = "mongo-store")]
async fn with_storage(builder: AppStateBuilder) -> anyhow::Result<AppStateBuilder> {
    use std::sync::Arc;

    use quiz_duel_back::dao::mongodb::{MongoConfig, connect};

    if env::var_os("MONGO_URI").is_none() {
        info!("MONGO_URI not set; using in-memory storage");
        return Ok(builder);
    }

    let mongo_config = MongoConfig::from_env()
        .await
        .context("reading MongoDB configuration")?;
    let backends = connect(mongo_config)
        .await
        .context("connecting to MongoDB")?;

    Ok(builder
        .with_match_store(Arc::new(backends.matches))
        .with_question_source(Arc::new(backends.questions))
        .with_leaderboard(Arc::new(backends.leaderboard)))
}

#[cfg(not(feature = "mongo-store"))]
async fn with_storage(builder: AppStateBuilder) -> anyhow::Result<AppStateBuilder> {
    info!("built without mongo-store; using in-memory storage");
    Ok(builder)
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
