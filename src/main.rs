use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use doc_inquiry::api;
use doc_inquiry::config::Config;
use doc_inquiry::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Fan-out {} queries, top {} passages each",
        config.pipeline.fanout,
        config.pipeline.top_k
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/health", get(api::sessions::health))
        .route("/api/config", get(api::sessions::get_config))
        .route("/api/sessions", post(api::sessions::create_session))
        .route(
            "/api/sessions/{id}",
            get(api::sessions::get_session).delete(api::sessions::delete_session),
        )
        .route("/api/sessions/{id}/turns", post(api::chat::post_turn))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
