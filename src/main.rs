//! Chroma gateway server
//!
//! Holds the provider API keys and serves exchanges to remote clients under
//! a per-client daily quota.

use chroma_chat::api::{create_router, AppState};
use chroma_chat::config::ServerConfig;
use chroma_chat::governor::RateGovernor;
use chroma_chat::llm::{LlmConfig, ProviderRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chroma_chat=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize provider registry
    let llm_config = LlmConfig::from_env(config.upstream_timeout);
    let registry = Arc::new(ProviderRegistry::new(&llm_config)?);
    let configured: Vec<&str> = chroma_chat::llm::all_providers()
        .iter()
        .map(|p| p.id)
        .filter(|id| registry.is_configured(id))
        .collect();
    if configured.is_empty() {
        tracing::warn!("No provider API keys configured; every exchange will fail");
    } else {
        tracing::info!(
            providers = ?configured,
            default = %registry.default_provider(),
            "Provider registry initialized"
        );
    }

    let governor = Arc::new(RateGovernor::new(config.daily_limit));
    governor.spawn_reaper(config.reap_interval);

    let state = AppState::new(&config, governor, registry);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, daily_limit = config.daily_limit, "Chroma gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
