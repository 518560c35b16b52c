mod common;

use common::counter::Counter;
use mcp_session_router::{
    ServerEngine,
    transport::{StreamableHttpServerConfig, StreamableHttpService},
};
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BIND_ADDRESS: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StreamableHttpServerConfig {
        json_response: std::env::var("MCP_JSON_RESPONSE")
            .is_ok_and(|value| matches!(value.as_str(), "1" | "true" | "yes")),
        ..Default::default()
    };
    let engine = ServerEngine::new(Counter::new());
    let service = StreamableHttpService::new(engine.clone(), config);
    let router = service.clone().router();

    let listener = tokio::net::TcpListener::bind(BIND_ADDRESS).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        path = %service.config.path,
        json_response = service.config.json_response,
        "MCP streamable HTTP server listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
        })
        .into_future()
        .instrument(tracing::info_span!("counter_streamhttp", bind_address = BIND_ADDRESS))
        .await?;

    service.close_all().await;
    engine.close();
    Ok(())
}
