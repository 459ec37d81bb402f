//! AID agent binary.

use aid_agent::Agent;
use aid_agent_service::{AgentConfig, build_router};
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::from_env()?;
    info!("Starting AID agent on {}", config.listen_addr);

    let app = build_router(Arc::new(Agent::new()));
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    info!("AID agent listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
