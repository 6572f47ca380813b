//! # LDAP administration server
//!
//! Main entry point: loads configuration, wires the components and runs
//! the changelog scheduler until Ctrl-C.

#![forbid(unsafe_code)]

use la_server::{Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        poll_interval_ms = config.config.audit.changelog_poll_interval_ms,
        audit_workers = config.config.audit.workers,
        "LDAP administration layer starting..."
    );

    let server = Server::new(config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await;

    Ok(())
}
