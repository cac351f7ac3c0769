//! shardfeed server - standalone change feed.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardfeed_server::{AppState, Args, FeedServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let log_filter = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "shardfeed_server={0},shardfeed_core={0},tower_http=info",
                    log_filter
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting shardfeed server");

    let config = args.into_config()?;
    let state = AppState::new(config.clone())?;

    // Bind failure aborts startup.
    let server = FeedServer::bind(&config, state).await?;

    tracing::info!("subscribers connect at {}", server.ws_url());
    tracing::info!("health check at http://{}/health", server.local_addr());

    server.serve().await?;

    Ok(())
}
