//! Flag Arena Server
//!
//! Runs one capture-the-flag match behind a WebSocket endpoint.

use tracing::info;
use tracing_subscriber::EnvFilter;

use flag_arena::{
    VERSION,
    network::server::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG wins, then LOG_LEVEL, then info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into())))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    info!("Flag Arena Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.tick_rate);

    let server = GameServer::new(config)?;

    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Ctrl-C received, shutting down");
            server.shutdown().await;
        }
    }

    Ok(())
}
