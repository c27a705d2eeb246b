use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs in production (BUDDHA_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("BUDDHA_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("buddha_server=info".parse()?)
        .add_directive("buddha_agents=info".parse()?)
        .add_directive("buddha_store=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = buddha_server::config::ServerConfig::parse();
    tracing::info!(
        "Starting on {} (store: {:?}, embedder: {:?}, chunking: {:?})",
        config.listen_addr,
        config.store,
        config.embedder,
        config.chunking
    );
    if config.jwt_secret == buddha_server::config::DEFAULT_JWT_SECRET {
        tracing::warn!("JWT_SECRET is not set; using the built-in development secret");
    }

    let server = buddha_server::server::Server::new(config);
    server.run().await
}
