use anyhow::Result;
use tracing_subscriber::EnvFilter;

use tablemat::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    tablemat::server::run(config).await?;
    Ok(())
}
