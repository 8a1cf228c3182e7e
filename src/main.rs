use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use taskgate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let config = ServerConfig::from_env()?;
    info!(target: "startup", "taskgate starting: RUST_LOG='{}', config={:?}", rust_log, config);

    taskgate::server::run(config).await
}
