use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let cfg = tabularium::config::Config::from_env()?;
    info!(
        target: "tabularium",
        "tabularium starting: RUST_LOG='{}', http_port={}, source={:?}, filter={}, listing_ttl_secs={}, content_ttl_secs={}",
        rust_log,
        cfg.http_port,
        cfg.source,
        cfg.filter.cache_key(),
        cfg.listing_ttl.as_secs(),
        cfg.content_ttl.as_secs()
    );

    tabularium::server::run_with_config(cfg).await
}
