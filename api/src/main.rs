use anyhow::{Context, Result};
use premium_api::{router, AppState, ProviderChain};
use premium_common::RunConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const ADDR_ENV: &str = "PREMIUMS_API_ADDR";
const CONFIG_ENV: &str = "PREMIUMS_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => RunConfig::load(&PathBuf::from(path))?,
        Err(_) => RunConfig::default(),
    };
    let root = std::env::current_dir().context("resolving working directory")?;
    let chain = ProviderChain::standard(&root, config)?;
    info!("Provider chain ready with {} providers", chain.len());

    let app = router(AppState {
        chain: Arc::new(chain),
    });

    let addr = std::env::var(ADDR_ENV).unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Premiums API server starting on http://{}", addr);
    info!("  GET /api/premiums?symbols=AAPL,MSFT&type=call");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
