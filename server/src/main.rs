use anyhow::Result;
use clap::Parser;
use crawler::AppConfig;
use search_core::SledRepository;
use server::{build_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Path to the JSON configuration listing the sites to index
    #[arg(long, default_value = "./config.json")]
    config: String,
    /// Index database directory
    #[arg(long, default_value = "./data")]
    db: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;
    let repo = Arc::new(SledRepository::open(&args.db)?);
    let state = AppState::new(&config, repo.clone())?;
    let app = build_app(state.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, sites = config.sites.len(), "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if state.coordinator.is_indexing() {
        if let Err(e) = state.coordinator.stop_indexing().await {
            tracing::warn!(error = %e, "indexing ended during shutdown");
        }
    }
    repo.flush()?;
    tracing::info!("server stopped");
    Ok(())
}
