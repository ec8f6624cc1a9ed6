use anyhow::Result;
use clap::Parser;
use crawler::{AppConfig, Coordinator};
use search_core::SledRepository;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl the configured sites into the lemma index")]
struct Cli {
    /// Path to the JSON configuration listing the sites to index
    #[arg(long, default_value = "./config.json")]
    config: String,
    /// Index database directory
    #[arg(long, default_value = "./data")]
    db: String,
    /// Re-index only this page instead of crawling every site
    #[arg(long)]
    page: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    let config = AppConfig::load(&args.config)?;
    let repo = Arc::new(SledRepository::open(&args.db)?);
    let coordinator = Coordinator::new(&config, repo.clone(), config.extractor()?)?;

    match args.page {
        Some(url) => coordinator.index_single_page(&url).await?,
        None => {
            coordinator.start_indexing()?;
            eprintln!("crawler: indexing {} site(s), Ctrl-C to stop", coordinator.sites().len());
            tokio::select! {
                _ = coordinator.wait_finished() => {}
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("crawler: interrupted, stopping");
                    if let Err(e) = coordinator.stop_indexing().await {
                        tracing::warn!(error = %e, "stop requested after indexing ended");
                    }
                }
            }
        }
    }

    repo.flush()?;
    let stats = coordinator.statistics()?;
    for site in &stats.statistics.detailed {
        eprintln!("crawler: {} {} pages={} lemmas={}", site.url, site.status, site.pages, site.lemmas);
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
