use anyhow::Result;
use clap::Parser;
use netroster::config;
use netroster::db;
use netroster::directory::DirectoryClient;
use netroster::enrich::Enricher;
use netroster::listing::ListingFetcher;
use netroster::pipeline::BatchProcessor;
use netroster::server::{self, AppContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/netroster.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let directory = Arc::new(DirectoryClient::from_config(&cfg)?);
    let enricher = Arc::new(Enricher::new(
        pool.clone(),
        directory,
        cfg.directory.cache_ttl_hours,
    ));
    let processor = Arc::new(BatchProcessor::new(
        pool.clone(),
        enricher,
        cfg.batch.max_concurrency,
    ));
    let fetcher = ListingFetcher::from_config(&cfg);

    let ctx = AppContext {
        pool,
        listing: Arc::new(fetcher),
        processor,
        listing_source: cfg.listing.url.clone(),
    };

    info!("starting netroster");
    server::run(&cfg.app.bind_addr, ctx).await
}
