use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mangaindex::config::{Config, LibrarySeed};
use mangaindex::covers::CoverArtPipeline;
use mangaindex::db::models::Library;
use mangaindex::db::queries::libraries;
use mangaindex::db::{self, DbPool};
use mangaindex::events::{self, EventBus};
use mangaindex::indexer::{IndexerRegistry, LibraryIndexer};
use mangaindex::listener::NotificationListener;
use mangaindex::metadata;
use mangaindex::notify::LogNotifier;
use mangaindex::state::IndexContext;

#[derive(Parser)]
#[command(name = "mangaindex", version, about = "Manga, comics and novel library indexer")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Scan one library by slug and exit
    #[arg(long, value_name = "LIBRARY")]
    scan: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Error loading config: {e}");
        std::process::exit(1);
    });

    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let pool = db::create_pool(&config.database).await.unwrap_or_else(|e| {
        tracing::error!("Failed to initialize database: {e}");
        std::process::exit(1);
    });
    tracing::info!("Database initialized: {}", config.database.url);

    if let Err(e) = std::fs::create_dir_all(&config.covers.cache_path) {
        tracing::error!(
            "Failed to create covers directory {:?}: {e}",
            config.covers.cache_path
        );
        std::process::exit(1);
    }

    let covers = CoverArtPipeline::from_config(&config.covers, &config.metadata)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to set up cover pipeline: {e}");
            std::process::exit(1);
        });
    let provider = metadata::from_config(&config.metadata).unwrap_or_else(|e| {
        tracing::error!("Failed to set up metadata provider: {e}");
        std::process::exit(1);
    });

    let seeds = config.libraries.clone();
    let ctx = IndexContext::new(
        config,
        pool,
        covers,
        Arc::from(provider),
        Arc::new(LogNotifier),
    );

    if let Err(e) = seed_libraries(&ctx.db, &ctx.events, &seeds).await {
        tracing::error!("Failed to seed libraries: {e}");
        std::process::exit(1);
    }

    if let Some(slug) = cli.scan {
        run_single_scan(ctx, &slug).await;
        return;
    }

    tracing::info!("mangaindex v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(IndexerRegistry::new(ctx.clone()));
    let listener = Arc::new(NotificationListener::new(Arc::clone(&registry)));
    let events = ctx.events.subscribe();
    if let Err(e) = listener.bootstrap().await {
        tracing::error!("Failed to load libraries: {e}");
        std::process::exit(1);
    }

    let shutdown = CancellationToken::new();
    let listener_task = {
        let listener = Arc::clone(&listener);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.run(events, shutdown).await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to wait for Ctrl-C: {e}");
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
    let _ = listener_task.await;
    registry.stop_all();
}

/// Create or update every configured library in the catalog.
async fn seed_libraries(
    pool: &DbPool,
    bus: &EventBus,
    seeds: &[LibrarySeed],
) -> Result<(), sqlx::Error> {
    for seed in seeds {
        let library = Library {
            slug: seed.slug.clone(),
            name: seed.name.clone(),
            folders: seed.folders.clone(),
            schedule: seed.schedule.clone(),
            description: seed.description.clone(),
        };
        match libraries::get(pool, &seed.slug).await? {
            Some(existing) if existing == library => {}
            Some(_) => events::update_library(pool, bus, &library).await?,
            None => events::create_library(pool, bus, &library).await?,
        }
    }
    Ok(())
}

async fn run_single_scan(ctx: IndexContext, slug: &str) {
    let library = match libraries::get(&ctx.db, slug).await {
        Ok(Some(library)) => library,
        Ok(None) => {
            tracing::error!("Unknown library: {slug}");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Failed to load library {slug}: {e}");
            std::process::exit(1);
        }
    };
    let indexer = LibraryIndexer::new(ctx, library).unwrap_or_else(|e| {
        tracing::error!("Invalid schedule for {slug}: {e}");
        std::process::exit(1);
    });

    tracing::info!("Running one-shot scan of {slug}...");
    match indexer.scan_once().await {
        Ok(outcome) => {
            if let Some(cleanup) = outcome.cleanup {
                match cleanup.await {
                    Ok(Ok(stats)) => tracing::info!(
                        "Cleanup removed {} media, {} duplicate records",
                        stats.media_removed.len(),
                        stats.duplicates_removed
                    ),
                    Ok(Err(_)) => {}
                    Err(e) => tracing::warn!("Cleanup task failed: {e}"),
                }
            }
            if outcome.stats.errors > 0 {
                std::process::exit(2);
            }
        }
        Err(e) => {
            tracing::error!("Scan failed: {e}");
            std::process::exit(1);
        }
    }
}
