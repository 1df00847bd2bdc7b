use anyhow::Context;
use positionledger::config::{Config, StorageBackend};
use positionledger::{api, db::init_db, LedgerService, Repository, Stores};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let stores = open_stores(&config).await?;
    let service = Arc::new(LedgerService::new(stores));

    if config.load_sample_data {
        let positions = service
            .load_sample_data()
            .await
            .context("Failed to load sample data")?;
        tracing::info!(positions = positions.len(), "Sample data loaded");
    }

    let app = api::create_router(api::AppState::new(service));

    let addr = SocketAddr::new(config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on exit");
            Ok(Stores::in_memory())
        }
        StorageBackend::Sqlite => {
            let path = config
                .database_path
                .as_deref()
                .context("DATABASE_PATH is required for sqlite storage")?;
            let pool = init_db(path)
                .await
                .context("Failed to initialize database")?;
            Ok(Stores::from_shared(Arc::new(Repository::new(pool))))
        }
    }
}
