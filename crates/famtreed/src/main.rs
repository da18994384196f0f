use anyhow::{Context, Result};
use famtree_core::PhotoStore;
use famtree_store::{Database, FsBlobStore, SqliteAccounts, SqlitePhotoRecords};
use famtree_vision::VisionClient;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod routes;
mod session;
mod state;

use config::Config;
use state::{AppState, UploadRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("famtreed starting");

    let config = Config::from_env()?;
    tracing::info!(
        bind = %config.bind,
        db = %config.db_path.display(),
        media = %config.media_dir.display(),
        vision_key = config.vision.api_key.is_some(),
        "configuration loaded"
    );

    let state = build_state(&config).await?;
    tokio::spawn(sweep_uploads(state.uploads.clone(), config.upload_idle));
    let app = routes::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "famtreed ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("famtreed shutting down");
    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    let db = Database::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    tokio::fs::create_dir_all(&config.media_dir)
        .await
        .with_context(|| format!("failed to create {}", config.media_dir.display()))?;

    let detector = Arc::new(VisionClient::new(config.vision.clone())?);
    let blobs = Arc::new(FsBlobStore::new(&config.media_dir, config.media_url()));
    let records = Arc::new(SqlitePhotoRecords::new(db.clone()));
    let store = Arc::new(PhotoStore::new(blobs, records));

    Ok(AppState {
        identity: Arc::new(SqliteAccounts::new(db)),
        detector: detector.clone(),
        store: store.clone(),
        uploads: Arc::new(UploadRegistry::new(
            detector,
            store,
            config.rejection_display,
        )),
        media_dir: config.media_dir.clone(),
        cookie_secure: config.cookie_secure,
    })
}

/// Periodically drop upload workflows left untouched for `idle`.
async fn sweep_uploads(uploads: Arc<UploadRegistry>, idle: Duration) {
    let period = (idle / 4).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        uploads.sweep(idle);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
