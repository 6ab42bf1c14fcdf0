use std::sync::Arc;

use anyhow::{Context, Result};
use muster_core::FaceVerifier;
use muster_store::{FsObjectStore, SqliteDirectory, SqliteLedger};
use musterd::backend::HttpBiometrics;
use musterd::config::Config;
use musterd::http::{self, AppState};
use musterd::session::SessionManager;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("musterd starting");

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("create data dir {}", config.data_dir.display()))?;

    let directory = Arc::new(SqliteDirectory::open(&config.db_path)?);
    let ledger = Arc::new(SqliteLedger::open(&config.db_path)?);
    let objects = Arc::new(FsObjectStore::new(
        config.blob_dir.clone(),
        config.public_base_url.clone(),
    )?);
    tracing::info!(
        db = %config.db_path.display(),
        blobs = %config.blob_dir.display(),
        "stores opened"
    );

    let biometrics = Arc::new(HttpBiometrics::new(config.biometric_url.clone()));
    tracing::info!(endpoint = %config.biometric_url, "biometric backend configured");

    let verifier = FaceVerifier::new(biometrics, config.match_policy());
    let sessions = Arc::new(SessionManager::new(
        objects,
        directory,
        ledger,
        verifier,
        config.temp_dir.clone(),
    ));

    if config.admin_token.is_none() {
        tracing::warn!("MUSTER_ADMIN_TOKEN unset; admin routes will refuse all requests");
    }

    let state = Arc::new(AppState {
        sessions,
        admin_token: config.admin_token.clone(),
    });
    let app = http::create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "musterd ready");

    axum::serve(listener, app).await?;
    Ok(())
}
