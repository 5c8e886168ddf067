//! pace42 API — server entry point.
//!
//! Startup sequence:
//!   1. Load `../config/.env` and `.env` (if present)
//!   2. Init logger at default level
//!   3. Load config (placeholders resolved, required fields checked)
//!   4. Switch logger to the configured level
//!   5. Serve until Ctrl-C

use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pace42_api::config::{self, ConfigLoader};
use pace42_api::error::AppError;
use pace42_api::{logger, server};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let env_files = config::load_env_files();

    // Bootstrap logger at "info" before config is available.
    let log = logger::init("info", false)?;
    for path in &env_files {
        debug!(path = %path.display(), "env file loaded");
    }

    let loader = ConfigLoader::from_env();
    let config = loader.load()?;
    log.set_level(&config.app.log_level)?;

    info!(
        app = %config.app.name,
        version = %config.app.version,
        environment = %config.app.environment,
        source = %config.source_path().display(),
        "config loaded"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, shutting down");
                signal_token.cancel();
            }
            Err(e) => warn!("cannot listen for ctrl-c: {e}"),
        }
    });

    server::serve(config, Router::new(), shutdown).await
}
