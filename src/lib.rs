pub mod api;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod core_state;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod patients;
pub mod report;
pub mod scans;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),
    #[error(transparent)]
    Server(#[from] api::ServerError),
}

/// Load configuration from the environment and serve until Ctrl-C.
///
/// State is built before the async runtime starts: the classifier's
/// blocking HTTP client must not be created or dropped inside it.
pub fn run() -> Result<(), StartupError> {
    init_tracing();
    let config = config::AppConfig::from_env();

    tracing::info!(
        "{} starting v{} (data dir {})",
        config::APP_NAME,
        config::APP_VERSION,
        config.data_dir.display()
    );

    let core = Arc::new(core_state::CoreState::new(config)?);
    if core.seed_admin()? {
        tracing::info!("Initial admin account created");
    }
    let purged = core.purge_expired_sessions()?;
    if purged > 0 {
        tracing::info!(purged, "Expired sessions removed");
    }

    let runtime = tokio::runtime::Runtime::new().map_err(StartupError::Runtime)?;
    let served = runtime.block_on(api::server::serve_until_ctrl_c(Arc::clone(&core)));
    // The last `CoreState` reference must drop outside the runtime.
    drop(runtime);
    drop(core);
    served?;
    Ok(())
}
