pub mod api;
pub mod config;
pub mod core_state;
pub mod models;
pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core_state::{CoreState, StartupError};

/// Staged uploads older than this are crash leftovers.
const ORPHAN_UPLOAD_AGE: Duration = Duration::from_secs(60 * 60);

/// Start the service and block until shutdown.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    api::endpoints::upload::cleanup_orphaned_uploads(&config.upload_dir, ORPHAN_UPLOAD_AGE);

    let core = Arc::new(CoreState::from_config(config)?);
    api::serve(core).await?;
    Ok(())
}
