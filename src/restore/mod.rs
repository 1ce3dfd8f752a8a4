mod logic;
pub(crate) mod loader;
pub(crate) mod selection;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::storage::S3Store;
use loader::DgraphLiveLoader;
use selection::TerminalSelector;

pub use logic::RestoreReport;
use logic::RestorePipeline;

/// Public entry point for the restore process.
///
/// The loader binary is located before anything is downloaded.
pub async fn run_restore_flow(app_config: &AppConfig) -> Result<RestoreReport> {
    let loader = DgraphLiveLoader::locate(&app_config.restore.loader_bin)
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;
    let store = S3Store::connect(&app_config.storage).await;

    RestorePipeline::new(&app_config.restore, &store, &loader, &TerminalSelector)
        .run()
        .await
}
