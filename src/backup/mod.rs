mod logic;
pub(crate) mod archive;
pub(crate) mod export_trigger;
pub(crate) mod readiness;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::storage::S3Store;
use export_trigger::HttpExportTrigger;
use readiness::FsProbe;

pub use logic::{BackupPipeline, BackupReport, UploadStatus};

/// Wires the production trigger, store and probe into one backup run.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    shutdown: CancellationToken,
) -> Result<BackupReport> {
    let trigger = HttpExportTrigger::new(&app_config.dgraph)
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {:#}", e)))?;
    let store = S3Store::connect(&app_config.storage).await;

    BackupPipeline::new(&app_config.backup, &trigger, &store, &FsProbe, shutdown)
        .run()
        .await
}
