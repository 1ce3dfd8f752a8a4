use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::archive::{self, BackupArchive};
use super::export_trigger::ExportTrigger;
use super::readiness::{ExportProbe, ReadinessPoller};
use crate::config::BackupConfig;
use crate::errors::{AppError, Result};
use crate::storage::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Uploaded { location: String },
    Failed { reason: String },
}

/// Outcome of a backup run that got as far as archiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub archive_key: String,
    pub upload: UploadStatus,
    pub cleanup_errors: Vec<String>,
}

impl BackupReport {
    pub fn is_success(&self) -> bool {
        matches!(self.upload, UploadStatus::Uploaded { .. })
    }
}

/// Trigger → wait → archive → upload → cleanup, as one unit of work.
///
/// Not reentrant: two runs would share the export path and archive name.
pub struct BackupPipeline<'a, T, S, P> {
    config: &'a BackupConfig,
    trigger: &'a T,
    store: &'a S,
    probe: &'a P,
    shutdown: CancellationToken,
}

impl<'a, T, S, P> BackupPipeline<'a, T, S, P>
where
    T: ExportTrigger,
    S: RemoteStore,
    P: ExportProbe,
{
    pub fn new(
        config: &'a BackupConfig,
        trigger: &'a T,
        store: &'a S,
        probe: &'a P,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            trigger,
            store,
            probe,
            shutdown,
        }
    }

    pub async fn run(&self) -> Result<BackupReport> {
        // Nothing exists on disk yet if the trigger fails, so no cleanup.
        let requested = tokio::select! {
            result = self.trigger.request_export() => result,
            _ = self.shutdown.cancelled() => {
                Err(AppError::Cancelled("shutdown while requesting export".into()))
            }
        };
        let job = requested.inspect_err(|e| {
            error!("❌ Export request failed: {}", e);
        })?;
        info!(
            "Export job ({}) issued at {} via {}",
            job.format.as_str(),
            job.issued_at,
            job.request_uri
        );

        let export_path = self.config.export_path.as_path();
        let readiness = ReadinessPoller::new(self.probe, self.config.poll, self.shutdown.clone())
            .wait_until_ready(export_path)
            .await
            .inspect_err(|e| error!("❌ {}", e))?;
        info!(
            "Waited {:?} over {} check(s) for the export",
            readiness.delays.iter().sum::<Duration>(),
            readiness.checks
        );

        let archive = match archive::create_zip_archive(
            export_path,
            &self.config.archive_dir,
            &self.config.file_prefix,
        ) {
            Ok(archive) => archive,
            Err(e) => {
                error!("❌ Failed to zip export: {:#}", e);
                self.clean_up(None).await;
                return Err(AppError::Archive(format!("{:#}", e)));
            }
        };

        let key = archive.key();
        debug!(
            "Archive {} ({} prefix) stamped {}",
            key,
            archive.prefix,
            archive.timestamp
        );
        let uploaded = tokio::select! {
            result = self.store.upload(&archive.local_path, &key) => result,
            _ = self.shutdown.cancelled() => {
                Err(AppError::Cancelled(format!("shutdown while uploading {}", key)))
            }
        };
        let upload = match uploaded {
            Ok(location) => {
                info!("[DONE] Uploaded to {}", location);
                UploadStatus::Uploaded { location }
            }
            Err(e) => {
                error!("❌ Failed to upload {}: {}", key, e);
                UploadStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let cleanup_errors = self.clean_up(Some(&archive)).await;

        let report = BackupReport {
            archive_key: key,
            upload,
            cleanup_errors,
        };
        if report.is_success() {
            info!("✅ SUCCESS: backup {} shipped", report.archive_key);
        } else {
            error!("❌ FAILURE: backup {} was not shipped", report.archive_key);
        }
        Ok(report)
    }

    /// Removes the archive and the export directory. Errors are only reported.
    async fn clean_up(&self, archive: Option<&BackupArchive>) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(archive) = archive {
            if let Err(e) = tokio::fs::remove_file(&archive.local_path).await {
                errors.push(format!(
                    "Failed to remove archive {}: {}",
                    archive.local_path.display(),
                    e
                ));
            }
        }
        if let Err(e) = remove_export_dir(&self.config.export_path).await {
            errors.push(format!(
                "Failed to remove export directory {}: {}",
                self.config.export_path.display(),
                e
            ));
        }

        for e in &errors {
            warn!("⚠️ Error while deleting side effects: {}", e);
        }
        errors
    }
}

async fn remove_export_dir(path: &Path) -> std::io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}
