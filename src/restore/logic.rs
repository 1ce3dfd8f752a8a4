use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::loader::{LoadOutput, Loader};
use super::selection::{self, SnapshotSelector};
use crate::backup::archive;
use crate::config::RestoreConfig;
use crate::errors::{AppError, Result};
use crate::storage::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub key: String,
    pub bytes_downloaded: u64,
    pub extracted_path: PathBuf,
    pub load: LoadOutput,
}

/// List → select → download → extract → load. Every step is fatal on failure.
pub struct RestorePipeline<'a, S, L> {
    config: &'a RestoreConfig,
    store: &'a S,
    loader: &'a L,
    selector: &'a dyn SnapshotSelector,
}

impl<'a, S, L> RestorePipeline<'a, S, L>
where
    S: RemoteStore,
    L: Loader,
{
    pub fn new(
        config: &'a RestoreConfig,
        store: &'a S,
        loader: &'a L,
        selector: &'a dyn SnapshotSelector,
    ) -> Self {
        Self {
            config,
            store,
            loader,
            selector,
        }
    }

    pub async fn run(&self) -> Result<RestoreReport> {
        let candidates = self.store.list().await?;
        info!("Found {} backup(s) in bucket", candidates.len());

        let key = selection::choose(&candidates, self.selector)?;
        info!("Selected backup {}", key);

        let download_path = self.config.download_dir.join(local_file_name(&key)?);
        let bytes_downloaded = self.store.download(&key, &download_path).await.map_err(|err| match err {
            download @ AppError::Download(_) => download,
            other => AppError::Download(other.to_string()),
        })?;
        info!("Downloaded {} ({} bytes)", download_path.display(), bytes_downloaded);

        let extracted_path = archive::extract_zip_archive(&download_path, &self.config.extract_dir)
            .map_err(|e| AppError::Archive(format!("{:#}", e)))?;

        let load = self
            .loader
            .load(&extracted_path)
            .await
            .map_err(|e| AppError::Load {
                output: format!("{:#}", e),
                code: None,
            })?;
        if !load.success {
            error!("❌ Loader failed on {}", extracted_path.display());
            return Err(AppError::Load {
                output: load.output,
                code: load.code,
            });
        }

        info!("✅ Restored {} from {}", key, extracted_path.display());
        Ok(RestoreReport {
            key,
            bytes_downloaded,
            extracted_path,
            load,
        })
    }
}

/// Local name for a downloaded key; nested keys keep only their last segment.
fn local_file_name(key: &str) -> Result<PathBuf> {
    Path::new(key)
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| AppError::Download(format!("object key {:?} has no file name", key)))
}
