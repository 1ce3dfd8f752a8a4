pub(crate) mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::errors::Result;

pub use s3::S3Store;

/// One object in the backup bucket, as listed. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Bucket operations the pipelines depend on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every object in the bucket, in listing order.
    async fn list(&self) -> Result<Vec<RemoteObject>>;

    /// Uploads `file_path` under `key` and returns the object's location.
    async fn upload(&self, file_path: &Path, key: &str) -> Result<String>;

    /// Writes the object at `key` to `destination` and returns the byte count.
    async fn download(&self, key: &str, destination: &Path) -> Result<u64>;
}
