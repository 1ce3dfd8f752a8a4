// dgraph-backup/src/storage/s3.rs
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::DateTime;
use s3::config::Region;
use s3::primitives::ByteStream;
use s3::types::{CompletedMultipartUpload, CompletedPart};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{RemoteObject, RemoteStore};
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};

/// S3 or S3-compatible bucket holding the backup archives.
pub struct S3Store {
    client: s3::Client,
    bucket_name: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Store {
    pub async fn connect(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // Path-style addressing for S3-compatible services behind a custom endpoint.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint_url.is_some())
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
            bucket_name: config.bucket_name.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
        }
    }

    fn location(&self, key: &str) -> String {
        object_location(&self.bucket_name, &self.region, self.endpoint_url.as_deref(), key)
    }

    async fn put_single(&self, file_path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(file_path)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", file_path.display()))
            .map_err(|e| AppError::Upload(format!("{:#}", e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::Upload(format!(
                    "Failed to upload {} to bucket {} with key {}: {}",
                    file_path.display(),
                    self.bucket_name,
                    key,
                    s3::error::DisplayErrorContext(e)
                ))
            })?;
        Ok(())
    }

    async fn put_multipart(&self, file_path: &Path, key: &str, part_size: u64) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::Upload(format!(
                    "Failed to create multipart upload for {}: {}",
                    key,
                    s3::error::DisplayErrorContext(e)
                ))
            })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| AppError::Upload(format!("No upload ID returned for {}", key)))?
            .to_string();

        match self.send_parts(file_path, key, &upload_id, part_size).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket_name)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::Upload(format!(
                            "Failed to complete multipart upload of {}: {}",
                            key,
                            s3::error::DisplayErrorContext(e)
                        ))
                    })?;
                Ok(())
            }
            Err(e) => {
                // Abandoned parts keep accruing storage until aborted.
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket_name)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "Failed to abort multipart upload {} of {}: {}",
                        upload_id,
                        key,
                        s3::error::DisplayErrorContext(abort)
                    );
                }
                Err(e)
            }
        }
    }

    async fn send_parts(
        &self,
        file_path: &Path,
        key: &str,
        upload_id: &str,
        part_size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = File::open(file_path)
            .await
            .map_err(|e| AppError::Upload(format!("Failed to open {}: {}", file_path.display(), e)))?;
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut chunk = Vec::new();
            (&mut file)
                .take(part_size)
                .read_to_end(&mut chunk)
                .await
                .map_err(|e| AppError::Upload(format!("Failed to read {}: {}", file_path.display(), e)))?;
            if chunk.is_empty() {
                break;
            }

            debug!("Uploading part {} of {} ({} bytes)", part_number, key, chunk.len());
            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket_name)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| {
                    AppError::Upload(format!(
                        "Failed to upload part {} of {}: {}",
                        part_number,
                        key,
                        s3::error::DisplayErrorContext(e)
                    ))
                })?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(response.e_tag().unwrap_or_default())
                    .build(),
            );
            part_number += 1;
        }
        Ok(parts)
    }
}

const MIB: u64 = 1024 * 1024;
/// Archives at or above this size go up in parts.
const MULTIPART_THRESHOLD: u64 = 100 * MIB;
const DEFAULT_PART_SIZE: u64 = 64 * MIB;
const MAX_PARTS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadPlan {
    Single,
    Multipart { part_size: u64, parts: u64 },
}

/// Chooses between one `PutObject` and a multipart upload for `len` bytes.
///
/// Parts grow past the default size when needed to stay within S3's part limit.
pub(crate) fn plan_upload(len: u64) -> UploadPlan {
    if len < MULTIPART_THRESHOLD {
        return UploadPlan::Single;
    }
    let part_size = DEFAULT_PART_SIZE.max(len.div_ceil(MAX_PARTS));
    UploadPlan::Multipart {
        part_size,
        parts: len.div_ceil(part_size),
    }
}

pub(crate) fn object_location(bucket: &str, region: &str, endpoint: Option<&str>, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn list(&self) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    AppError::Storage(format!(
                        "Failed to list bucket {}: {}",
                        self.bucket_name,
                        s3::error::DisplayErrorContext(e)
                    ))
                })?;

            objects.extend(response.contents().iter().filter_map(|object| {
                object.key().map(|key| RemoteObject {
                    key: key.to_string(),
                    size_bytes: object.size().unwrap_or_default().max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects in bucket {}", objects.len(), self.bucket_name);
        Ok(objects)
    }

    async fn upload(&self, file_path: &Path, key: &str) -> Result<String> {
        info!(
            "☁ Uploading {} to bucket {} with key {}",
            file_path.display(),
            self.bucket_name,
            key
        );

        let len = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| AppError::Upload(format!("Failed to stat {}: {}", file_path.display(), e)))?
            .len();

        match plan_upload(len) {
            UploadPlan::Single => self.put_single(file_path, key).await?,
            UploadPlan::Multipart { part_size, parts } => {
                info!("Archive is {} bytes, uploading in {} parts", len, parts);
                self.put_multipart(file_path, key, part_size).await?
            }
        }

        Ok(self.location(key))
    }

    async fn download(&self, key: &str, destination: &Path) -> Result<u64> {
        info!(
            "⬇ Downloading s3://{}/{} to {}",
            self.bucket_name,
            key,
            destination.display()
        );

        if let Some(parent_dir) = destination.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                tokio::fs::create_dir_all(parent_dir).await?;
            }
        }

        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::Download(format!(
                    "Failed to get object s3://{}/{}: {}",
                    self.bucket_name,
                    key,
                    s3::error::DisplayErrorContext(e)
                ))
            })?;

        let mut output_file = File::create(destination).await.map_err(|e| {
            AppError::Download(format!(
                "Failed to create destination file {}: {}",
                destination.display(),
                e
            ))
        })?;

        let mut total_bytes: u64 = 0;
        while let Some(chunk) = object.body.try_next().await.map_err(|e| {
            AppError::Download(format!("Failed to read body of s3://{}/{}: {}", self.bucket_name, key, e))
        })? {
            output_file.write_all(&chunk).await?;
            total_bytes += chunk.len() as u64;
        }
        output_file.flush().await?;

        info!("✓ Downloaded {} bytes to {}", total_bytes, destination.display());
        Ok(total_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_archives_use_single_put() {
        assert_eq!(plan_upload(0), UploadPlan::Single);
        assert_eq!(plan_upload(MULTIPART_THRESHOLD - 1), UploadPlan::Single);
    }

    #[test]
    fn test_large_archives_use_multipart() {
        assert_eq!(
            plan_upload(MULTIPART_THRESHOLD),
            UploadPlan::Multipart {
                part_size: DEFAULT_PART_SIZE,
                parts: 2,
            }
        );
        // Past the 5 GiB single-request cap.
        let six_gib = 6 * 1024 * MIB;
        assert_eq!(
            plan_upload(six_gib),
            UploadPlan::Multipart {
                part_size: DEFAULT_PART_SIZE,
                parts: 96,
            }
        );
    }

    #[test]
    fn test_huge_archives_grow_parts_to_stay_under_part_limit() {
        let len = 1024 * 1024 * MIB;
        match plan_upload(len) {
            UploadPlan::Multipart { part_size, parts } => {
                assert!(part_size > DEFAULT_PART_SIZE);
                assert!(parts <= MAX_PARTS);
                assert!(part_size * parts >= len);
            }
            UploadPlan::Single => panic!("1 TiB must be uploaded in parts"),
        }
    }

    #[test]
    fn test_aws_location() {
        assert_eq!(
            object_location("dgraph-backup", "ap-northeast-2", None, "b-1.zip"),
            "https://dgraph-backup.s3.ap-northeast-2.amazonaws.com/b-1.zip"
        );
    }

    #[test]
    fn test_custom_endpoint_location() {
        assert_eq!(
            object_location(
                "backups",
                "nyc3",
                Some("https://nyc3.digitaloceanspaces.com/"),
                "b-1.zip"
            ),
            "https://nyc3.digitaloceanspaces.com/backups/b-1.zip"
        );
    }
}
