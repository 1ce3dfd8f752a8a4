// dgraph-backup/src/config/mod.rs
use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::cli::{ExportFormat, Options};

#[derive(Debug, Clone)]
pub struct DgraphConfig {
    pub host: String,
    pub format: ExportFormat,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
}

/// Backoff bounds for the readiness poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub export_path: PathBuf,
    pub archive_dir: PathBuf,
    pub file_prefix: String,
    pub poll: PollConfig,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub download_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub loader_bin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    DailyAt(NaiveTime),
}

/// Fully resolved settings, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dgraph: DgraphConfig,
    pub storage: StorageConfig,
    pub backup: BackupConfig,
    pub restore: RestoreConfig,
    pub schedule: Schedule,
}

impl AppConfig {
    pub(crate) fn from_options(opts: &Options) -> Result<Self> {
        Ok(AppConfig {
            dgraph: load_dgraph_config(opts)?,
            storage: load_storage_config(opts)?,
            backup: load_backup_config(opts)?,
            restore: RestoreConfig {
                download_dir: PathBuf::from("."),
                extract_dir: opts.restore_dir.clone(),
                loader_bin: opts.dgraph_bin.clone(),
            },
            schedule: load_schedule(opts)?,
        })
    }
}

fn load_dgraph_config(opts: &Options) -> Result<DgraphConfig> {
    let host = opts.dgraph_host.trim().trim_end_matches('/').to_string();
    let parsed = Url::parse(&host)
        .with_context(|| format!("dgraph-host is not a valid URL: {}", opts.dgraph_host))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("dgraph-host must use http or https, got {}", parsed.scheme());
    }

    Ok(DgraphConfig {
        host,
        format: opts.format,
        request_timeout: opts.request_timeout_secs.map(Duration::from_secs),
    })
}

fn load_storage_config(opts: &Options) -> Result<StorageConfig> {
    let access_key_id = required(&opts.aws_key, "aws-key (AWS_ACCESS_KEY)")?;
    let secret_access_key = required(&opts.aws_secret, "aws-secret (AWS_ACCESS_SECRET)")?;
    if opts.aws_bucket.trim().is_empty() {
        anyhow::bail!("aws-bucket cannot be empty.");
    }
    if opts.aws_region.trim().is_empty() {
        anyhow::bail!("aws-region cannot be empty.");
    }

    Ok(StorageConfig {
        bucket_name: opts.aws_bucket.trim().to_string(),
        region: opts.aws_region.trim().to_string(),
        access_key_id,
        secret_access_key,
        endpoint_url: opts.aws_endpoint.clone().filter(|s| !s.trim().is_empty()),
    })
}

fn load_backup_config(opts: &Options) -> Result<BackupConfig> {
    if opts.export_path.as_os_str().is_empty() {
        anyhow::bail!("export-path cannot be empty.");
    }
    if opts.file_prefix.trim().is_empty() || opts.file_prefix.contains('/') {
        anyhow::bail!("file-prefix must be a non-empty file name fragment, got {:?}", opts.file_prefix);
    }
    if opts.max_attempts == 0 {
        anyhow::bail!("max-attempts must be at least 1.");
    }

    let min_delay = Duration::from_millis(opts.poll_min_delay_ms);
    let max_delay = Duration::from_secs(opts.poll_max_delay_secs);
    if min_delay.is_zero() || min_delay > max_delay {
        anyhow::bail!(
            "poll delays must satisfy 0 < min ({:?}) <= max ({:?})",
            min_delay,
            max_delay
        );
    }

    Ok(BackupConfig {
        export_path: opts.export_path.clone(),
        archive_dir: opts.archive_dir.clone(),
        file_prefix: opts.file_prefix.trim().to_string(),
        poll: PollConfig {
            max_attempts: opts.max_attempts,
            min_delay,
            max_delay,
        },
    })
}

fn load_schedule(opts: &Options) -> Result<Schedule> {
    if let Some(at) = opts.daily_at.as_deref().filter(|s| !s.trim().is_empty()) {
        let time = NaiveTime::parse_from_str(at.trim(), "%H:%M")
            .with_context(|| format!("daily-at must be HH:MM, got {:?}", at))?;
        return Ok(Schedule::DailyAt(time));
    }
    if opts.cron_every_minute == 0 {
        anyhow::bail!("cron-every-minute must be at least 1.");
    }
    Ok(Schedule::Every(Duration::from_secs(opts.cron_every_minute * 60)))
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .with_context(|| format!("{} must be set", name))
}
