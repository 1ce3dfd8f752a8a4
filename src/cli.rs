use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "dgraph-backup",
    version,
    about = "Export Dgraph snapshots to S3 and restore them",
    after_help = "\
Every option can also be supplied through its environment variable.
A .env file in the working directory is loaded before parsing."
)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub options: Options,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Export, archive and upload a snapshot once
    BackupNow,
    /// Run the backup on a schedule until interrupted
    BackupCron,
    /// Pick a snapshot from the bucket and load it back into Dgraph
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Rdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Rdf => "rdf",
        }
    }
}

/// Raw option values, validated into [`crate::config::AppConfig`] before use.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct Options {
    /// Export format requested from Dgraph
    #[arg(long, env = "EXPORT_FORMAT", value_enum, default_value = "json", global = true)]
    pub format: ExportFormat,

    #[arg(long, env = "AWS_BUCKET", default_value = "dgraph-backup", global = true)]
    pub aws_bucket: String,

    #[arg(long, env = "AWS_REGION", default_value = "ap-northeast-2", global = true)]
    pub aws_region: String,

    /// S3-compatible endpoint, e.g. https://nyc3.digitaloceanspaces.com
    #[arg(long, env = "AWS_ENDPOINT", global = true)]
    pub aws_endpoint: Option<String>,

    #[arg(long, env = "AWS_ACCESS_KEY", hide_env_values = true, global = true)]
    pub aws_key: Option<String>,

    #[arg(long, env = "AWS_ACCESS_SECRET", hide_env_values = true, global = true)]
    pub aws_secret: Option<String>,

    /// Exp: http://localhost:8080
    #[arg(long, env = "DGRAPH_HOST", default_value = "http://localhost:8080", global = true)]
    pub dgraph_host: String,

    /// Timeout for the export request; none by default
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Backup file prefix <prefix>-<timestamp>.zip
    #[arg(long, env = "FILE_PREFIX", default_value = "dgraph-backup", global = true)]
    pub file_prefix: String,

    /// Directory Dgraph writes its export into
    #[arg(long, env = "EXPORT_PATH", default_value = "./export", global = true)]
    pub export_path: PathBuf,

    /// Directory the zip archive is written to before upload
    #[arg(long, env = "ARCHIVE_DIR", default_value = ".", global = true)]
    pub archive_dir: PathBuf,

    /// Existence checks before giving up on the export
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 10, global = true)]
    pub max_attempts: u32,

    #[arg(long, env = "POLL_MIN_DELAY_MS", default_value_t = 100, global = true)]
    pub poll_min_delay_ms: u64,

    #[arg(long, env = "POLL_MAX_DELAY_SECS", default_value_t = 300, global = true)]
    pub poll_max_delay_secs: u64,

    #[arg(long, env = "CRON_EVERY_MINUTE", default_value_t = 1, global = true)]
    pub cron_every_minute: u64,

    /// Run once a day at HH:MM local time instead of every N minutes
    #[arg(long, env = "DAILY_AT", global = true)]
    pub daily_at: Option<String>,

    /// Directory a downloaded archive is extracted into
    #[arg(long, env = "RESTORE_DIR", default_value = "data", global = true)]
    pub restore_dir: PathBuf,

    /// Dgraph binary used for `live` loading
    #[arg(long, env = "DGRAPH_BIN", default_value = "dgraph", global = true)]
    pub dgraph_bin: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_flag_table() {
        let cli = Cli::try_parse_from([
            "dgraph-backup",
            "backup-now",
            "--aws-key",
            "key",
            "--aws-secret",
            "secret",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::BackupNow));
        assert_eq!(cli.options.format, ExportFormat::Json);
        assert_eq!(cli.options.export_path, PathBuf::from("./export"));
        assert_eq!(cli.options.max_attempts, 10);
        assert_eq!(cli.options.cron_every_minute, 1);
        assert_eq!(cli.options.aws_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_rejects_unknown_format() {
        let parsed = Cli::try_parse_from(["dgraph-backup", "restore", "--format", "csv"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_rdf_format_string() {
        assert_eq!(ExportFormat::Rdf.as_str(), "rdf");
    }
}
