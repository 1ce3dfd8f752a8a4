//! Dgraph Backup/Restore Tool
//!
//! Triggers Dgraph exports, ships them to S3 and loads them back on demand.

// dgraph-backup/src/main.rs
mod backup;
mod cli;
mod config;
mod errors;
mod restore;
mod schedule;
mod storage;
mod utils;

use anyhow::{Context, Result};
use backup::{BackupReport, UploadStatus};
use clap::Parser;
use cli::{Cli, Command};
use config::AppConfig;
use std::process::ExitCode;

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    utils::init_tracing(cli.verbose);

    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::from_options(&cli.options).context("Invalid configuration")?;

    match cli.command {
        Command::BackupNow => {
            println!("🚀 Starting Backup Process...");
            let shutdown = utils::shutdown_on_ctrl_c();
            let report = backup::run_backup_flow(&app_config, shutdown)
                .await
                .context("Backup process failed")?;
            print_backup_report(&report);
        }
        Command::BackupCron => {
            println!("⏰ Starting Scheduled Backups ({:?})...", app_config.schedule);
            let shutdown = utils::shutdown_on_ctrl_c();
            let runs = schedule::run_forever(app_config.schedule, shutdown.clone(), || {
                let shutdown = shutdown.clone();
                let app_config = &app_config;
                async move {
                    let report = backup::run_backup_flow(app_config, shutdown).await?;
                    print_backup_report(&report);
                    Ok::<(), errors::AppError>(())
                }
            })
            .await
            .context("Backup schedule stopped")?;
            println!("Schedule stopped after {} run(s).", runs);
        }
        // Ctrl-C keeps its default behaviour here and ends the process.
        Command::Restore => {
            println!("🔄 Starting Restore Process...");
            let report = restore::run_restore_flow(&app_config)
                .await
                .context("Restore process failed")?;
            println!("{}", report.load.output);
            println!(
                "Restored {} ({} bytes) from {}",
                report.key,
                report.bytes_downloaded,
                report.extracted_path.display()
            );
        }
    }
    Ok(())
}

/// Upload failures are reported here rather than failing the command.
fn print_backup_report(report: &BackupReport) {
    match &report.upload {
        UploadStatus::Uploaded { location } => {
            println!("[DONE] {} uploaded to {}", report.archive_key, location);
        }
        UploadStatus::Failed { reason } => {
            eprintln!("❌ Failed to upload {}: {}", report.archive_key, reason);
        }
    }
    for error in &report.cleanup_errors {
        eprintln!("⚠️ Error while deleting side effects: {}", error);
    }
    if report.is_success() {
        println!("SUCCESS");
    } else {
        eprintln!("FAILURE");
    }
}
