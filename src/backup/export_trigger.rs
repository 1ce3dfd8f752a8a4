// dgraph-backup/src/backup/export_trigger.rs
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::cli::ExportFormat;
use crate::config::DgraphConfig;
use crate::errors::{AppError, Result};

/// Marker Dgraph puts in the response body of an accepted export.
const SUCCESS_MARKER: &str = "Success";

/// A single export request issued against the database.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub request_uri: String,
    pub format: ExportFormat,
    pub issued_at: DateTime<Local>,
}

impl ExportJob {
    pub fn new(host: &str, format: ExportFormat) -> Self {
        Self {
            request_uri: export_request_uri(host, format),
            format,
            issued_at: Local::now(),
        }
    }
}

#[async_trait]
pub trait ExportTrigger: Send + Sync {
    /// Asks the database to start writing an export.
    async fn request_export(&self) -> Result<ExportJob>;
}

pub fn export_request_uri(host: &str, format: ExportFormat) -> String {
    format!(
        "{}/admin/export?format={}",
        host.trim_end_matches('/'),
        format.as_str()
    )
}

/// Interprets the trigger response.
///
/// A non-2xx status aborts the run. A 2xx status whose body lacks the
/// success marker means Dgraph refused or half-accepted the export.
pub fn classify_export_response(status: u16, body: &str) -> Result<()> {
    if !(200..300).contains(&status) {
        return Err(AppError::TriggerStatus(status));
    }
    if !body.contains(SUCCESS_MARKER) {
        return Err(AppError::ExportRejected(body.trim().to_string()));
    }
    Ok(())
}

pub struct HttpExportTrigger {
    client: reqwest::Client,
    host: String,
    format: ExportFormat,
}

impl HttpExportTrigger {
    pub fn new(config: &DgraphConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            host: config.host.clone(),
            format: config.format,
        })
    }
}

#[async_trait]
impl ExportTrigger for HttpExportTrigger {
    async fn request_export(&self) -> Result<ExportJob> {
        let job = ExportJob::new(&self.host, self.format);
        info!("📤 Requesting export from {}", job.request_uri);

        let unreachable = |e: reqwest::Error| AppError::TriggerUnreachable {
            uri: job.request_uri.clone(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(&job.request_uri)
            .send()
            .await
            .map_err(unreachable)?;
        let status = response.status().as_u16();
        debug!("Export endpoint answered HTTP {}", status);

        if !response.status().is_success() {
            return classify_export_response(status, "").map(|_| job);
        }

        let body = response.text().await.map_err(unreachable)?;
        classify_export_response(status, &body)?;

        info!("✓ Data export accepted by dgraph");
        Ok(job)
    }
}
