use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot reach dgraph server at {uri}: {reason}")]
    TriggerUnreachable { uri: String, reason: String },

    #[error("Export request rejected with HTTP status {0}")]
    TriggerStatus(u16),

    #[error("Export failed, unexpected response body: {0}")]
    ExportRejected(String),

    #[error("Export never appeared at {} after {attempts} checks", path.display())]
    ExportNotReady { path: PathBuf, attempts: u32 },

    #[error("Archive operation failed: {0}")]
    Archive(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Backup selection failed: {0}")]
    Selection(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Loader exited with {}: {output}", code.map_or_else(|| "signal".to_string(), |c| format!("code {}", c)))]
    Load { output: String, code: Option<i32> },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl AppError {
    /// Errors that must stop the whole process rather than just the current run.
    ///
    /// A rejected status code only aborts the run; an unexpected body, an
    /// unreachable server or an export that never materialized are
    /// operational alerts and end the schedule.
    pub fn is_process_fatal(&self) -> bool {
        matches!(
            self,
            AppError::TriggerUnreachable { .. }
                | AppError::ExportRejected(_)
                | AppError::ExportNotReady { .. }
                | AppError::Cancelled(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rejection_is_not_process_fatal() {
        assert!(!AppError::TriggerStatus(500).is_process_fatal());
        assert!(!AppError::Upload("denied".into()).is_process_fatal());
        assert!(!AppError::Archive("disk full".into()).is_process_fatal());
    }

    #[test]
    fn test_readiness_and_body_errors_are_process_fatal() {
        let not_ready = AppError::ExportNotReady {
            path: PathBuf::from("./export"),
            attempts: 10,
        };
        assert!(not_ready.is_process_fatal());
        assert!(AppError::ExportRejected("Error".into()).is_process_fatal());
        assert_eq!(
            not_ready.to_string(),
            "Export never appeared at ./export after 10 checks"
        );
    }

    #[test]
    fn test_load_error_surfaces_output() {
        let err = AppError::Load {
            output: "connection refused".into(),
            code: Some(1),
        };
        assert_eq!(err.to_string(), "Loader exited with code 1: connection refused");
    }
}
