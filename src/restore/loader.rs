// dgraph-backup/src/restore/loader.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;
use which::which;

/// Result of one bulk-load invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutput {
    /// stdout followed by stderr.
    pub output: String,
    pub code: Option<i32>,
    pub success: bool,
}

/// Loads an extracted export back into the database.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, export_dir: &Path) -> Result<LoadOutput>;
}

/// Runs `dgraph live -f <export_dir>`.
#[derive(Debug)]
pub struct DgraphLiveLoader {
    executable: PathBuf,
}

impl DgraphLiveLoader {
    /// Finds the dgraph executable in the system PATH.
    pub fn locate(binary: &str) -> Result<Self> {
        let executable = which(binary).with_context(|| {
            format!(
                "{} executable not found in PATH. Please ensure Dgraph is installed and in your PATH.",
                binary
            )
        })?;
        Ok(Self { executable })
    }
}

#[async_trait]
impl Loader for DgraphLiveLoader {
    async fn load(&self, export_dir: &Path) -> Result<LoadOutput> {
        info!(
            "🔄 Running {} live -f {}",
            self.executable.display(),
            export_dir.display()
        );
        let output = Command::new(&self.executable)
            .arg("live")
            .arg("-f")
            .arg(export_dir)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.executable.display()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(LoadOutput {
            output: combined,
            code: output.status.code(),
            success: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_missing_binary() {
        let err = DgraphLiveLoader::locate("definitely-not-a-dgraph-binary").unwrap_err();
        assert!(err.to_string().contains("not found in PATH"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_combines_output_and_exit_status() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("fake-dgraph");
        std::fs::write(&script, "#!/bin/sh\necho \"loading $3\"\necho boom >&2\nexit 3\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let loader = DgraphLiveLoader { executable: script };
        let result = loader.load(Path::new("data/export")).await?;

        assert_eq!(result.output, "loading data/export\nboom\n");
        assert_eq!(result.code, Some(3));
        assert!(!result.success);
        Ok(())
    }
}
