//! Waiting for the export directory to materialize on disk.
//!
//! Dgraph writes its export asynchronously after the trigger request returns,
//! so the only signal of completion is the export path appearing. The wait
//! uses exponential backoff bounded by a ceiling and a maximum check count.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::errors::{AppError, Result};

/// Existence check for the export path, so tests can script its appearance.
#[async_trait]
pub trait ExportProbe: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
}

pub struct FsProbe;

#[async_trait]
impl ExportProbe for FsProbe {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// Doubling backoff capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            current_delay: config.min_delay.min(config.max_delay),
            attempt: 0,
        }
    }

    /// Returns the current delay and doubles it for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.current_delay = self.current_delay.saturating_mul(2).min(self.max_delay);
        self.attempt += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.current_delay = self.min_delay.min(self.max_delay);
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// What a finished wait looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    pub checks: u32,
    pub delays: Vec<Duration>,
}

pub struct ReadinessPoller<'a, P: ExportProbe> {
    probe: &'a P,
    config: PollConfig,
    shutdown: CancellationToken,
}

impl<'a, P: ExportProbe> ReadinessPoller<'a, P> {
    pub fn new(probe: &'a P, config: PollConfig, shutdown: CancellationToken) -> Self {
        Self {
            probe,
            config,
            shutdown,
        }
    }

    /// Polls `path` until it exists or `max_attempts` checks have failed.
    ///
    /// No sleep follows the final failed check. Cancelling the shutdown token
    /// interrupts a pending sleep.
    pub async fn wait_until_ready(&self, path: &Path) -> Result<ReadinessReport> {
        let mut backoff = ExponentialBackoff::new(&self.config);
        let mut delays = Vec::new();
        let mut checks = 0;

        loop {
            checks += 1;
            if self.probe.exists(path).await {
                info!("📂 Export ready at {} after {} check(s)", path.display(), checks);
                backoff.reset();
                return Ok(ReadinessReport { checks, delays });
            }

            if checks >= self.config.max_attempts {
                warn!(
                    "❌ No export at {} after {} checks, giving up",
                    path.display(),
                    checks
                );
                return Err(AppError::ExportNotReady {
                    path: PathBuf::from(path),
                    attempts: checks,
                });
            }

            let delay = backoff.next_delay();
            info!("⏳ Export is not ready yet, retrying in {:?}", delay);
            debug!(
                "Readiness check {}/{} failed for {} (backoff attempt {})",
                checks,
                self.config.max_attempts,
                path.display(),
                backoff.attempt()
            );
            delays.push(delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    return Err(AppError::Cancelled(format!(
                        "shutdown while waiting for export at {}",
                        path.display()
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports the path missing for the first `missing_checks` calls.
    pub(crate) struct ScriptedProbe {
        pub missing_checks: u32,
        pub calls: AtomicU32,
    }

    impl ScriptedProbe {
        pub(crate) fn appearing_after(missing_checks: u32) -> Self {
            Self {
                missing_checks,
                calls: AtomicU32::new(0),
            }
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExportProbe for ScriptedProbe {
        async fn exists(&self, _path: &Path) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            call > self.missing_checks
        }
    }

    fn poll_config(max_attempts: u32) -> PollConfig {
        PollConfig {
            max_attempts,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_backoff_doubles_until_ceiling() {
        let mut backoff = ExponentialBackoff::new(&poll_config(10));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(&poll_config(10));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_three_missing_checks() {
        let probe = ScriptedProbe::appearing_after(3);
        let poller = ReadinessPoller::new(&probe, poll_config(10), CancellationToken::new());

        let report = poller.wait_until_ready(Path::new("./export")).await.unwrap();

        assert_eq!(report.checks, 4);
        assert_eq!(
            report.delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let probe = ScriptedProbe::appearing_after(u32::MAX);
        let poller = ReadinessPoller::new(&probe, poll_config(10), CancellationToken::new());

        let err = poller.wait_until_ready(Path::new("./export")).await.unwrap_err();

        assert!(matches!(err, AppError::ExportNotReady { attempts: 10, .. }));
        assert_eq!(probe.calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_never_decrease_and_stay_capped() {
        for max_attempts in 1..=12 {
            let probe = ScriptedProbe::appearing_after(max_attempts - 1);
            let poller =
                ReadinessPoller::new(&probe, poll_config(max_attempts), CancellationToken::new());
            let report = poller.wait_until_ready(Path::new("./export")).await.unwrap();

            assert!(report.checks <= max_attempts);
            assert!(report.delays.windows(2).all(|w| w[0] <= w[1]));
            assert!(report.delays.iter().all(|d| *d <= Duration::from_millis(500)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let probe = ScriptedProbe::appearing_after(u32::MAX);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let poller = ReadinessPoller::new(&probe, poll_config(10), shutdown);

        let err = poller.wait_until_ready(Path::new("./export")).await.unwrap_err();

        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(probe.calls(), 1);
    }
}
