//! Repeated backups on a fixed cadence.
//!
//! A timer loop enqueues one run per tick into a single-slot queue drained by
//! one worker. A tick that finds the slot occupied is dropped, so runs never
//! overlap on the shared export path and at most one more run waits behind
//! the current one.

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Schedule;
use crate::errors::{AppError, Result};

/// Time from `now` until the next wall-clock occurrence of `at`.
pub fn delay_until(at: NaiveTime, now: DateTime<Local>) -> Duration {
    let now = now.naive_local();
    let mut target = now.date().and_time(at);
    if target <= now {
        target += TimeDelta::days(1);
    }
    (target - now).to_std().unwrap_or_default()
}

/// Source of tick instants for a schedule.
///
/// Fixed periods use an interval that skips ticks missed while the task was
/// busy instead of firing them back to back.
enum Ticks {
    Every(Interval),
    DailyAt { at: NaiveTime, fired: bool },
}

impl Ticks {
    fn new(schedule: Schedule) -> Self {
        match schedule {
            Schedule::Every(period) => {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Ticks::Every(interval)
            }
            Schedule::DailyAt(at) => Ticks::DailyAt { at, fired: false },
        }
    }

    async fn next(&mut self) {
        match self {
            Ticks::Every(interval) => {
                interval.tick().await;
            }
            Ticks::DailyAt { at, fired } => {
                // Measured from a minute ahead after a firing so the same occurrence is skipped.
                let delay = if *fired {
                    Duration::from_secs(60) + delay_until(*at, Local::now() + TimeDelta::minutes(1))
                } else {
                    delay_until(*at, Local::now())
                };
                tokio::time::sleep(delay).await;
                *fired = true;
            }
        }
    }
}

/// Invokes `job` on every tick of `schedule` until `shutdown` is cancelled or
/// a run fails with a process-fatal error. Returns the number of finished runs.
pub async fn run_forever<F, Fut>(schedule: Schedule, shutdown: CancellationToken, job: F) -> Result<u64>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let (tx, mut rx) = mpsc::channel::<u64>(1);

    let ticker = {
        let shutdown = shutdown.clone();
        async move {
            let mut ticks = Ticks::new(schedule);
            let mut tick: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticks.next() => {}
                    _ = shutdown.cancelled() => break,
                }
                tick += 1;
                match tx.try_send(tick) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("⏭ Tick {} skipped, previous backup still running", tick);
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    };

    let worker = {
        let shutdown = shutdown.clone();
        async move {
            let mut finished: u64 = 0;
            while let Some(tick) = rx.recv().await {
                if shutdown.is_cancelled() {
                    break;
                }
                info!("▶ Scheduled backup #{} starting", tick);
                match job().await {
                    Ok(()) => {}
                    Err(AppError::Cancelled(reason)) if shutdown.is_cancelled() => {
                        info!("Backup #{} interrupted by shutdown: {}", tick, reason);
                        break;
                    }
                    Err(e) if e.is_process_fatal() => {
                        error!("❌ Backup #{} failed fatally, stopping schedule: {}", tick, e);
                        return Err(e);
                    }
                    Err(e) => warn!("⚠️ Backup #{} failed: {}", tick, e),
                }
                finished += 1;
            }
            Ok(finished)
        }
    };

    info!("⏰ Backup schedule started: {:?}", schedule);
    tokio::pin!(worker);
    tokio::select! {
        result = &mut worker => return result,
        _ = ticker => {}
    }
    // The ticker only stops on shutdown; let the worker finish its current run.
    worker.await
}
