//! Maintenance Scheduler
//!
//! Steps the expiry sweep and the memory pressure check against the cache
//! clock. [`Maintenance::tick`] is the whole scheduler; [`spawn_maintenance`]
//! only drives it from a tokio interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{CacheCore, SharedCache};
use crate::config::CacheConfig;

/// Shortest period the driving loop polls at.
const MIN_POLL: Duration = Duration::from_millis(10);

// == Tick Report ==
/// What one tick did. `None` means the task was not due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub swept: Option<usize>,
    pub evicted: Option<usize>,
}

// == Maintenance ==
/// Two independent periodic tasks over one cache.
#[derive(Debug, Clone)]
pub struct Maintenance {
    sweep_interval: Duration,
    pressure_interval: Duration,
    next_sweep: Option<DateTime<Utc>>,
    next_pressure: Option<DateTime<Utc>>,
}

impl Maintenance {
    // == Constructor ==
    /// Both tasks are due on the first tick.
    pub fn new(sweep_interval: Duration, pressure_interval: Duration) -> Self {
        Self {
            sweep_interval,
            pressure_interval,
            next_sweep: None,
            next_pressure: None,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.sweep_interval, config.pressure_interval)
    }

    /// How often a driver should call [`Maintenance::tick`].
    pub fn poll_period(&self) -> Duration {
        self.sweep_interval
            .min(self.pressure_interval)
            .max(MIN_POLL)
    }

    // == Tick ==
    /// Runs every task due at `now` and schedules its next run.
    pub fn tick(&mut self, cache: &mut CacheCore, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        if due(self.next_sweep, now) {
            report.swept = Some(cache.purge_expired());
            self.next_sweep = Some(next_run(now, self.sweep_interval));
        }

        if due(self.next_pressure, now) {
            report.evicted = Some(cache.relieve_pressure());
            self.next_pressure = Some(next_run(now, self.pressure_interval));
        }

        report
    }
}

fn due(next: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    next.map_or(true, |at| now >= at)
}

fn next_run(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// == Maintenance Handle ==
/// Stop handle of a spawned maintenance loop. Dropping it also stops the loop.
#[derive(Debug)]
pub struct MaintenanceHandle {
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Asks the loop to stop after its current tick and waits for it.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.join).await {
            if !e.is_cancelled() {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }
    }

    /// Cancels the loop without waiting.
    pub fn abort(&self) {
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawns a task that ticks `maintenance` against `cache` until stopped.
///
/// # Example
/// ```ignore
/// let cache = CacheCore::new(config.clone()).into_shared();
/// let handle = spawn_maintenance(cache.clone(), Maintenance::from_config(&config));
/// // Later, during shutdown:
/// handle.stop().await;
/// ```
pub fn spawn_maintenance(cache: SharedCache, mut maintenance: Maintenance) -> MaintenanceHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let period = maintenance.poll_period();

    let join = tokio::spawn(async move {
        info!(
            "Starting cache maintenance (sweep every {:?}, pressure check every {:?})",
            maintenance.sweep_interval, maintenance.pressure_interval
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let report = {
                        let mut guard = cache.write().await;
                        let now = guard.now();
                        maintenance.tick(&mut guard, now)
                    };

                    debug!(?report, "Maintenance tick");
                    if let Some(n) = report.swept.filter(|n| *n > 0) {
                        info!("Expiry sweep removed {} entries", n);
                    }
                    if let Some(n) = report.evicted.filter(|n| *n > 0) {
                        info!("Pressure check evicted {} entries", n);
                    }
                }
            }
        }

        info!("Cache maintenance stopped");
    });

    MaintenanceHandle {
        stop: Some(stop_tx),
        join,
    }
}
