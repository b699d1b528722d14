//! Periodic roster sweep.
//!
//! Triggers every roster panel once per interval until shut down. A panel
//! that is still busy from a previous run is skipped, not queued. Each sweep
//! ends with a reconcile so a lost execution result is resolved while the
//! process keeps running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use solarsage_core::ConfigError;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::orchestrator::{Orchestrator, TriggerRequest};

/// Counters for sweep activity since startup.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub sweeps: AtomicU64,
    pub runs_completed: AtomicU64,
    pub runs_skipped_busy: AtomicU64,
    pub runs_failed: AtomicU64,
    pub runs_reconciled: AtomicU64,
}

impl SweepMetrics {
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_skipped_busy: self.runs_skipped_busy.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_reconciled: self.runs_reconciled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SweepMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSnapshot {
    pub sweeps: u64,
    pub runs_completed: u64,
    pub runs_skipped_busy: u64,
    pub runs_failed: u64,
    pub runs_reconciled: u64,
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    metrics: Arc<SweepMetrics>,
}

impl Scheduler {
    /// Fails with [`ConfigError::InvalidValue`] for a zero interval.
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "schedule_interval_secs".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(Self {
            orchestrator,
            interval,
            metrics: Arc::new(SweepMetrics::default()),
        })
    }

    pub fn metrics(&self) -> Arc<SweepMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Trigger every roster panel once, concurrently, then reconcile.
    pub async fn sweep_once(&self) -> SweepSnapshot {
        let before = self.metrics.snapshot();
        let mut tasks = tokio::task::JoinSet::new();
        for panel_id in self.orchestrator.registry().panel_ids() {
            let orchestrator = Arc::clone(&self.orchestrator);
            let request = TriggerRequest::new(panel_id.clone());
            tasks.spawn(async move { orchestrator.trigger(request).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => {
                    self.metrics.runs_completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) if e.is_busy() => {
                    self.metrics.runs_skipped_busy.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(_)) => {
                    self.metrics.runs_failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::error!(error = %e, "sweep task panicked");
                    self.metrics.runs_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        match self.orchestrator.reconcile().await {
            Ok(report) => {
                self.metrics
                    .runs_reconciled
                    .fetch_add(report.resolved as u64, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!(error = %e, "post-sweep reconcile failed"),
        }
        self.metrics.sweeps.fetch_add(1, Ordering::Relaxed);

        let after = self.metrics.snapshot();
        SweepSnapshot {
            sweeps: 1,
            runs_completed: after.runs_completed - before.runs_completed,
            runs_skipped_busy: after.runs_skipped_busy - before.runs_skipped_busy,
            runs_failed: after.runs_failed - before.runs_failed,
            runs_reconciled: after.runs_reconciled - before.runs_reconciled,
        }
    }

    /// Sweep on every tick until `shutdown_rx` turns `true`. Missed ticks are skipped.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> SweepSnapshot {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            panels = self.orchestrator.registry().len(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let sweep = self.sweep_once().await;
                    tracing::info!(
                        completed = sweep.runs_completed,
                        skipped_busy = sweep.runs_skipped_busy,
                        failed = sweep.runs_failed,
                        reconciled = sweep.runs_reconciled,
                        "Sweep finished"
                    );
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            sweeps = snapshot.sweeps,
            runs_completed = snapshot.runs_completed,
            runs_skipped_busy = snapshot.runs_skipped_busy,
            runs_failed = snapshot.runs_failed,
            runs_reconciled = snapshot.runs_reconciled,
            "Scheduler stopped"
        );
        snapshot
    }
}
