use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use db::{DbErr, DbPool, models::order::Order};

use super::{
    config::AppraiseConfig,
    order_lifecycle::{self, SYSTEM_OPERATOR_ID},
};

// Keeps the cutoff arithmetic inside chrono's range.
const MAX_TIMEOUT_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub appraised: usize,
    pub failed: usize,
    /// Another sweep was still running, nothing was attempted.
    pub skipped: bool,
}

/// Appraises orders left in `Completed` longer than the configured timeout,
/// on behalf of owners who never scored them.
#[derive(Clone)]
pub struct AutoAppraiseService {
    db: DbPool,
    config: AppraiseConfig,
    running: Arc<AtomicBool>,
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AutoAppraiseService {
    pub fn new(db: DbPool, config: AppraiseConfig) -> Self {
        Self {
            db,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn try_start(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(self.running.clone()))
    }

    /// One pass over the overdue orders. Each order gets its own transaction;
    /// a failure is logged and the sweep moves on.
    pub async fn sweep_once(&self) -> Result<SweepReport, DbErr> {
        let Some(_guard) = self.try_start() else {
            tracing::debug!("Auto-appraise sweep already running, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..Default::default()
            });
        };

        let timeout = chrono::Duration::seconds(self.config.timeout_secs.min(MAX_TIMEOUT_SECS) as i64);
        let cutoff = Utc::now() - timeout;
        let order_ids = Order::find_ids_completed_before(&self.db, cutoff).await?;

        let mut report = SweepReport::default();
        for order_id in order_ids {
            match order_lifecycle::appraise(
                &self.db,
                order_id,
                self.config.default_score,
                SYSTEM_OPERATOR_ID,
            )
            .await
            {
                Ok(_) => report.appraised += 1,
                Err(err) => {
                    tracing::warn!(order_id, error = %err, "Failed to auto-appraise order");
                    report.failed += 1;
                }
            }
        }

        if report.appraised > 0 || report.failed > 0 {
            tracing::info!(
                appraised = report.appraised,
                failed = report.failed,
                "Auto-appraise sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps every `purge_interval_secs`, forever. Meant to be spawned.
    pub async fn run(self) {
        let interval = Duration::from_secs(self.config.purge_interval_secs.max(1));
        tracing::info!(
            interval_secs = interval.as_secs(),
            timeout_secs = self.config.timeout_secs,
            default_score = self.config.default_score,
            "Starting auto-appraise job"
        );

        loop {
            if let Err(err) = self.sweep_once().await {
                tracing::warn!(error = %err, "Auto-appraise sweep failed");
            }
            tokio::time::sleep(interval).await;
        }
    }
}
