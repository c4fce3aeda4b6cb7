use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::settlement::WagerStatus;

#[derive(Default)]
struct StatsInner {
    total_checks: AtomicU64,
    successful_settlements: AtomicU64,
    failed_settlements: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Run counters for the settlement engine.
///
/// Owned per engine instance and handed into the cycle by handle rather
/// than living in ambient global state, so tests inject a fresh instance
/// per run. Counters are monotonic until process restart; `last_error`
/// holds the most recent failure and is cleared after a clean cycle.
#[derive(Clone, Default)]
pub struct SettlementRunStats {
    inner: Arc<StatsInner>,
}

impl SettlementRunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// One settlement pass started.
    pub fn record_check(&self) {
        self.inner.total_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settled(&self, wager_id: Uuid, status: WagerStatus, payout: f64) {
        self.inner
            .successful_settlements
            .fetch_add(1, Ordering::Relaxed);
        info!(
            target: "settle",
            event = "wager_settled",
            wager_id = %wager_id,
            status = status.as_str(),
            payout,
            total_settled = self.inner.successful_settlements.load(Ordering::Relaxed),
            "wager settled"
        );
    }

    pub fn record_failure(&self, context: &str, error: &str) {
        self.inner
            .failed_settlements
            .fetch_add(1, Ordering::Relaxed);
        let detail = format!("{context}: {error}");
        warn!(
            target: "settle",
            event = "settlement_failed",
            context,
            error,
            total_failed = self.inner.failed_settlements.load(Ordering::Relaxed),
            "settlement failure"
        );
        let mut last = self.inner.last_error.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(detail);
    }

    /// Record an engine-level error (store or feed outage) that aborted
    /// work before any wager was attempted. Lands in `last_error` without
    /// touching the per-wager failure counter.
    pub fn record_error(&self, context: &str, error: &str) {
        let detail = format!("{context}: {error}");
        warn!(
            target: "settle",
            event = "engine_error",
            context,
            error,
            "engine-level error"
        );
        let mut last = self.inner.last_error.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(detail);
    }

    /// Called after a cycle with zero failures.
    pub fn clear_error(&self) {
        let mut last = self.inner.last_error.lock().unwrap_or_else(|e| e.into_inner());
        *last = None;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_checks: self.inner.total_checks.load(Ordering::Relaxed),
            successful_settlements: self
                .inner
                .successful_settlements
                .load(Ordering::Relaxed),
            failed_settlements: self.inner.failed_settlements.load(Ordering::Relaxed),
            last_error: self
                .inner
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

/// Serializable view of current run stats for the control surface and
/// periodic log lines.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_checks: u64,
    pub successful_settlements: u64,
    pub failed_settlements: u64,
    pub last_error: Option<String>,
}

/// Spawn a background task that periodically logs a compact stats
/// snapshot; combined with JSON logs this is the operator dashboard.
pub fn spawn_stats_log_task(stats: SettlementRunStats, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let snapshot = stats.snapshot();
            info!(
                target: "settle",
                event = "stats_snapshot",
                total_checks = snapshot.total_checks,
                successful_settlements = snapshot.successful_settlements,
                failed_settlements = snapshot.failed_settlements,
                last_error = snapshot.last_error.as_deref().unwrap_or(""),
                "stats snapshot"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_error_clears() {
        let stats = SettlementRunStats::new();
        stats.record_check();
        stats.record_settled(Uuid::new_v4(), WagerStatus::Won, 18.0);
        stats.record_failure("wager 123", "boom");

        let snap = stats.snapshot();
        assert_eq!(snap.total_checks, 1);
        assert_eq!(snap.successful_settlements, 1);
        assert_eq!(snap.failed_settlements, 1);
        assert!(snap.last_error.as_deref().unwrap().contains("boom"));

        stats.clear_error();
        assert!(stats.snapshot().last_error.is_none());
    }

    #[test]
    fn engine_error_does_not_count_as_settlement_failure() {
        let stats = SettlementRunStats::new();
        stats.record_error("list_pending", "connection refused");

        let snap = stats.snapshot();
        assert_eq!(snap.failed_settlements, 0);
        assert!(snap
            .last_error
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn handles_share_state() {
        let stats = SettlementRunStats::new();
        let clone = stats.clone();
        clone.record_check();
        assert_eq!(stats.snapshot().total_checks, 1);
    }
}
