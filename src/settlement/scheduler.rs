//! The settlement control loop.
//!
//! A single long-lived task pulls pending wagers on a fixed interval,
//! resolves every leg against the feed, evaluates fully-resolved wagers
//! and commits each terminal outcome atomically. One wager's failure
//! never aborts the cycle; the cycle boundary is the isolation unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::feed::{CanonicalEvent, EndpointClass, EventStatus, FeedClient};
use crate::monitoring::{SettlementRunStats, StatsSnapshot};
use crate::storage::WagerStore;
use crate::types::EngineConfig;

use super::evaluator::{evaluate, resolve_wager, LegOutcome, WagerSettlement};
use super::matcher::{match_leg, LegMatch};
use super::{DisabledEvents, Leg, LegTiming, Wager};

/// Per-cycle view of normalized events, fetched at most once per
/// (sport, window). Legs sharing a group share the same event list; a
/// window whose fetch failed stays absent for the rest of the cycle so
/// one flaky sport cannot trigger a retry storm.
struct EventIndex<'a> {
    feed: &'a FeedClient,
    max_history_windows: u8,
    cached: HashMap<(String, EndpointClass), Option<Arc<Vec<CanonicalEvent>>>>,
}

impl<'a> EventIndex<'a> {
    fn new(feed: &'a FeedClient, max_history_windows: u8) -> Self {
        Self {
            feed,
            max_history_windows,
            cached: HashMap::new(),
        }
    }

    async fn events(
        &mut self,
        sport_key: &str,
        class: EndpointClass,
    ) -> Option<Arc<Vec<CanonicalEvent>>> {
        let key = (sport_key.to_string(), class);
        if let Some(entry) = self.cached.get(&key) {
            return entry.clone();
        }

        let entry = match self.feed.fetch(sport_key, class).await {
            Ok(payload) => {
                let events = crate::feed::normalize(&payload, sport_key);
                debug!(
                    target: "settle",
                    sport = sport_key,
                    window = %class.as_path(),
                    events = events.len(),
                    "normalized feed window"
                );
                Some(Arc::new(events))
            }
            Err(err) => {
                warn!(
                    target: "settle",
                    sport = sport_key,
                    window = %class.as_path(),
                    error = %err,
                    "feed window unavailable this cycle; affected wagers stay pending"
                );
                None
            }
        };
        self.cached.insert(key, entry.clone());
        entry
    }

    /// Resolve one leg to a canonical event, widening from the live window
    /// into a bounded number of historical windows. Exact ID hits win over
    /// fuzzy hits from any earlier window; the provider can take a while
    /// to move a finished match from the live bucket into historical ones.
    async fn resolve(&mut self, leg: &Leg, disabled: &DisabledEvents) -> Option<CanonicalEvent> {
        let mut fuzzy_candidate: Option<CanonicalEvent> = None;

        // In-play legs settle off the live window only; pregame legs may
        // have aged out of it and are allowed to widen backwards.
        let mut windows = vec![EndpointClass::Live];
        if leg.timing == LegTiming::Pregame {
            windows.extend((1..=self.max_history_windows).map(EndpointClass::DaysBack));
        }

        for class in windows {
            let events = match self.events(&leg.sport_key, class).await {
                Some(events) => events,
                None => continue,
            };
            match match_leg(leg, &events, disabled) {
                LegMatch::Exact(event) => return Some(event.clone()),
                LegMatch::Fuzzy(event) => {
                    if fuzzy_candidate.is_none() {
                        fuzzy_candidate = Some(event.clone());
                    }
                }
                LegMatch::NotFound => {}
            }
        }

        fuzzy_candidate
    }
}

/// Engine status as exposed on the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub total_checks: u64,
    pub successful_settlements: u64,
    pub failed_settlements: u64,
    pub last_error: Option<String>,
    /// Absent when the store could not be queried for the count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_bets: Option<u64>,
}

/// Singleton control loop over the wager store and feed client.
///
/// Two states, `stopped` and `running`; `start`/`stop` are idempotent and
/// the stop signal is observed cooperatively between wagers, never
/// mid-commit.
pub struct SettlementEngine {
    store: Arc<WagerStore>,
    feed: Arc<FeedClient>,
    stats: SettlementRunStats,
    interval: Duration,
    max_history_windows: u8,
    running: Arc<AtomicBool>,
    /// Cancellation token owned by the currently spawned loop, if any.
    /// Each `start` issues a fresh token and `stop` revokes it, so a
    /// stopped loop stays dead even when the engine is restarted before
    /// its next tick.
    run_token: Mutex<Option<Arc<AtomicBool>>>,
}

impl SettlementEngine {
    pub fn new(store: Arc<WagerStore>, feed: Arc<FeedClient>, cfg: &EngineConfig) -> Self {
        Self {
            store,
            feed,
            stats: SettlementRunStats::new(),
            interval: cfg.interval(),
            max_history_windows: cfg.max_history_windows,
            running: Arc::new(AtomicBool::new(false)),
            run_token: Mutex::new(None),
        }
    }

    pub fn stats(&self) -> &SettlementRunStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin the periodic cycle. Idempotent: starting a running engine is
    /// a no-op that reports the current state.
    pub fn start(self: Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!(target: "settle", "start requested but engine already running");
            return true;
        }

        let token = Arc::new(AtomicBool::new(true));
        {
            let mut slot = self.run_token.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(Arc::clone(&token));
        }

        info!(target: "settle", interval_secs = self.interval.as_secs(), "settlement loop starting");
        let engine = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.interval);
            loop {
                ticker.tick().await;
                if !token.load(Ordering::SeqCst) {
                    break;
                }
                engine.cycle(&token).await;
            }
            info!(target: "settle", "settlement loop stopped");
        });
        true
    }

    /// Signal the loop to exit after the in-flight work completes.
    /// Idempotent; never interrupts a wager mid-settlement. The loop's
    /// token is revoked here, not re-read from the shared flag, so a
    /// stop/start pair within one interval cannot revive the old loop.
    pub fn stop(&self) -> bool {
        if self.running.swap(false, Ordering::SeqCst) {
            let token = {
                let mut slot = self.run_token.lock().unwrap_or_else(|e| e.into_inner());
                slot.take()
            };
            if let Some(token) = token {
                token.store(false, Ordering::SeqCst);
            }
            info!(target: "settle", "stop requested; loop exits at next boundary");
        }
        false
    }

    pub async fn status(&self) -> EngineStatus {
        let StatsSnapshot {
            total_checks,
            successful_settlements,
            failed_settlements,
            last_error,
        } = self.stats.snapshot();

        let pending_bets = match self.store.count_pending().await {
            Ok(n) => Some(n),
            Err(err) => {
                warn!(target: "settle", error = %err, "failed to count pending wagers");
                None
            }
        };

        EngineStatus {
            running: self.is_running(),
            total_checks,
            successful_settlements,
            failed_settlements,
            last_error,
            pending_bets,
        }
    }

    /// Run exactly one settlement pass; used by the loop, the `cycle` CLI
    /// subcommand and tests.
    pub async fn run_cycle(&self) {
        self.cycle_inner(|| false).await;
    }

    async fn cycle(&self, token: &AtomicBool) {
        self.cycle_inner(|| !token.load(Ordering::SeqCst)).await;
    }

    async fn cycle_inner(&self, stop_requested: impl Fn() -> bool) {
        self.stats.record_check();

        let disabled = match self.store.disabled_events().await {
            Ok(d) => d,
            Err(err) => {
                warn!(
                    target: "settle",
                    error = %err,
                    "failed to load disabled events; proceeding without overrides"
                );
                DisabledEvents::default()
            }
        };
        if !disabled.is_empty() {
            debug!(
                target: "settle",
                overrides = disabled.len(),
                "operator settlement overrides active"
            );
        }

        // A store outage is an engine-level problem, not a settlement
        // failure: surface it through last_error without touching the
        // per-wager failure counter.
        let pending = match self.store.list_pending().await {
            Ok(p) => p,
            Err(err) => {
                self.stats.record_error("list_pending", &err.to_string());
                return;
            }
        };

        if pending.is_empty() {
            debug!(target: "settle", "no pending wagers this cycle");
            self.stats.clear_error();
            return;
        }

        let mut index = EventIndex::new(&self.feed, self.max_history_windows);
        let mut settled = 0usize;
        let mut deferred = 0usize;
        let mut failures = 0usize;

        for wager in &pending {
            match self.process_wager(wager, &mut index, &disabled).await {
                Ok(Some(settlement)) => {
                    settled += 1;
                    self.stats
                        .record_settled(wager.id, settlement.status, settlement.payout);
                }
                Ok(None) => deferred += 1,
                Err(err) => {
                    failures += 1;
                    self.stats
                        .record_failure(&format!("wager {}", wager.id), &err.to_string());
                }
            }

            // Cooperative stop between wagers; the current wager is always
            // either fully committed or untouched.
            if stop_requested() {
                info!(
                    target: "settle",
                    remaining = pending.len() - settled - deferred - failures,
                    "stop observed mid-cycle; remaining wagers deferred"
                );
                break;
            }
        }

        if failures == 0 {
            self.stats.clear_error();
        }
        info!(
            target: "settle",
            event = "cycle_complete",
            checked = pending.len(),
            settled,
            deferred,
            failures,
            upstream_calls = self.feed.upstream_calls(),
            "settlement cycle complete"
        );
    }

    /// Resolve, evaluate and commit a single wager.
    ///
    /// `Ok(None)` means the wager stays pending (some leg unmatched or its
    /// event not yet terminal); partial progress is never persisted —
    /// matching is cheap and idempotent, so next cycle redoes it all.
    async fn process_wager(
        &self,
        wager: &Wager,
        index: &mut EventIndex<'_>,
        disabled: &DisabledEvents,
    ) -> anyhow::Result<Option<WagerSettlement>> {
        let mut outcomes: Vec<LegOutcome> = Vec::with_capacity(wager.legs.len());

        for leg in &wager.legs {
            let event = match index.resolve(leg, disabled).await {
                Some(event) => event,
                None => {
                    debug!(
                        target: "settle",
                        wager_id = %wager.id,
                        match_id = %leg.match_id,
                        "leg unmatched; wager stays pending"
                    );
                    return Ok(None);
                }
            };

            // Evaluator precondition: only terminal events go in. A live
            // or scheduled event just defers the wager.
            match event.status {
                EventStatus::Scheduled | EventStatus::Live => return Ok(None),
                EventStatus::Finished | EventStatus::Cancelled | EventStatus::Postponed => {}
            }

            let outcome = evaluate(leg, &event)?;
            outcomes.push(outcome);
        }

        let settlement = resolve_wager(wager, &outcomes);
        self.store
            .commit_settlement(wager.id, settlement.status, settlement.payout)
            .await?;

        Ok(Some(settlement))
    }
}
