//! Wager store backends.
//!
//! The engine reads pending wagers and writes each settlement exactly
//! once. The Postgres backend is the production path; the memory backend
//! mirrors its semantics (including the pending-only commit guard) for
//! dry runs and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::query;
use sqlx::query_as;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::settlement::{DisabledEvents, Wager, WagerStatus};
use crate::utils::odds::round_cents;

use super::models::{DisabledEventRow, WagerRow};
use super::{PgPool, StoreError, StoreResult};

enum StoreBackend {
    Postgres(PgWagerStore),
    Memory(MemoryWagerStore),
}

/// Wager store handle consumed by the settlement engine.
pub struct WagerStore {
    backend: StoreBackend,
}

impl WagerStore {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            backend: StoreBackend::Postgres(PgWagerStore { pool }),
        }
    }

    pub fn memory(mem: MemoryWagerStore) -> Self {
        Self {
            backend: StoreBackend::Memory(mem),
        }
    }

    /// All pending wagers in stable creation order.
    pub async fn list_pending(&self) -> StoreResult<Vec<Wager>> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.list_pending().await,
            StoreBackend::Memory(mem) => Ok(mem.list_pending()),
        }
    }

    pub async fn count_pending(&self) -> StoreResult<u64> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.count_pending().await,
            StoreBackend::Memory(mem) => Ok(mem.list_pending().len() as u64),
        }
    }

    /// Operator overrides; read-only to the engine.
    pub async fn disabled_events(&self) -> StoreResult<DisabledEvents> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.disabled_events().await,
            StoreBackend::Memory(mem) => Ok(mem.disabled_events()),
        }
    }

    /// Atomically flip a pending wager to its terminal status and credit
    /// the payout to the owner's balance.
    ///
    /// The status flip is guarded on `pending`, which makes the commit the
    /// single point where a wager can leave the pending state: a second
    /// commit attempt fails instead of paying twice.
    pub async fn commit_settlement(
        &self,
        wager_id: Uuid,
        status: WagerStatus,
        payout: f64,
    ) -> StoreResult<()> {
        debug_assert!(status != WagerStatus::Pending);
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.commit_settlement(wager_id, status, payout).await,
            StoreBackend::Memory(mem) => mem.commit_settlement(wager_id, status, payout),
        }
    }
}

struct PgWagerStore {
    pool: PgPool,
}

impl PgWagerStore {
    async fn list_pending(&self) -> StoreResult<Vec<Wager>> {
        let rows: Vec<WagerRow> = query_as(
            "SELECT id, user_id, legs, status, stake, total_odds, potential_return, created_at \
             FROM wagers WHERE status = 'pending' ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        // Corrupt rows are skipped, not fatal: one bad record must not
        // stall settlement of every other wager.
        let mut wagers = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match Wager::try_from(row) {
                Ok(w) => wagers.push(w),
                Err(err) => {
                    warn!(target: "store", wager_id = %id, error = %err, "skipping corrupt wager row");
                }
            }
        }
        Ok(wagers)
    }

    async fn count_pending(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wagers WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn disabled_events(&self) -> StoreResult<DisabledEvents> {
        let rows: Vec<DisabledEventRow> =
            query_as("SELECT event_id, market_key FROM disabled_events")
                .fetch_all(&self.pool)
                .await?;
        Ok(DisabledEvents::from_pairs(
            rows.into_iter().map(|r| (r.event_id, r.market_key)),
        ))
    }

    async fn commit_settlement(
        &self,
        wager_id: Uuid,
        status: WagerStatus,
        payout: f64,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = query(
            "UPDATE wagers SET status = $2, settled_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(wager_id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::AlreadySettled(wager_id));
        }

        if payout > 0.0 {
            query(
                "UPDATE users SET balance = balance + $2 \
                 WHERE id = (SELECT user_id FROM wagers WHERE id = $1)",
            )
            .bind(wager_id)
            .bind(payout)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            target: "store",
            wager_id = %wager_id,
            status = status.as_str(),
            payout,
            "settlement committed"
        );
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    wagers: HashMap<Uuid, Wager>,
    balances: HashMap<Uuid, f64>,
    disabled: Vec<(String, String)>,
}

/// In-process store with the same commit semantics as Postgres.
///
/// Cloneable handle over shared state, so tests can keep a reference for
/// seeding and inspection while the engine owns another.
#[derive(Clone, Default)]
pub struct MemoryWagerStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryWagerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_wager(&self, wager: Wager) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.wagers.insert(wager.id, wager);
    }

    pub fn disable_event(&self, event_id: &str, market_key: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .disabled
            .push((event_id.to_string(), market_key.to_string()));
    }

    pub fn wager(&self, id: Uuid) -> Option<Wager> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.wagers.get(&id).cloned()
    }

    pub fn balance(&self, user_id: Uuid) -> f64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.balances.get(&user_id).copied().unwrap_or(0.0)
    }

    fn list_pending(&self) -> Vec<Wager> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut pending: Vec<Wager> = inner
            .wagers
            .values()
            .filter(|w| w.status == WagerStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending
    }

    fn disabled_events(&self) -> DisabledEvents {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        DisabledEvents::from_pairs(inner.disabled.iter().cloned())
    }

    fn commit_settlement(
        &self,
        wager_id: Uuid,
        status: WagerStatus,
        payout: f64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let user_id = {
            let wager = inner
                .wagers
                .get_mut(&wager_id)
                .ok_or(StoreError::NotFound(wager_id))?;
            if wager.status != WagerStatus::Pending {
                return Err(StoreError::AlreadySettled(wager_id));
            }
            wager.status = status;
            wager.user_id
        };

        if payout > 0.0 {
            let balance = inner.balances.entry(user_id).or_insert(0.0);
            *balance = round_cents(*balance + payout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::settlement::{Leg, LegTiming};

    fn pending_wager(user_id: Uuid) -> Wager {
        Wager {
            id: Uuid::new_v4(),
            user_id,
            legs: vec![Leg {
                match_id: "1".to_string(),
                match_name: "A vs B".to_string(),
                sport_key: "soccer".to_string(),
                market_key: "match_result".to_string(),
                selection: "A".to_string(),
                odds: 2.0,
                timing: LegTiming::Pregame,
            }],
            status: WagerStatus::Pending,
            stake: 10.0,
            total_odds: 2.0,
            potential_return: 20.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn commit_is_guarded_against_double_settlement() {
        let mem = MemoryWagerStore::new();
        let user = Uuid::new_v4();
        let wager = pending_wager(user);
        let id = wager.id;
        mem.insert_wager(wager);

        mem.commit_settlement(id, WagerStatus::Won, 20.0).unwrap();
        assert_eq!(mem.balance(user), 20.0);
        assert_eq!(mem.wager(id).unwrap().status, WagerStatus::Won);

        let err = mem
            .commit_settlement(id, WagerStatus::Won, 20.0)
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadySettled(_)));
        // Balance unchanged by the rejected second commit.
        assert_eq!(mem.balance(user), 20.0);
    }

    #[test]
    fn losing_commit_pays_nothing() {
        let mem = MemoryWagerStore::new();
        let user = Uuid::new_v4();
        let wager = pending_wager(user);
        let id = wager.id;
        mem.insert_wager(wager);

        mem.commit_settlement(id, WagerStatus::Lost, 0.0).unwrap();
        assert_eq!(mem.balance(user), 0.0);
        assert_eq!(mem.wager(id).unwrap().status, WagerStatus::Lost);
    }

    #[tokio::test]
    async fn pending_list_is_creation_ordered() {
        let mem = MemoryWagerStore::new();
        let user = Uuid::new_v4();

        let mut first = pending_wager(user);
        first.created_at = Utc::now() - chrono::Duration::minutes(5);
        let first_id = first.id;
        let second = pending_wager(user);

        mem.insert_wager(second);
        mem.insert_wager(first);

        let store = WagerStore::memory(mem);
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first_id);
    }
}
