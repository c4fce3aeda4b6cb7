use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::settlement::{Leg, Wager, WagerStatus};

use super::StoreError;

/// Row model for wager records.
///
/// The expected schema (created via migrations, owned by the bookmaker
/// front end) is:
/// ```sql
/// CREATE TABLE IF NOT EXISTS wagers (
///   id               UUID PRIMARY KEY,
///   user_id          UUID        NOT NULL REFERENCES users(id),
///   legs             JSONB       NOT NULL,
///   status           TEXT        NOT NULL DEFAULT 'pending',
///   stake            DOUBLE PRECISION NOT NULL,
///   total_odds       DOUBLE PRECISION NOT NULL,
///   potential_return DOUBLE PRECISION NOT NULL,
///   created_at       TIMESTAMPTZ NOT NULL,
///   settled_at       TIMESTAMPTZ
/// );
/// ```
#[derive(Debug, Clone, FromRow)]
pub struct WagerRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub legs: Json<Vec<Leg>>,
    pub status: String,
    pub stake: f64,
    pub total_odds: f64,
    pub potential_return: f64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<WagerRow> for Wager {
    type Error = StoreError;

    fn try_from(row: WagerRow) -> Result<Self, Self::Error> {
        let status = WagerStatus::from_str(&row.status).ok_or_else(|| StoreError::Corrupt {
            id: row.id,
            detail: format!("unknown status `{}`", row.status),
        })?;
        if row.legs.0.is_empty() {
            return Err(StoreError::Corrupt {
                id: row.id,
                detail: "wager has no legs".to_string(),
            });
        }
        Ok(Wager {
            id: row.id,
            user_id: row.user_id,
            legs: row.legs.0,
            status,
            stake: row.stake,
            total_odds: row.total_odds,
            potential_return: row.potential_return,
            created_at: row.created_at,
        })
    }
}

/// Row model for operator settlement overrides.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS disabled_events (
///   event_id   TEXT NOT NULL,
///   market_key TEXT NOT NULL,
///   PRIMARY KEY (event_id, market_key)
/// );
/// ```
#[derive(Debug, Clone, FromRow)]
pub struct DisabledEventRow {
    pub event_id: String,
    pub market_key: String,
}
