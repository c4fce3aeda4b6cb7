//! Pure evaluation of a leg's market selection against a finished event,
//! and aggregation of leg outcomes into a wager-level settlement.
//!
//! No I/O and no side effects: everything here is deterministic over its
//! inputs so settlement rules can be unit-tested against literal events.

use serde::Serialize;
use thiserror::Error;

use crate::feed::{
    CanonicalEvent, EventStatus, MarketResult, Winner, MARKET_HANDICAP, MARKET_MATCH_RESULT,
    MARKET_TOTAL,
};
use crate::utils::odds::{combined_odds, round_cents};
use crate::utils::text::{fuzzy_contains, normalize_name};

use super::{Leg, Wager, WagerStatus};

/// Terminal outcome of a single leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegOutcome {
    Win,
    Lose,
    Void,
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("event {event_id} is not finished (status: {status:?})")]
    NotFinished {
        event_id: String,
        status: EventStatus,
    },

    #[error("event {event_id} carries no result for market {market_key}")]
    MissingResult {
        event_id: String,
        market_key: String,
    },

    #[error("unsupported market key: {0}")]
    UnknownMarket(String),

    #[error("cannot interpret selection `{selection}` for market {market_key}")]
    BadSelection {
        selection: String,
        market_key: String,
    },
}

/// Evaluate one leg against its matched canonical event.
///
/// The scheduler gates on event status before calling; a non-finished
/// event reaching this point is a precondition violation and comes back
/// as an error, never as a settled outcome. Cancelled and postponed
/// events void the leg with the stake share returned.
pub fn evaluate(leg: &Leg, event: &CanonicalEvent) -> Result<LegOutcome, EvalError> {
    match event.status {
        EventStatus::Cancelled | EventStatus::Postponed => return Ok(LegOutcome::Void),
        EventStatus::Finished => {}
        status => {
            return Err(EvalError::NotFinished {
                event_id: event.id.clone(),
                status,
            })
        }
    }

    match canonical_market_key(&leg.market_key) {
        Some(MARKET_MATCH_RESULT) => evaluate_match_result(leg, event),
        Some(MARKET_TOTAL) => evaluate_total(leg, event),
        Some(MARKET_HANDICAP) => evaluate_handicap(leg, event),
        _ => Err(EvalError::UnknownMarket(leg.market_key.clone())),
    }
}

/// Map market-key spellings seen across sports onto the canonical three.
fn canonical_market_key(key: &str) -> Option<&'static str> {
    match key.trim().to_lowercase().as_str() {
        "match_result" | "match-result" | "1x2" | "moneyline" | "match_winner" | "winner" => {
            Some(MARKET_MATCH_RESULT)
        }
        "total" | "totals" | "over_under" | "over/under" | "total_points" => Some(MARKET_TOTAL),
        "handicap" | "spread" | "point_spread" => Some(MARKET_HANDICAP),
        _ => None,
    }
}

fn market_result<'a>(
    event: &'a CanonicalEvent,
    market_key: &str,
) -> Result<&'a MarketResult, EvalError> {
    event
        .markets
        .get(market_key)
        .ok_or_else(|| EvalError::MissingResult {
            event_id: event.id.clone(),
            market_key: market_key.to_string(),
        })
}

fn evaluate_match_result(leg: &Leg, event: &CanonicalEvent) -> Result<LegOutcome, EvalError> {
    let winner = match market_result(event, MARKET_MATCH_RESULT)? {
        MarketResult::MatchResult { winner } => *winner,
        _ => {
            return Err(EvalError::MissingResult {
                event_id: event.id.clone(),
                market_key: MARKET_MATCH_RESULT.to_string(),
            })
        }
    };

    let picked = parse_side(&leg.selection, event).ok_or_else(|| EvalError::BadSelection {
        selection: leg.selection.clone(),
        market_key: leg.market_key.clone(),
    })?;

    Ok(if picked == winner {
        LegOutcome::Win
    } else {
        LegOutcome::Lose
    })
}

/// Interpret a match-result selection: "draw"/"x", a home/away keyword, or
/// a team name compared against the event's normalized team names.
fn parse_side(selection: &str, event: &CanonicalEvent) -> Option<Winner> {
    let sel = normalize_name(selection);
    match sel.as_str() {
        "draw" | "x" => return Some(Winner::Draw),
        "home" | "1" => return Some(Winner::Home),
        "away" | "2" => return Some(Winner::Away),
        _ => {}
    }

    let home = normalize_name(&event.home_team);
    let away = normalize_name(&event.away_team);
    let is_home = fuzzy_contains(&sel, &home);
    let is_away = fuzzy_contains(&sel, &away);
    match (is_home, is_away) {
        (true, false) => Some(Winner::Home),
        (false, true) => Some(Winner::Away),
        // Ambiguous or unknown names cannot be settled safely.
        _ => None,
    }
}

fn evaluate_total(leg: &Leg, event: &CanonicalEvent) -> Result<LegOutcome, EvalError> {
    let points = match market_result(event, MARKET_TOTAL)? {
        MarketResult::Total { points } => *points as f64,
        _ => {
            return Err(EvalError::MissingResult {
                event_id: event.id.clone(),
                market_key: MARKET_TOTAL.to_string(),
            })
        }
    };

    let (over, line) =
        parse_total_selection(&leg.selection).ok_or_else(|| EvalError::BadSelection {
            selection: leg.selection.clone(),
            market_key: leg.market_key.clone(),
        })?;

    // Landing exactly on the line is a push: stake returned.
    if (points - line).abs() < f64::EPSILON {
        return Ok(LegOutcome::Void);
    }
    let hit = if over { points > line } else { points < line };
    Ok(if hit { LegOutcome::Win } else { LegOutcome::Lose })
}

/// Parse "over 2.5" / "under 41.5" (also "o 2.5" / "u 2.5").
fn parse_total_selection(selection: &str) -> Option<(bool, f64)> {
    let mut parts = selection.split_whitespace();
    let direction = parts.next()?.to_lowercase();
    let line = parts.next()?.parse::<f64>().ok()?;
    match direction.as_str() {
        "over" | "o" => Some((true, line)),
        "under" | "u" => Some((false, line)),
        _ => None,
    }
}

fn evaluate_handicap(leg: &Leg, event: &CanonicalEvent) -> Result<LegOutcome, EvalError> {
    let home_margin = match market_result(event, MARKET_HANDICAP)? {
        MarketResult::Handicap { home_margin } => *home_margin as f64,
        _ => {
            return Err(EvalError::MissingResult {
                event_id: event.id.clone(),
                market_key: MARKET_HANDICAP.to_string(),
            })
        }
    };

    let (side, line) =
        parse_handicap_selection(&leg.selection, event).ok_or_else(|| EvalError::BadSelection {
            selection: leg.selection.clone(),
            market_key: leg.market_key.clone(),
        })?;

    let adjusted = match side {
        Winner::Home => home_margin + line,
        Winner::Away => -home_margin + line,
        Winner::Draw => return Ok(LegOutcome::Lose),
    };

    if adjusted.abs() < f64::EPSILON {
        return Ok(LegOutcome::Void);
    }
    Ok(if adjusted > 0.0 {
        LegOutcome::Win
    } else {
        LegOutcome::Lose
    })
}

/// Parse "<team> -1.5" / "<team> +2.5"; the trailing token is the line,
/// everything before it names the side.
fn parse_handicap_selection(selection: &str, event: &CanonicalEvent) -> Option<(Winner, f64)> {
    let trimmed = selection.trim();
    let (team_part, line_part) = trimmed.rsplit_once(char::is_whitespace)?;
    let line = line_part.parse::<f64>().ok()?;
    let side = parse_side(team_part, event)?;
    Some((side, line))
}

/// Wager-level settlement computed from all leg outcomes.
#[derive(Clone, Debug, PartialEq)]
pub struct WagerSettlement {
    pub status: WagerStatus,
    pub payout: f64,
}

/// Aggregate leg outcomes into the wager's terminal state and payout.
///
/// Any losing leg loses the wager. Void legs collapse their odds to 1.0
/// and the total is recomputed from the surviving winners, preserving the
/// economic intent of the combination rather than voiding it outright.
pub fn resolve_wager(wager: &Wager, outcomes: &[LegOutcome]) -> WagerSettlement {
    debug_assert_eq!(wager.legs.len(), outcomes.len());

    if outcomes.iter().any(|o| *o == LegOutcome::Lose) {
        return WagerSettlement {
            status: WagerStatus::Lost,
            payout: 0.0,
        };
    }

    let voids = outcomes.iter().filter(|o| **o == LegOutcome::Void).count();
    if voids == 0 {
        return WagerSettlement {
            status: WagerStatus::Won,
            payout: round_cents(wager.stake * wager.total_odds),
        };
    }
    if voids == outcomes.len() {
        return WagerSettlement {
            status: WagerStatus::Void,
            payout: round_cents(wager.stake),
        };
    }

    let legs: Vec<(f64, bool)> = wager
        .legs
        .iter()
        .zip(outcomes)
        .map(|(leg, outcome)| (leg.odds, *outcome == LegOutcome::Void))
        .collect();
    WagerSettlement {
        status: WagerStatus::PartiallyVoid,
        payout: round_cents(wager.stake * combined_odds(&legs)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::settlement::LegTiming;

    fn finished_event(home: &str, away: &str, hs: i64, aw: i64) -> CanonicalEvent {
        let markets = HashMap::from([
            (
                MARKET_MATCH_RESULT.to_string(),
                MarketResult::MatchResult {
                    winner: if hs > aw {
                        Winner::Home
                    } else if hs < aw {
                        Winner::Away
                    } else {
                        Winner::Draw
                    },
                },
            ),
            (MARKET_TOTAL.to_string(), MarketResult::Total { points: hs + aw }),
            (
                MARKET_HANDICAP.to_string(),
                MarketResult::Handicap { home_margin: hs - aw },
            ),
        ]);
        CanonicalEvent {
            id: "341056".to_string(),
            sport_key: "baseball".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            status: EventStatus::Finished,
            home_score: Some(hs),
            away_score: Some(aw),
            markets,
        }
    }

    fn leg(market_key: &str, selection: &str, odds: f64) -> Leg {
        Leg {
            match_id: "341056".to_string(),
            match_name: "Boston Red Sox vs NY Yankees".to_string(),
            sport_key: "baseball".to_string(),
            market_key: market_key.to_string(),
            selection: selection.to_string(),
            odds,
            timing: LegTiming::Pregame,
        }
    }

    fn wager(legs: Vec<Leg>, stake: f64, total_odds: f64) -> Wager {
        Wager {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            legs,
            status: WagerStatus::Pending,
            stake,
            total_odds,
            potential_return: stake * total_odds,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn match_result_home_win() {
        let event = finished_event("Boston Red Sox", "NY Yankees", 5, 3);
        let outcome = evaluate(&leg("match_result", "Boston Red Sox", 1.8), &event).unwrap();
        assert_eq!(outcome, LegOutcome::Win);

        let outcome = evaluate(&leg("match_result", "NY Yankees", 2.1), &event).unwrap();
        assert_eq!(outcome, LegOutcome::Lose);
    }

    #[test]
    fn match_result_draw() {
        let event = finished_event("Lyon", "Lens", 2, 2);
        assert_eq!(
            evaluate(&leg("1x2", "draw", 3.2), &event).unwrap(),
            LegOutcome::Win
        );
        assert_eq!(
            evaluate(&leg("1x2", "Lyon", 1.9), &event).unwrap(),
            LegOutcome::Lose
        );
    }

    #[test]
    fn totals_with_push() {
        let event = finished_event("A", "B", 2, 1);
        assert_eq!(
            evaluate(&leg("total", "over 2.5", 1.9), &event).unwrap(),
            LegOutcome::Win
        );
        assert_eq!(
            evaluate(&leg("total", "under 2.5", 1.9), &event).unwrap(),
            LegOutcome::Lose
        );
        // Exact line is a push.
        assert_eq!(
            evaluate(&leg("total", "over 3", 1.9), &event).unwrap(),
            LegOutcome::Void
        );
    }

    #[test]
    fn handicap_lines() {
        let event = finished_event("A", "B", 3, 1);
        assert_eq!(
            evaluate(&leg("handicap", "A -1.5", 1.9), &event).unwrap(),
            LegOutcome::Win
        );
        assert_eq!(
            evaluate(&leg("handicap", "A -2.5", 2.4), &event).unwrap(),
            LegOutcome::Lose
        );
        assert_eq!(
            evaluate(&leg("handicap", "B +2.5", 1.9), &event).unwrap(),
            LegOutcome::Win
        );
        // Margin exactly cancelled by the line is a push.
        assert_eq!(
            evaluate(&leg("handicap", "A -2", 2.0), &event).unwrap(),
            LegOutcome::Void
        );
    }

    #[test]
    fn cancelled_event_voids_defensively() {
        let mut event = finished_event("A", "B", 0, 0);
        event.status = EventStatus::Cancelled;
        assert_eq!(
            evaluate(&leg("match_result", "A", 1.5), &event).unwrap(),
            LegOutcome::Void
        );
    }

    #[test]
    fn live_event_is_a_precondition_violation() {
        let mut event = finished_event("A", "B", 1, 0);
        event.status = EventStatus::Live;
        let err = evaluate(&leg("match_result", "A", 1.5), &event).unwrap_err();
        assert!(matches!(err, EvalError::NotFinished { .. }));
    }

    #[test]
    fn unknown_market_is_an_error() {
        let event = finished_event("A", "B", 1, 0);
        let err = evaluate(&leg("first_scorer", "somebody", 7.0), &event).unwrap_err();
        assert!(matches!(err, EvalError::UnknownMarket(_)));
    }

    #[test]
    fn combo_all_win_pays_total_odds() {
        let w = wager(
            vec![leg("match_result", "A", 1.8), leg("total", "over 2.5", 2.0)],
            10.0,
            3.6,
        );
        let s = resolve_wager(&w, &[LegOutcome::Win, LegOutcome::Win]);
        assert_eq!(s.status, WagerStatus::Won);
        assert_eq!(s.payout, 36.0);
    }

    #[test]
    fn combo_win_plus_void_is_partial_not_full_void() {
        let w = wager(
            vec![leg("match_result", "A", 1.8), leg("total", "over 2.5", 2.2)],
            10.0,
            3.96,
        );
        let s = resolve_wager(&w, &[LegOutcome::Win, LegOutcome::Void]);
        assert_eq!(s.status, WagerStatus::PartiallyVoid);
        // Stake times the winning leg's odds only.
        assert_eq!(s.payout, 18.0);
    }

    #[test]
    fn combo_any_lose_loses() {
        let w = wager(
            vec![leg("match_result", "A", 1.8), leg("total", "over 2.5", 2.2)],
            10.0,
            3.96,
        );
        let s = resolve_wager(&w, &[LegOutcome::Win, LegOutcome::Lose]);
        assert_eq!(s.status, WagerStatus::Lost);
        assert_eq!(s.payout, 0.0);
    }

    #[test]
    fn all_void_returns_stake() {
        let w = wager(
            vec![leg("match_result", "A", 1.8), leg("total", "over 2.5", 2.2)],
            10.0,
            3.96,
        );
        let s = resolve_wager(&w, &[LegOutcome::Void, LegOutcome::Void]);
        assert_eq!(s.status, WagerStatus::Void);
        assert_eq!(s.payout, 10.0);
    }
}
