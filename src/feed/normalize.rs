//! Normalization of heterogeneous provider payloads into canonical events.
//!
//! The provider's JSON layout differs per sport. Two families show up:
//!
//! - list shape: a top-level `categories` array, each with a `matches`
//!   array of plain-keyed match objects;
//! - singleton shape: a `scores` wrapper whose `category` is a single
//!   object when only one category is returned, `match` a single object
//!   when only one match is returned, and attribute-like fields carry a
//!   leading `@` marker (XML-converted feeds).
//!
//! Two rules keep this tractable: any field that may be one-or-many is
//! coerced to a list before further processing, and any field that may be
//! either a plain key or an `@`-prefixed key goes through one accessor.
//! Nothing downstream of this module ever branches on payload shape.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Canonical lifecycle state of an upstream match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Live,
    Finished,
    Cancelled,
    Postponed,
}

/// Winner of a two-sided match derived from the final score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Home,
    Draw,
    Away,
}

/// Structured per-market outcome, sufficient to evaluate any selection
/// against without re-reading the raw payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MarketResult {
    MatchResult { winner: Winner },
    Total { points: i64 },
    Handicap { home_margin: i64 },
}

pub const MARKET_MATCH_RESULT: &str = "match_result";
pub const MARKET_TOTAL: &str = "total";
pub const MARKET_HANDICAP: &str = "handicap";

/// Normalized, provider-agnostic view of one match. Built fresh on every
/// normalization pass and discarded after the settlement pass that
/// consumed it; the feed stays the source of truth.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub status: EventStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub markets: HashMap<String, MarketResult>,
}

/// Convert one raw payload into canonical events.
///
/// Pure and stateless: safe to call concurrently for different sports.
/// Malformed match entries are skipped with a log line; siblings survive.
pub fn normalize(payload: &Value, sport_key: &str) -> Vec<CanonicalEvent> {
    let root = payload.get("scores").unwrap_or(payload);
    let categories = root
        .get("categories")
        .or_else(|| root.get("category"))
        .map(coerce_list)
        .unwrap_or_default();

    let mut events = Vec::new();
    for category in categories {
        for raw_match in match_entries(category) {
            match normalize_match(raw_match, sport_key) {
                Some(event) => events.push(event),
                None => {
                    debug!(
                        target: "normalize",
                        sport = sport_key,
                        "skipping unusable match entry"
                    );
                }
            }
        }
    }

    events
}

/// Coerce a field that is sometimes a single object and sometimes a list
/// of such objects into a uniform list-of-refs. Null coerces to empty.
fn coerce_list(v: &Value) -> Vec<&Value> {
    match v {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Read a field that may be plain (`id`) or attribute-prefixed (`@id`).
fn attr<'a>(obj: &'a Value, key: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| obj.get(format!("@{key}")))
}

/// Extract match entries from a category, handling both `matches: [..]`
/// and the nested `matches: { match: .. }` wrapper.
fn match_entries(category: &Value) -> Vec<&Value> {
    let container = match attr(category, "matches").or_else(|| attr(category, "match")) {
        Some(c) => c,
        None => return Vec::new(),
    };

    // Singleton shape nests the actual entries one level deeper.
    if let Some(inner) = container.get("match") {
        return coerce_list(inner);
    }
    coerce_list(container)
}

fn normalize_match(raw: &Value, sport_key: &str) -> Option<CanonicalEvent> {
    if !raw.is_object() {
        return None;
    }

    if has_degenerate_odds(raw) {
        warn!(
            target: "normalize",
            sport = sport_key,
            "match entry carries a string where an odds list was expected; skipping"
        );
        return None;
    }

    let id = attr(raw, "id").and_then(value_to_string)?;
    let (home, away) = team_pair(raw)?;
    let home_team = team_name(home)?;
    let away_team = team_name(away)?;

    let raw_status = attr(raw, "status")
        .and_then(value_to_string)
        .unwrap_or_default();
    let mut status = map_status(&raw_status);

    let home_score = team_score(home);
    let away_score = team_score(away);

    // A finished event without both scores cannot be settled; keep it out
    // of Finished so the evaluator never sees it (conservative downgrade).
    if status == EventStatus::Finished && (home_score.is_none() || away_score.is_none()) {
        debug!(
            target: "normalize",
            sport = sport_key,
            match_id = %id,
            "finished match missing numeric scores; treating as scheduled"
        );
        status = EventStatus::Scheduled;
    }

    let markets = match (status, home_score, away_score) {
        (EventStatus::Finished, Some(h), Some(a)) => derive_markets(h, a),
        _ => HashMap::new(),
    };

    Some(CanonicalEvent {
        id,
        sport_key: sport_key.to_string(),
        home_team,
        away_team,
        status,
        home_score,
        away_score,
        markets,
    })
}

/// A market/odds field holding a bare string marks a degenerate record.
fn has_degenerate_odds(raw: &Value) -> bool {
    match attr(raw, "odds") {
        Some(Value::String(_)) => true,
        Some(odds) => matches!(
            attr(odds, "type").or_else(|| attr(odds, "bookmaker")),
            Some(Value::String(_))
        ),
        None => false,
    }
}

/// Locate the home/away team objects across the naming variants observed
/// per sport (localteam/visitorteam, hometeam/awayteam, home/away).
fn team_pair(raw: &Value) -> Option<(&Value, &Value)> {
    const PAIRS: [(&str, &str); 4] = [
        ("localteam", "visitorteam"),
        ("hometeam", "awayteam"),
        ("home_team", "away_team"),
        ("home", "away"),
    ];
    for (h, a) in PAIRS {
        if let (Some(home), Some(away)) = (attr(raw, h), attr(raw, a)) {
            return Some((home, away));
        }
    }
    None
}

fn team_name(team: &Value) -> Option<String> {
    match team {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => attr(team, "name").and_then(value_to_string),
    }
}

fn team_score(team: &Value) -> Option<i64> {
    const SCORE_KEYS: [&str; 4] = ["goals", "totalscore", "score", "runs"];
    SCORE_KEYS
        .iter()
        .find_map(|k| attr(team, k))
        .and_then(parse_score)
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_score(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn derive_markets(home: i64, away: i64) -> HashMap<String, MarketResult> {
    let winner = if home > away {
        Winner::Home
    } else if home < away {
        Winner::Away
    } else {
        Winner::Draw
    };

    HashMap::from([
        (
            MARKET_MATCH_RESULT.to_string(),
            MarketResult::MatchResult { winner },
        ),
        (MARKET_TOTAL.to_string(), MarketResult::Total { points: home + away }),
        (
            MARKET_HANDICAP.to_string(),
            MarketResult::Handicap { home_margin: home - away },
        ),
    ])
}

static STATUS_ALIASES: Lazy<HashMap<&'static str, EventStatus>> = Lazy::new(|| {
    use EventStatus::*;
    HashMap::from([
        ("finished", Finished),
        ("fin", Finished),
        ("ft", Finished),
        ("final", Finished),
        ("full-time", Finished),
        ("full time", Finished),
        ("aet", Finished),
        ("after extra time", Finished),
        ("after over", Finished),
        ("after penalties", Finished),
        ("ended", Finished),
        ("cancelled", Cancelled),
        ("canceled", Cancelled),
        ("cancl.", Cancelled),
        ("abandoned", Cancelled),
        ("aban.", Cancelled),
        ("postponed", Postponed),
        ("postp.", Postponed),
        ("suspended", Postponed),
        ("susp.", Postponed),
        ("live", Live),
        ("in progress", Live),
        ("1st half", Live),
        ("2nd half", Live),
        ("half time", Live),
        ("halftime", Live),
        ("ht", Live),
        ("break", Live),
        ("extra time", Live),
        ("penalties", Live),
        ("overtime", Live),
        ("not started", Scheduled),
        ("ns", Scheduled),
        ("scheduled", Scheduled),
        ("tba", Scheduled),
    ])
});

/// Map a provider status string to a canonical state.
///
/// Unrecognized strings map to Scheduled, never Finished: a wager held
/// pending is recoverable, a wrongly-settled one is not.
pub fn map_status(raw: &str) -> EventStatus {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return EventStatus::Scheduled;
    }
    if let Some(status) = STATUS_ALIASES.get(s.as_str()) {
        return *status;
    }
    // Clock-like markers: "45'", "set 2", "q3", "top 7", "bot 3".
    if s.ends_with('\'')
        || s.starts_with("set ")
        || s.starts_with("q")
            && s[1..].parse::<u8>().is_ok()
        || s.starts_with("top ")
        || s.starts_with("bot ")
        || s.ends_with(" period")
    {
        return EventStatus::Live;
    }
    EventStatus::Scheduled
}
