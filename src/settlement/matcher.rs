//! Resolves a wager leg to one canonical event.
//!
//! Exact event-ID matching is the primary strategy. The name-similarity
//! fallback exists because some historical windows return a match under a
//! different identifier than the one recorded at placement time; it is a
//! heuristic and logs at warn level so mis-settlement risk can be audited
//! separately from exact hits.

use tracing::{debug, info, warn};

use crate::feed::CanonicalEvent;
use crate::utils::text::{fuzzy_contains, normalize_name, split_match_name};

use super::{DisabledEvents, Leg};

/// Result of matching one leg against a canonical event set.
#[derive(Debug)]
pub enum LegMatch<'a> {
    Exact(&'a CanonicalEvent),
    Fuzzy(&'a CanonicalEvent),
    NotFound,
}

/// Match a leg against events already filtered to `leg.sport_key`.
///
/// Operator overrides take precedence over any match: a disabled
/// (event, market) pair yields NotFound even when an exact ID hit exists.
/// NotFound is not an error — the wager stays pending and is retried.
pub fn match_leg<'a>(
    leg: &Leg,
    events: &'a [CanonicalEvent],
    disabled: &DisabledEvents,
) -> LegMatch<'a> {
    if disabled.contains(&leg.match_id, &leg.market_key) {
        info!(
            target: "matcher",
            match_id = %leg.match_id,
            market = %leg.market_key,
            "event disabled by operator; skipping match"
        );
        return LegMatch::NotFound;
    }

    if let Some(event) = events.iter().find(|e| e.id == leg.match_id) {
        debug!(
            target: "matcher",
            match_id = %leg.match_id,
            sport = %leg.sport_key,
            "exact event-ID match"
        );
        return LegMatch::Exact(event);
    }

    match fuzzy_match(leg, events) {
        Some(event) if disabled.contains(&event.id, &leg.market_key) => {
            info!(
                target: "matcher",
                event_id = %event.id,
                market = %leg.market_key,
                "fuzzy candidate disabled by operator; skipping match"
            );
            LegMatch::NotFound
        }
        Some(event) => {
            warn!(
                target: "matcher",
                match_id = %leg.match_id,
                event_id = %event.id,
                match_name = %leg.match_name,
                "name-similarity fallback match; verify against mis-settlement"
            );
            LegMatch::Fuzzy(event)
        }
        None => LegMatch::NotFound,
    }
}

fn fuzzy_match<'a>(leg: &Leg, events: &'a [CanonicalEvent]) -> Option<&'a CanonicalEvent> {
    let (home_token, away_token) = split_match_name(&leg.match_name)?;
    events.iter().find(|e| {
        fuzzy_contains(&home_token, &normalize_name(&e.home_team))
            && fuzzy_contains(&away_token, &normalize_name(&e.away_team))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::feed::EventStatus;
    use crate::settlement::LegTiming;

    fn event(id: &str, home: &str, away: &str) -> CanonicalEvent {
        CanonicalEvent {
            id: id.to_string(),
            sport_key: "soccer".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            status: EventStatus::Finished,
            home_score: Some(1),
            away_score: Some(0),
            markets: HashMap::new(),
        }
    }

    fn leg(match_id: &str, match_name: &str) -> Leg {
        Leg {
            match_id: match_id.to_string(),
            match_name: match_name.to_string(),
            sport_key: "soccer".to_string(),
            market_key: "match_result".to_string(),
            selection: "Lyon".to_string(),
            odds: 1.8,
            timing: LegTiming::Pregame,
        }
    }

    #[test]
    fn exact_id_wins_over_name() {
        let events = vec![event("100", "Lyon", "Lens"), event("200", "PSG", "Nice")];
        let m = match_leg(&leg("200", "Lyon vs Lens"), &events, &DisabledEvents::default());
        assert!(matches!(m, LegMatch::Exact(e) if e.id == "200"));
    }

    #[test]
    fn fuzzy_fallback_on_identifier_drift() {
        let events = vec![event("999", "Olympique Lyon", "RC Lens")];
        let m = match_leg(&leg("100", "Lyon vs Lens"), &events, &DisabledEvents::default());
        assert!(matches!(m, LegMatch::Fuzzy(e) if e.id == "999"));
    }

    #[test]
    fn fuzzy_requires_both_teams() {
        let events = vec![event("999", "Olympique Lyon", "Nice")];
        let m = match_leg(&leg("100", "Lyon vs Lens"), &events, &DisabledEvents::default());
        assert!(matches!(m, LegMatch::NotFound));
    }

    #[test]
    fn disabled_event_beats_exact_match() {
        let events = vec![event("100", "Lyon", "Lens")];
        let disabled = DisabledEvents::from_pairs([(
            "100".to_string(),
            "match_result".to_string(),
        )]);
        let m = match_leg(&leg("100", "Lyon vs Lens"), &events, &disabled);
        assert!(matches!(m, LegMatch::NotFound));
    }

    #[test]
    fn disabled_event_beats_fuzzy_match() {
        let events = vec![event("999", "Olympique Lyon", "RC Lens")];
        let disabled =
            DisabledEvents::from_pairs([("999".to_string(), "match_result".to_string())]);
        let m = match_leg(&leg("100", "Lyon vs Lens"), &events, &disabled);
        assert!(matches!(m, LegMatch::NotFound));
    }

    #[test]
    fn disabled_other_market_does_not_interfere() {
        let events = vec![event("100", "Lyon", "Lens")];
        let disabled = DisabledEvents::from_pairs([("100".to_string(), "total".to_string())]);
        let m = match_leg(&leg("100", "Lyon vs Lens"), &events, &disabled);
        assert!(matches!(m, LegMatch::Exact(_)));
    }
}
