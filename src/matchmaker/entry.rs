//! Ticket entries and typed views over their property bags
//!
//! Entries carry a string-keyed bag of dynamic properties supplied by the
//! session registry. `EntryProperties` is the validated, typed view over the
//! recognized keys; unknown keys are ignored.

use crate::rating::model::{default_rating, team_strength};
use crate::types::{EntryPresence, GameMode, TicketId};
use crate::utils::parse_flexible_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillratings::weng_lin::WengLinRating;
use std::collections::HashMap;

/// Property key: partition tag, required on every entry
pub const PROP_GROUP_ID: &str = "group_id";
/// Property key: game mode, required on every entry
pub const PROP_GAME_MODE: &str = "game_mode";
/// Property key: per-player reachability cap in milliseconds
pub const PROP_MAX_RTT: &str = "max_rtt";
/// Property key prefix: measured RTT to a named server
pub const PROP_RTT_PREFIX: &str = "rtt_";
/// Property key: smoothed rank percentile in [0, 1]
pub const PROP_RANK_PERCENTILE: &str = "rank_percentile";
/// Property key: starvation-priority threshold timestamp
pub const PROP_PRIORITY_THRESHOLD: &str = "priority_threshold";
/// Property key: cohort division tag
pub const PROP_DIVISION: &str = "division";
/// Property key: stored rating mean
pub const PROP_RATING_MU: &str = "rating_mu";
/// Property key: stored rating standard deviation
pub const PROP_RATING_SIGMA: &str = "rating_sigma";

/// Reachability cap applied when an entry has no usable max_rtt property (ms)
pub const DEFAULT_MAX_RTT_MS: f64 = 500.0;

/// One queued player (or party member) proposed for a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEntry {
    pub ticket: TicketId,
    pub presence: EntryPresence,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

/// An ordered tuple of entries proposed as a potential match
pub type Candidate = Vec<TicketEntry>;

impl TicketEntry {
    pub fn properties(&self) -> EntryProperties<'_> {
        EntryProperties(&self.properties)
    }
}

/// Typed view over an entry's property bag
#[derive(Debug, Clone, Copy)]
pub struct EntryProperties<'a>(&'a HashMap<String, serde_json::Value>);

impl<'a> EntryProperties<'a> {
    pub fn group_id(&self) -> Option<&'a str> {
        self.0
            .get(PROP_GROUP_ID)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn game_mode(&self) -> Option<GameMode> {
        self.0
            .get(PROP_GAME_MODE)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }

    pub fn max_rtt(&self) -> f64 {
        self.0
            .get(PROP_MAX_RTT)
            .and_then(|v| v.as_f64())
            .filter(|rtt| *rtt > 0.0)
            .unwrap_or(DEFAULT_MAX_RTT_MS)
    }

    /// Server keys this player can reach within their RTT cap, with the
    /// measured RTT for each.
    pub fn reachable_servers(&self) -> impl Iterator<Item = (&'a str, f64)> + '_ {
        let max_rtt = self.max_rtt();
        self.0.iter().filter_map(move |(key, value)| {
            if !key.starts_with(PROP_RTT_PREFIX) {
                return None;
            }
            let rtt = value.as_f64()?;
            (rtt <= max_rtt).then_some((key.as_str(), rtt))
        })
    }

    pub fn rank_percentile(&self) -> Option<f64> {
        self.0.get(PROP_RANK_PERCENTILE).and_then(|v| v.as_f64())
    }

    pub fn priority_threshold(&self) -> Option<DateTime<Utc>> {
        self.0
            .get(PROP_PRIORITY_THRESHOLD)
            .and_then(parse_flexible_timestamp)
    }

    pub fn division(&self) -> Option<&'a str> {
        self.0
            .get(PROP_DIVISION)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Stored rating, when both components are present
    pub fn rating(&self) -> Option<WengLinRating> {
        let rating = self.0.get(PROP_RATING_MU)?.as_f64()?;
        let uncertainty = self.0.get(PROP_RATING_SIGMA)?.as_f64()?;
        Some(WengLinRating {
            rating,
            uncertainty,
        })
    }
}

/// A ticket entry enriched with its rating
#[derive(Debug, Clone)]
pub struct RatedEntry {
    pub entry: TicketEntry,
    pub rating: WengLinRating,
}

impl RatedEntry {
    /// Rate an entry from its supplied properties, defaulting when absent.
    pub fn new(entry: TicketEntry) -> Self {
        let rating = entry.properties().rating().unwrap_or_else(default_rating);
        Self { entry, rating }
    }
}

/// An ordered team of rated entries
pub type RatedTeam = Vec<RatedEntry>;

/// Sum of rating means across a team
pub fn rated_team_strength(team: &[RatedEntry]) -> f64 {
    team_strength(
        &team
            .iter()
            .map(|e| e.rating)
            .collect::<Vec<WengLinRating>>(),
    )
}

/// A balanced candidate with its outcome prediction and fairness metrics
#[derive(Debug, Clone)]
pub struct PredictedMatch {
    pub team_a: RatedTeam,
    pub team_b: RatedTeam,
    /// Predicted draw probability in [0, 1]
    pub draw: f64,
    /// Total players across both teams
    pub size: usize,
    pub avg_percentile_a: f64,
    pub avg_percentile_b: f64,
    /// Distinct division tags across both teams; entries without a division
    /// each count as their own singleton division
    pub division_count: usize,
    /// Earliest starvation-priority threshold across entrants
    pub priority_expiry: DateTime<Utc>,
}

impl PredictedMatch {
    /// All entrants, team A first. Team order within each side is preserved.
    pub fn entrants(&self) -> impl Iterator<Item = &RatedEntry> {
        self.team_a.iter().chain(self.team_b.iter())
    }

    /// Absolute difference between the two teams' average rank percentiles
    pub fn rank_spread(&self) -> f64 {
        (self.avg_percentile_a - self.avg_percentile_b).abs()
    }

    /// Whether any entrant's priority threshold has elapsed.
    ///
    /// Only explicit thresholds count; entries without one never confer
    /// priority.
    pub fn has_priority(&self, now: DateTime<Utc>) -> bool {
        self.entrants()
            .filter_map(|e| e.entry.properties().priority_threshold())
            .any(|threshold| now > threshold)
    }

    /// The match as an ordered entry list: team A then team B.
    pub fn to_candidate(&self) -> Candidate {
        self.entrants().map(|e| e.entry.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry_with_props(props: &[(&str, serde_json::Value)]) -> TicketEntry {
        TicketEntry {
            ticket: "T1".to_string(),
            presence: EntryPresence {
                user_id: "u1".to_string(),
                session_id: "s1".to_string(),
                username: "player".to_string(),
            },
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_required_properties() {
        let entry = entry_with_props(&[
            (PROP_GROUP_ID, json!("guild-1")),
            (PROP_GAME_MODE, json!("arena_public")),
        ]);
        assert_eq!(entry.properties().group_id(), Some("guild-1"));
        assert_eq!(entry.properties().game_mode(), Some(GameMode::ArenaPublic));

        let empty = entry_with_props(&[(PROP_GROUP_ID, json!(""))]);
        assert_eq!(empty.properties().group_id(), None);
        assert_eq!(empty.properties().game_mode(), None);
    }

    #[test]
    fn test_max_rtt_default_and_guard() {
        let entry = entry_with_props(&[]);
        assert_eq!(entry.properties().max_rtt(), DEFAULT_MAX_RTT_MS);

        let zero = entry_with_props(&[(PROP_MAX_RTT, json!(0))]);
        assert_eq!(zero.properties().max_rtt(), DEFAULT_MAX_RTT_MS);

        let custom = entry_with_props(&[(PROP_MAX_RTT, json!(120))]);
        assert_eq!(custom.properties().max_rtt(), 120.0);
    }

    #[test]
    fn test_reachable_servers_respects_cap() {
        let entry = entry_with_props(&[
            (PROP_MAX_RTT, json!(100)),
            ("rtt_us_east", json!(50.0)),
            ("rtt_us_west", json!(150.0)),
            ("rtt_eu", json!(100.0)),
            ("unrelated", json!(5.0)),
        ]);

        let mut servers: Vec<_> = entry.properties().reachable_servers().collect();
        servers.sort_by(|a, b| a.0.cmp(b.0));
        assert_eq!(servers, vec![("rtt_eu", 100.0), ("rtt_us_east", 50.0)]);
    }

    #[test]
    fn test_rating_requires_both_components() {
        let entry = entry_with_props(&[(PROP_RATING_MU, json!(30.0))]);
        assert!(entry.properties().rating().is_none());

        let entry = entry_with_props(&[
            (PROP_RATING_MU, json!(30.0)),
            (PROP_RATING_SIGMA, json!(6.0)),
        ]);
        let rating = entry.properties().rating().unwrap();
        assert_eq!(rating.rating, 30.0);
        assert_eq!(rating.uncertainty, 6.0);

        let rated = RatedEntry::new(entry_with_props(&[]));
        assert_eq!(rated.rating.rating, 25.0);
    }

    #[test]
    fn test_priority_threshold_accepts_both_encodings() {
        let numeric = entry_with_props(&[(PROP_PRIORITY_THRESHOLD, json!(1714521600))]);
        let text = entry_with_props(&[(
            PROP_PRIORITY_THRESHOLD,
            json!("2024-05-01T00:00:00Z"),
        )]);
        assert_eq!(
            numeric.properties().priority_threshold(),
            text.properties().priority_threshold()
        );
    }
}
