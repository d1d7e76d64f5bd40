//! The skill-based matchmaker pipeline
//!
//! Stateless per invocation except for the latest-run snapshot, which is
//! kept behind a lock for operator inspection. Readers may observe a stale
//! but self-consistent snapshot; last writer wins.

use crate::matchmaker::balance::balance_by_ticket;
use crate::matchmaker::entry::{Candidate, PredictedMatch, RatedEntry, TicketEntry};
use crate::rating::model::predict_draw;
use crate::types::{GameMode, SessionId, UserId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use skillratings::weng_lin::{WengLinConfig, WengLinRating};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info};

/// Tuning for the candidate pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rank-spread difference below which two predictions tie in arena sort
    pub max_rank_delta: f64,
    /// Percentile assumed for players lacking a rank_percentile property
    pub default_rank_percentile: f64,
    /// Weng-Lin parameters for draw prediction
    pub rating_config: WengLinConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_rank_delta: 0.10,
            default_rank_percentile: 0.5,
            rating_config: WengLinConfig::default(),
        }
    }
}

/// Telemetry counts for candidates rejected per filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub duplicate: usize,
    pub odd_size: usize,
    pub no_matching_servers: usize,
}

/// Result of one pipeline invocation
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub group_id: Option<String>,
    pub mode: Option<GameMode>,
    /// Accepted matches as ordered entry lists (team A then team B)
    pub selected: Vec<Candidate>,
    pub filter_counts: FilterCounts,
    /// Queued users that did not make it into any accepted match
    pub unmatched_players: Vec<UserId>,
}

/// Latest `(candidates, selected)` pair kept for operator inspection
#[derive(Debug, Clone, Serialize)]
pub struct MatchmakerSnapshot {
    pub candidates: Vec<Candidate>,
    pub selected: Vec<Candidate>,
    pub filter_counts: FilterCounts,
    pub completed_at: DateTime<Utc>,
}

/// The matchmaker: filter, predict, sort, select
pub struct SkillBasedMatchmaker {
    config: PipelineConfig,
    latest: RwLock<Option<Arc<MatchmakerSnapshot>>>,
    dump_lock: Mutex<()>,
}

impl SkillBasedMatchmaker {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            latest: RwLock::new(None),
            dump_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline over a batch of candidates.
    ///
    /// Per-candidate rejections become telemetry counts; a missing partition
    /// key on the first entry is fatal for the invocation and yields no
    /// matches.
    pub fn match_candidates(&self, candidates: Vec<Candidate>) -> MatchOutcome {
        if candidates.is_empty() || candidates[0].is_empty() {
            return MatchOutcome::default();
        }

        let first = &candidates[0][0];
        let group_id = match first.properties().group_id() {
            Some(id) => id.to_string(),
            None => {
                error!("Group ID not found in entry properties.");
                return MatchOutcome::default();
            }
        };
        let mode = match first.properties().game_mode() {
            Some(mode) => mode,
            None => {
                error!("Game mode not found in entry properties.");
                return MatchOutcome::default();
            }
        };

        let all_players: BTreeSet<UserId> = candidates
            .iter()
            .flatten()
            .map(|e| e.presence.user_id.clone())
            .collect();

        let mut filter_counts = FilterCounts::default();
        let survivors = self.filter_candidates(&candidates, &mut filter_counts);

        let mut predictions = self.build_predictions(&survivors);

        if predictions.is_empty() {
            info!(
                group_id = %group_id,
                mode = %mode,
                duplicate = filter_counts.duplicate,
                odd_size = filter_counts.odd_size,
                no_matching_servers = filter_counts.no_matching_servers,
                "No predictions made. Matchmaker cannot run."
            );
            return MatchOutcome {
                group_id: Some(group_id),
                mode: Some(mode),
                filter_counts,
                ..MatchOutcome::default()
            };
        }

        match mode {
            GameMode::CombatPublic => sort_combat(&mut predictions),
            _ => sort_arena(&mut predictions, self.config.max_rank_delta),
        }

        let selected = assemble_unique_matches(&predictions);

        let included_players: HashSet<&str> = selected
            .iter()
            .flatten()
            .map(|e| e.presence.user_id.as_str())
            .collect();
        let unmatched_players: Vec<UserId> = all_players
            .iter()
            .filter(|p| !included_players.contains(p.as_str()))
            .cloned()
            .collect();

        info!(
            group_id = %group_id,
            mode = %mode,
            num_player_total = all_players.len(),
            num_player_included = included_players.len(),
            num_match_options = candidates.len(),
            num_match_made = selected.len(),
            duplicate = filter_counts.duplicate,
            odd_size = filter_counts.odd_size,
            no_matching_servers = filter_counts.no_matching_servers,
            num_unmatched = unmatched_players.len(),
            "Skill-based matchmaker completed."
        );

        self.store_snapshot(MatchmakerSnapshot {
            candidates,
            selected: selected.clone(),
            filter_counts,
            completed_at: current_timestamp(),
        });

        MatchOutcome {
            group_id: Some(group_id),
            mode: Some(mode),
            selected,
            filter_counts,
            unmatched_players,
        }
    }

    /// Dedup, drop odd sizes, and require a common reachable server.
    fn filter_candidates(
        &self,
        candidates: &[Candidate],
        counts: &mut FilterCounts,
    ) -> Vec<Candidate> {
        let mut seen_rosters: HashSet<String> = HashSet::with_capacity(candidates.len());
        let mut survivors = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if candidate.is_empty() {
                // Already-filtered sentinel; skip without counting.
                continue;
            }

            let mut roster: Vec<&str> = candidate.iter().map(|e| e.ticket.as_str()).collect();
            roster.sort_unstable();
            if !seen_rosters.insert(roster.join(",")) {
                counts.duplicate += 1;
                continue;
            }

            if candidate.len() % 2 != 0 {
                counts.odd_size += 1;
                continue;
            }

            if eligible_servers(candidate).is_empty() {
                counts.no_matching_servers += 1;
                continue;
            }

            survivors.push(candidate.clone());
        }

        survivors
    }

    /// Balance each surviving candidate and predict its outcome.
    fn build_predictions(&self, candidates: &[Candidate]) -> Vec<PredictedMatch> {
        candidates
            .iter()
            .map(|candidate| self.predict(candidate))
            .collect()
    }

    fn predict(&self, candidate: &Candidate) -> PredictedMatch {
        let (team_a, team_b) = balance_by_ticket(candidate);

        let ratings_a: Vec<WengLinRating> = team_a.iter().map(|e| e.rating).collect();
        let ratings_b: Vec<WengLinRating> = team_b.iter().map(|e| e.rating).collect();
        let draw = predict_draw(&ratings_a, &ratings_b, &self.config.rating_config);

        let avg_percentile = |team: &[RatedEntry]| -> f64 {
            if team.is_empty() {
                return self.config.default_rank_percentile;
            }
            team.iter()
                .map(|e| {
                    e.entry
                        .properties()
                        .rank_percentile()
                        .unwrap_or(self.config.default_rank_percentile)
                })
                .sum::<f64>()
                / team.len() as f64
        };

        let mut division_count = 0usize;
        let mut named_divisions: HashSet<&str> = HashSet::new();
        for entry in team_a.iter().chain(team_b.iter()) {
            match entry.entry.properties().division() {
                Some(division) => {
                    if named_divisions.insert(division) {
                        division_count += 1;
                    }
                }
                // Entries without a division form their own singleton.
                None => division_count += 1,
            }
        }

        let priority_expiry = team_a
            .iter()
            .chain(team_b.iter())
            .filter_map(|e| e.entry.properties().priority_threshold())
            .min()
            .unwrap_or_else(current_timestamp);

        let size = team_a.len() + team_b.len();
        let avg_percentile_a = avg_percentile(&team_a);
        let avg_percentile_b = avg_percentile(&team_b);

        PredictedMatch {
            team_a,
            team_b,
            draw,
            size,
            avg_percentile_a,
            avg_percentile_b,
            division_count,
            priority_expiry,
        }
    }

    fn store_snapshot(&self, snapshot: MatchmakerSnapshot) {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        *latest = Some(Arc::new(snapshot));
    }

    /// The last non-empty run, if any. May be stale relative to concurrent
    /// invocations.
    pub fn latest_snapshot(&self) -> Option<Arc<MatchmakerSnapshot>> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Acquire the candidate-dump guard without blocking. Concurrent
    /// invocations that lose the race skip the dump side effect. The guard
    /// may be held across awaits.
    pub fn try_dump_guard(&self) -> Option<MutexGuard<'_, ()>> {
        self.dump_lock.try_lock().ok()
    }
}

impl Default for SkillBasedMatchmaker {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

/// Servers every player in the candidate can reach within their RTT cap,
/// mapped to the mean measured RTT.
pub fn eligible_servers(candidate: &[TicketEntry]) -> HashMap<String, f64> {
    let mut server_rtts: HashMap<String, Vec<f64>> = HashMap::new();

    for entry in candidate {
        for (server, rtt) in entry.properties().reachable_servers() {
            server_rtts.entry(server.to_string()).or_default().push(rtt);
        }
    }

    // A server unreachable to any one player is unreachable to the match.
    server_rtts.retain(|_, rtts| rtts.len() == candidate.len());

    server_rtts
        .into_iter()
        .map(|(server, rtts)| {
            let mean = rtts.iter().sum::<f64>() / rtts.len() as f64;
            (server, mean)
        })
        .collect()
}

/// Combat policy: larger matches first, then likelier draws.
pub fn sort_combat(predictions: &mut [PredictedMatch]) {
    predictions.sort_by(|a, b| {
        b.size
            .cmp(&a.size)
            .then_with(|| b.draw.partial_cmp(&a.draw).unwrap_or(Ordering::Equal))
    });
}

/// Arena policy: starvation priority, then rank spread, then size, then draw.
pub fn sort_arena(predictions: &mut [PredictedMatch], max_rank_delta: f64) {
    let now = current_timestamp();

    predictions.sort_by(|a, b| {
        let a_priority = a.has_priority(now);
        let b_priority = b.has_priority(now);
        if a_priority != b_priority {
            return if a_priority {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        // Rank spreads only order the pair once they differ meaningfully.
        let spread_a = a.rank_spread();
        let spread_b = b.rank_spread();
        if (spread_a - spread_b).abs() > max_rank_delta {
            return spread_a.partial_cmp(&spread_b).unwrap_or(Ordering::Equal);
        }

        b.size
            .cmp(&a.size)
            .then_with(|| b.draw.partial_cmp(&a.draw).unwrap_or(Ordering::Equal))
    });
}

/// Greedily accept predictions whose session ids are all unused.
pub fn assemble_unique_matches(predictions: &[PredictedMatch]) -> Vec<Candidate> {
    let mut seen: HashSet<SessionId> = HashSet::new();
    let mut selected = Vec::with_capacity(predictions.len());

    'outer: for prediction in predictions {
        for entrant in prediction.entrants() {
            if seen.contains(&entrant.entry.presence.session_id) {
                continue 'outer;
            }
        }

        let mut matched = Vec::with_capacity(prediction.size);
        for entrant in prediction.entrants() {
            seen.insert(entrant.entry.presence.session_id.clone());
            matched.push(entrant.entry.clone());
        }
        selected.push(matched);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryPresence;
    use serde_json::json;
    use std::collections::HashMap as Map;

    fn entry(ticket: &str, user: &str, props: &[(&str, serde_json::Value)]) -> TicketEntry {
        let mut properties: Map<String, serde_json::Value> = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        properties
            .entry("group_id".to_string())
            .or_insert_with(|| json!("guild-1"));
        properties
            .entry("game_mode".to_string())
            .or_insert_with(|| json!("arena_public"));
        TicketEntry {
            ticket: ticket.to_string(),
            presence: EntryPresence {
                user_id: user.to_string(),
                session_id: format!("session-{}", user),
                username: user.to_string(),
            },
            properties,
        }
    }

    fn reachable(ticket: &str, user: &str) -> TicketEntry {
        entry(ticket, user, &[("rtt_us_east", json!(40.0))])
    }

    #[test]
    fn test_eligible_servers_all_within_cap() {
        let candidate = vec![
            entry(
                "T1",
                "a",
                &[
                    ("max_rtt", json!(110)),
                    ("rtt_server1", json!(50.0)),
                    ("rtt_server2", json!(60.0)),
                ],
            ),
            entry(
                "T2",
                "b",
                &[("rtt_server1", json!(40.0)), ("rtt_server2", json!(55.0))],
            ),
        ];

        let servers = eligible_servers(&candidate);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers["rtt_server1"], 45.0);
        assert_eq!(servers["rtt_server2"], 57.5);
    }

    #[test]
    fn test_eligible_servers_one_exceeds_cap() {
        let candidate = vec![
            entry(
                "T1",
                "a",
                &[
                    ("max_rtt", json!(110)),
                    ("rtt_server1", json!(150.0)),
                    ("rtt_server2", json!(60.0)),
                ],
            ),
            entry(
                "T2",
                "b",
                &[
                    ("max_rtt", json!(110)),
                    ("rtt_server1", json!(40.0)),
                    ("rtt_server2", json!(55.0)),
                ],
            ),
        ];

        let servers = eligible_servers(&candidate);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers["rtt_server2"], 57.5);
    }

    #[test]
    fn test_eligible_servers_no_common_server() {
        let candidate = vec![
            entry("T1", "a", &[("rtt_server1", json!(50.0))]),
            entry("T2", "b", &[("rtt_server2", json!(55.0))]),
        ];
        assert!(eligible_servers(&candidate).is_empty());
    }

    #[test]
    fn test_guard_on_empty_input() {
        let matchmaker = SkillBasedMatchmaker::default();
        assert!(matchmaker.match_candidates(vec![]).selected.is_empty());
        assert!(matchmaker.match_candidates(vec![vec![]]).selected.is_empty());
    }

    #[test]
    fn test_missing_partition_keys_are_fatal() {
        let matchmaker = SkillBasedMatchmaker::default();
        let mut first = reachable("T1", "a");
        first.properties.remove("group_id");
        let outcome = matchmaker.match_candidates(vec![vec![first, reachable("T2", "b")]]);
        assert!(outcome.selected.is_empty());
        assert!(outcome.group_id.is_none());
    }

    #[test]
    fn test_duplicate_rosters_collapse() {
        let matchmaker = SkillBasedMatchmaker::default();
        let candidates = vec![
            vec![reachable("T1", "a"), reachable("T2", "b")],
            // Same ticket multiset, different order.
            vec![reachable("T2", "b"), reachable("T1", "a")],
        ];

        let outcome = matchmaker.match_candidates(candidates);
        assert_eq!(outcome.filter_counts.duplicate, 1);
        assert_eq!(outcome.selected.len(), 1);
    }

    #[test]
    fn test_sort_combat_prefers_size_then_draw() {
        let matchmaker = SkillBasedMatchmaker::default();
        let small = matchmaker.predict(&vec![reachable("T1", "a"), reachable("T2", "b")]);
        let large = matchmaker.predict(&vec![
            reachable("T3", "c"),
            reachable("T4", "d"),
            reachable("T5", "e"),
            reachable("T6", "f"),
        ]);

        let mut predictions = vec![small.clone(), large.clone()];
        sort_combat(&mut predictions);
        assert_eq!(predictions[0].size, 4);

        let mut likely = small.clone();
        likely.draw = 0.9;
        let mut unlikely = small;
        unlikely.draw = 0.2;
        let mut predictions = vec![unlikely, likely];
        sort_combat(&mut predictions);
        assert_eq!(predictions[0].draw, 0.9);
    }

    #[test]
    fn test_sort_arena_priority_beats_draw() {
        let matchmaker = SkillBasedMatchmaker::default();
        let plain = matchmaker.predict(&vec![reachable("T1", "a"), reachable("T2", "b")]);
        let mut starving = matchmaker.predict(&vec![
            entry(
                "T3",
                "c",
                &[
                    ("rtt_us_east", json!(40.0)),
                    ("priority_threshold", json!(current_timestamp().timestamp() - 10)),
                ],
            ),
            reachable("T4", "d"),
        ]);
        starving.draw = 0.0;

        let mut best_draw = plain;
        best_draw.draw = 1.0;

        let mut predictions = vec![best_draw, starving];
        sort_arena(&mut predictions, 0.10);
        assert!(predictions[0].has_priority(current_timestamp()));
    }

    #[test]
    fn test_sort_arena_rank_spread_within_delta_ties() {
        let matchmaker = SkillBasedMatchmaker::default();
        let mut low_spread = matchmaker.predict(&vec![reachable("T1", "a"), reachable("T2", "b")]);
        low_spread.avg_percentile_a = 0.50;
        low_spread.avg_percentile_b = 0.52;
        let mut high_spread = matchmaker.predict(&vec![reachable("T3", "c"), reachable("T4", "d")]);
        high_spread.avg_percentile_a = 0.20;
        high_spread.avg_percentile_b = 0.70;

        // Spreads differ by 0.48: the low-spread match sorts first.
        let mut predictions = vec![high_spread.clone(), low_spread.clone()];
        sort_arena(&mut predictions, 0.10);
        assert!(predictions[0].rank_spread() < predictions[1].rank_spread());

        // Within the delta the stable sort preserves input order.
        let mut near = high_spread;
        near.avg_percentile_a = 0.50;
        near.avg_percentile_b = 0.58;
        near.draw = low_spread.draw;
        let mut predictions = vec![near.clone(), low_spread];
        sort_arena(&mut predictions, 0.10);
        assert_eq!(predictions[0].avg_percentile_b, near.avg_percentile_b);
    }

    #[test]
    fn test_assemble_unique_matches_skips_overlaps() {
        let matchmaker = SkillBasedMatchmaker::default();
        let m1 = matchmaker.predict(&vec![reachable("T1", "a"), reachable("T2", "b")]);
        let m2 = matchmaker.predict(&vec![reachable("T1", "a"), reachable("T3", "c")]);
        let m3 = matchmaker.predict(&vec![reachable("T4", "d"), reachable("T5", "e")]);

        let selected = assemble_unique_matches(&[m1, m2, m3]);
        assert_eq!(selected.len(), 2);
        let users: Vec<_> = selected
            .iter()
            .flatten()
            .map(|e| e.presence.user_id.as_str())
            .collect();
        assert!(users.contains(&"a") && users.contains(&"d"));
        assert!(!users.contains(&"c"));
    }

    #[test]
    fn test_snapshot_records_last_run() {
        let matchmaker = SkillBasedMatchmaker::default();
        assert!(matchmaker.latest_snapshot().is_none());

        let outcome =
            matchmaker.match_candidates(vec![vec![reachable("T1", "a"), reachable("T2", "b")]]);
        assert_eq!(outcome.selected.len(), 1);

        let snapshot = matchmaker.latest_snapshot().unwrap();
        assert_eq!(snapshot.candidates.len(), 1);
        assert_eq!(snapshot.selected.len(), 1);
    }

    #[test]
    fn test_dump_guard_is_exclusive() {
        let matchmaker = SkillBasedMatchmaker::default();
        let guard = matchmaker.try_dump_guard();
        assert!(guard.is_some());
        assert!(matchmaker.try_dump_guard().is_none());
        drop(guard);
        assert!(matchmaker.try_dump_guard().is_some());
    }
}
