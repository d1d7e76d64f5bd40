//! Greedy team balancing with absolute party preservation
//!
//! Members sharing a ticket id always land on the same team. Groups are
//! placed largest-and-strongest first onto whichever team is currently
//! weaker, which approximates balance without searching the full split
//! space.

use crate::matchmaker::entry::{rated_team_strength, RatedEntry, RatedTeam, TicketEntry};

/// Balance a candidate into two teams, grouping entries by ticket id.
pub fn balance_by_ticket(candidate: &[TicketEntry]) -> (RatedTeam, RatedTeam) {
    let mut groups: Vec<(String, Vec<RatedEntry>)> = Vec::new();
    for entry in candidate {
        let rated = RatedEntry::new(entry.clone());
        match groups.iter_mut().find(|(ticket, _)| *ticket == entry.ticket) {
            Some((_, members)) => members.push(rated),
            None => groups.push((entry.ticket.clone(), vec![rated])),
        }
    }

    let groups = groups.into_iter().map(|(_, members)| members).collect();
    create_balanced_match(groups, candidate.len() / 2)
}

/// Distribute whole ticket-groups onto two teams of `team_size`.
///
/// Groups that fit neither team are dropped; this cannot happen for
/// well-formed even-sized candidates whose party sizes sum correctly.
pub fn create_balanced_match(
    mut groups: Vec<Vec<RatedEntry>>,
    team_size: usize,
) -> (RatedTeam, RatedTeam) {
    let mut team_a: RatedTeam = Vec::with_capacity(team_size);
    let mut team_b: RatedTeam = Vec::with_capacity(team_size);

    // Largest parties first, then strongest first.
    groups.sort_by(|a, b| {
        b.len().cmp(&a.len()).then_with(|| {
            rated_team_strength(b)
                .partial_cmp(&rated_team_strength(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    for group in groups {
        let fits_a = team_a.len() + group.len() <= team_size;
        let fits_b = team_b.len() + group.len() <= team_size;
        let a_preferred = rated_team_strength(&team_a) <= rated_team_strength(&team_b);

        if fits_a && (!fits_b || a_preferred) {
            team_a.extend(group);
        } else if fits_b {
            team_b.extend(group);
        }
    }

    // Strongest players first within each team.
    for team in [&mut team_a, &mut team_b] {
        team.sort_by(|a, b| {
            b.rating
                .rating
                .partial_cmp(&a.rating.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    // Team A (blue) is conventionally the stronger side.
    if rated_team_strength(&team_a) < rated_team_strength(&team_b) {
        std::mem::swap(&mut team_a, &mut team_b);
    }

    (team_a, team_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryPresence;
    use serde_json::json;
    use std::collections::HashMap;

    fn entry(ticket: &str, user: &str, mu: f64) -> TicketEntry {
        let mut properties = HashMap::new();
        properties.insert("rating_mu".to_string(), json!(mu));
        properties.insert("rating_sigma".to_string(), json!(25.0 / 3.0));
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

    fn team_tickets(team: &[RatedEntry]) -> Vec<&str> {
        team.iter().map(|e| e.entry.ticket.as_str()).collect()
    }

    #[test]
    fn test_parties_are_never_split() {
        let candidate = vec![
            entry("T1", "a", 26.0),
            entry("T1", "b", 24.0),
            entry("T2", "c", 25.0),
            entry("T3", "d", 25.0),
        ];

        let (team_a, team_b) = balance_by_ticket(&candidate);
        assert_eq!(team_a.len(), 2);
        assert_eq!(team_b.len(), 2);

        let a = team_tickets(&team_a);
        let b = team_tickets(&team_b);
        let t1_on_a = a.iter().filter(|t| **t == "T1").count();
        let t1_on_b = b.iter().filter(|t| **t == "T1").count();
        assert!(
            (t1_on_a == 2 && t1_on_b == 0) || (t1_on_a == 0 && t1_on_b == 2),
            "party T1 was split: {:?} / {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_team_a_is_the_stronger_side() {
        let candidate = vec![
            entry("T1", "a", 20.0),
            entry("T2", "b", 21.0),
            entry("T3", "c", 30.0),
            entry("T4", "d", 31.0),
        ];

        let (team_a, team_b) = balance_by_ticket(&candidate);
        assert!(rated_team_strength(&team_a) >= rated_team_strength(&team_b));
    }

    #[test]
    fn test_players_sorted_by_rating_within_team() {
        let candidate = vec![
            entry("T1", "a", 20.0),
            entry("T2", "b", 28.0),
            entry("T3", "c", 24.0),
            entry("T4", "d", 26.0),
        ];

        let (team_a, team_b) = balance_by_ticket(&candidate);
        for team in [&team_a, &team_b] {
            for pair in team.windows(2) {
                assert!(pair[0].rating.rating >= pair[1].rating.rating);
            }
        }
    }

    #[test]
    fn test_greedy_placement_balances_strength() {
        // Four solo players: greedy placement should pair strongest with
        // weakest rather than stacking one side.
        let candidate = vec![
            entry("T1", "a", 32.0),
            entry("T2", "b", 28.0),
            entry("T3", "c", 22.0),
            entry("T4", "d", 18.0),
        ];

        let (team_a, team_b) = balance_by_ticket(&candidate);
        let delta = (rated_team_strength(&team_a) - rated_team_strength(&team_b)).abs();
        assert!(delta <= 4.0, "teams unbalanced by {}", delta);
    }

    #[test]
    fn test_oversized_group_is_dropped() {
        let groups = vec![
            vec![
                RatedEntry::new(entry("T1", "a", 25.0)),
                RatedEntry::new(entry("T1", "b", 25.0)),
                RatedEntry::new(entry("T1", "c", 25.0)),
            ],
            vec![RatedEntry::new(entry("T2", "d", 25.0))],
        ];

        let (team_a, team_b) = create_balanced_match(groups, 2);
        assert_eq!(team_a.len() + team_b.len(), 1);
    }
}
