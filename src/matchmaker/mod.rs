//! Candidate pipeline: filter, balance, predict, sort, select
//!
//! Candidates arrive from an external ticket-combination generator; this
//! module validates them, balances each into two teams preserving parties,
//! predicts draws, sorts under the per-mode fairness policy, and selects a
//! disjoint set of matches.

pub mod balance;
pub mod entry;
pub mod pipeline;

pub use balance::{balance_by_ticket, create_balanced_match};
pub use entry::{Candidate, EntryProperties, PredictedMatch, RatedEntry, RatedTeam, TicketEntry};
pub use pipeline::{FilterCounts, MatchOutcome, MatchmakerSnapshot, PipelineConfig, SkillBasedMatchmaker};
