//! Arena Matchmaker - skill-based matchmaking engine core
//!
//! This crate validates candidate matches proposed by an external ticket
//! combination generator, balances them into opposing teams with Weng-Lin
//! (OpenSkill) ratings, predicts outcomes, and selects a disjoint set of
//! matches to form. It also maintains per-user login/identity history with
//! alternate-account detection.

pub mod config;
pub mod error;
pub mod history;
pub mod matchmaker;
pub mod metrics;
pub mod percentile;
pub mod rating;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LobbyError, LobbyErrorCode, MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use matchmaker::pipeline::SkillBasedMatchmaker;
pub use percentile::PercentileService;
pub use service::rpc::MatchmakerService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
