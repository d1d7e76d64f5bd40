//! Rating model built on Weng-Lin (OpenSkill) ratings
//!
//! Pure numeric functions: team strength and team-vs-team draw prediction.

pub mod model;

pub use model::{default_rating, predict_draw, team_strength};
