//! Configuration for the matchmaking engine
//!
//! `app` holds the process-level configuration loaded from the environment;
//! `settings` holds the persisted per-user and global matchmaking settings
//! documents consumed by the percentile service.

pub mod app;
pub mod settings;

pub use app::{validate_config, AppConfig, MatchmakerTuning, ServiceSettings};
pub use settings::{
    load_matchmaking_settings, save_matchmaking_settings, MatchmakingSettings,
    MATCHMAKING_SETTINGS_STORAGE_KEY, MATCHMAKING_STORAGE_COLLECTION,
};
