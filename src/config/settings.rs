//! Persisted matchmaking settings documents
//!
//! One document exists per user plus a global one under the system user id.
//! The percentile service resolves user overrides against the global
//! settings and uses the global record's storage version as its cache fence.

use crate::error::Result;
use crate::store::{StorageClient, StorageWrite, PERMISSION_NO_READ, PERMISSION_NO_WRITE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MATCHMAKING_STORAGE_COLLECTION: &str = "Matchmaker";
pub const MATCHMAKING_SETTINGS_STORAGE_KEY: &str = "settings";

/// Matchmaking settings, stored per user and globally.
///
/// All fields are optional in storage; zero values mean "unset" so that user
/// documents only override what they specify.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Hard override: when non-zero, the percentile service returns this value
    pub static_base_rank_percentile: f64,
    /// Cached result of the last percentile recomputation
    pub previous_rank_percentile: f64,
    /// Version of the global settings record the cache was computed against
    pub global_settings_version: String,
    /// Percentile used when no leaderboard data exists
    pub rank_percentile_default: f64,
    /// Periodicity of the active leaderboard window (e.g. "daily")
    pub rank_reset_schedule: String,
    /// Periodicity of the damping leaderboard window (e.g. "weekly")
    pub rank_reset_schedule_damping: String,
    /// Blend factor between active and damping percentiles, in [0, 1]
    pub rank_percentile_damping_factor: f64,
    /// Leaderboard weights: mode -> board name -> weight
    pub rank_board_weights: HashMap<String, HashMap<String, f64>>,
}

/// Load a user's matchmaking settings along with the record's storage version.
///
/// A missing record yields defaults with the create-sentinel version `*`.
pub async fn load_matchmaking_settings(
    store: &dyn StorageClient,
    user_id: &str,
) -> Result<(MatchmakingSettings, String)> {
    match store
        .read(
            user_id,
            MATCHMAKING_STORAGE_COLLECTION,
            MATCHMAKING_SETTINGS_STORAGE_KEY,
        )
        .await?
    {
        Some(object) => {
            let settings: MatchmakingSettings = serde_json::from_str(&object.value)?;
            Ok((settings, object.version))
        }
        None => Ok((MatchmakingSettings::default(), "*".to_string())),
    }
}

/// Persist a user's matchmaking settings, returning the new storage version.
pub async fn save_matchmaking_settings(
    store: &dyn StorageClient,
    user_id: &str,
    settings: &MatchmakingSettings,
    version: &str,
) -> Result<String> {
    let value = serde_json::to_string(settings)?;
    store
        .write(StorageWrite {
            user_id: user_id.to_string(),
            collection: MATCHMAKING_STORAGE_COLLECTION.to_string(),
            key: MATCHMAKING_SETTINGS_STORAGE_KEY.to_string(),
            value,
            permission_read: PERMISSION_NO_READ,
            permission_write: PERMISSION_NO_WRITE,
            version: version.to_string(),
        })
        .await
}

impl MatchmakingSettings {
    /// Board weights for the given mode string, user override over global.
    pub fn board_weights_for_mode<'a>(
        user: &'a MatchmakingSettings,
        global: &'a MatchmakingSettings,
        mode: &str,
    ) -> Option<&'a HashMap<String, f64>> {
        if !user.rank_board_weights.is_empty() {
            return user.rank_board_weights.get(mode);
        }
        if !global.rank_board_weights.is_empty() {
            return global.rank_board_weights.get(mode);
        }
        None
    }
}
