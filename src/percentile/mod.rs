//! Smoothed rank percentiles
//!
//! Resolves a user's rank percentile in [0, 1] from weighted leaderboard
//! standings across two time-periodicities, blended by a damping factor.
//! Results cache on the user's settings document, fenced by the global
//! settings version.

use crate::config::settings::{
    load_matchmaking_settings, save_matchmaking_settings, MatchmakingSettings,
};
use crate::error::{MatchmakingError, Result};
use crate::store::{LeaderboardProvider, StorageClient, SYSTEM_USER_ID};
use crate::types::GameMode;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const LEADERBOARD_PAGE_LIMIT: usize = 10_000;
const DEFAULT_ACTIVE_SCHEDULE: &str = "daily";
const DEFAULT_DAMPING_SCHEDULE: &str = "weekly";

/// Computes and caches smoothed rank percentiles
pub struct PercentileService {
    store: Arc<dyn StorageClient>,
    leaderboards: Arc<dyn LeaderboardProvider>,
}

impl PercentileService {
    pub fn new(store: Arc<dyn StorageClient>, leaderboards: Arc<dyn LeaderboardProvider>) -> Self {
        Self {
            store,
            leaderboards,
        }
    }

    /// Resolve the user's smoothed rank percentile for a mode.
    ///
    /// Static overrides win, then the version-fenced cache, then a full
    /// recomputation whose result is cached back onto the user's settings.
    pub async fn smoothed_percentile(&self, user_id: &str, mode: GameMode) -> Result<f64> {
        // Only the social mode ranks separately.
        let mode = match mode {
            GameMode::SocialPublic => GameMode::SocialPublic,
            _ => GameMode::ArenaPublic,
        };

        let (global, global_version) =
            load_matchmaking_settings(&*self.store, SYSTEM_USER_ID).await?;
        let (mut user, user_version) = load_matchmaking_settings(&*self.store, user_id).await?;

        if user.static_base_rank_percentile > 0.0 {
            return Ok(user.static_base_rank_percentile);
        }
        if global.static_base_rank_percentile > 0.0 {
            return Ok(global.static_base_rank_percentile);
        }

        if user.previous_rank_percentile > 0.0 && user.global_settings_version == global_version {
            return Ok(user.previous_rank_percentile);
        }

        let default_percentile = if user.rank_percentile_default != 0.0 {
            user.rank_percentile_default
        } else {
            global.rank_percentile_default
        };

        let active_schedule = resolve_schedule(
            &user.rank_reset_schedule,
            &global.rank_reset_schedule,
            DEFAULT_ACTIVE_SCHEDULE,
        );
        let damping_schedule = resolve_schedule(
            &user.rank_reset_schedule_damping,
            &global.rank_reset_schedule_damping,
            DEFAULT_DAMPING_SCHEDULE,
        );

        let damping_factor = if user.rank_percentile_damping_factor != 0.0 {
            user.rank_percentile_damping_factor
        } else {
            global.rank_percentile_damping_factor
        };

        let board_weights =
            match MatchmakingSettings::board_weights_for_mode(&user, &global, mode.as_str()) {
                Some(weights) if !weights.is_empty() => weights.clone(),
                _ => return Ok(default_percentile),
            };

        let damping_percentile = self
            .recalculate(user_id, mode, &damping_schedule, default_percentile, &board_weights)
            .await?;
        let active_percentile = self
            .recalculate(user_id, mode, &active_schedule, damping_percentile, &board_weights)
            .await?;

        let percentile =
            active_percentile + (damping_percentile - active_percentile) * damping_factor;

        user.previous_rank_percentile = percentile;
        user.global_settings_version = global_version;
        if let Err(err) =
            save_matchmaking_settings(&*self.store, user_id, &user, &user_version).await
        {
            warn!(user_id = %user_id, error = %err, "Failed to cache rank percentile");
        }

        Ok(percentile)
    }

    /// Weighted percentile across the mode's boards for one schedule.
    ///
    /// Missing boards contribute `fallback` at their weight; boards where the
    /// user holds no rank are skipped, as are boards whose query fails.
    pub async fn recalculate(
        &self,
        user_id: &str,
        mode: GameMode,
        schedule: &str,
        fallback: f64,
        board_weights: &HashMap<String, f64>,
    ) -> Result<f64> {
        let mut percentiles = Vec::with_capacity(board_weights.len());
        let mut weights = Vec::with_capacity(board_weights.len());

        for (board_name, weight) in board_weights {
            let board_id = format!("{}:{}:{}", mode, board_name, schedule);

            let (records, _) = match self
                .leaderboards
                .records_list(
                    &board_id,
                    &[user_id.to_string()],
                    LEADERBOARD_PAGE_LIMIT,
                    "",
                )
                .await
            {
                Ok(page) => page,
                Err(_) => continue,
            };

            if records.is_empty() {
                percentiles.push(fallback);
                weights.push(*weight);
                continue;
            }

            let rank = match records.iter().find(|r| r.owner_id == user_id) {
                Some(record) => record.rank,
                None => continue,
            };

            percentiles.push(rank as f64 / records.len() as f64);
            weights.push(*weight);
        }

        if percentiles.is_empty() {
            return Ok(fallback);
        }

        normalized_weighted_average(&percentiles, &weights)
    }
}

fn resolve_schedule(user: &str, global: &str, default: &str) -> String {
    if !user.is_empty() {
        user.to_string()
    } else if !global.is_empty() {
        global.to_string()
    } else {
        default.to_string()
    }
}

/// `Σ v·w / Σ w`; errors when lengths differ or weights sum to zero.
pub fn normalized_weighted_average(values: &[f64], weights: &[f64]) -> Result<f64> {
    if values.len() != weights.len() {
        return Err(MatchmakingError::BadInput {
            reason: "values and weights must have the same length".to_string(),
        }
        .into());
    }

    let weight_sum: f64 = weights.iter().sum();
    if weight_sum == 0.0 {
        return Err(MatchmakingError::BadInput {
            reason: "sum of weights must not be zero".to_string(),
        }
        .into());
    }

    Ok(values
        .iter()
        .zip(weights)
        .map(|(value, weight)| value * (weight / weight_sum))
        .sum())
}
