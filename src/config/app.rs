//! Process-level application configuration
//!
//! Environment variable loading with fallback to defaults, plus validation.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaker: MatchmakerTuning,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interval between snapshot log lines in seconds
    pub state_log_interval_seconds: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaker tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakerTuning {
    /// Rank-spread difference below which two predictions tie in arena sort
    pub max_rank_delta: f64,
    /// Percentile assumed for players with no rank data
    pub default_rank_percentile: f64,
    /// Reachability cap applied when an entry carries no max_rtt property (ms)
    pub default_max_rtt_ms: f64,
    /// Upper bound on the serialized candidate dump uploaded per tick (bytes)
    pub candidate_dump_limit_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            matchmaker: MatchmakerTuning::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "arena-matchmaker".to_string(),
            log_level: "info".to_string(),
            state_log_interval_seconds: 30,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakerTuning {
    fn default() -> Self {
        Self {
            max_rank_delta: 0.10,
            default_rank_percentile: 0.5,
            default_max_rtt_ms: 500.0,
            candidate_dump_limit_bytes: 8 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(interval) = env::var("STATE_LOG_INTERVAL_SECONDS") {
            config.service.state_log_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid STATE_LOG_INTERVAL_SECONDS value: {}", interval))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        if let Ok(delta) = env::var("MAX_RANK_DELTA") {
            config.matchmaker.max_rank_delta = delta
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_RANK_DELTA value: {}", delta))?;
        }
        if let Ok(percentile) = env::var("DEFAULT_RANK_PERCENTILE") {
            config.matchmaker.default_rank_percentile = percentile
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_RANK_PERCENTILE value: {}", percentile))?;
        }
        if let Ok(rtt) = env::var("DEFAULT_MAX_RTT_MS") {
            config.matchmaker.default_max_rtt_ms = rtt
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_MAX_RTT_MS value: {}", rtt))?;
        }
        if let Ok(limit) = env::var("CANDIDATE_DUMP_LIMIT_BYTES") {
            config.matchmaker.candidate_dump_limit_bytes = limit
                .parse()
                .map_err(|_| anyhow!("Invalid CANDIDATE_DUMP_LIMIT_BYTES value: {}", limit))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get snapshot log interval as Duration
    pub fn state_log_interval(&self) -> Duration {
        Duration::from_secs(self.service.state_log_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.state_log_interval_seconds == 0 {
        return Err(anyhow!("State log interval must be greater than 0"));
    }

    if !(0.0..=1.0).contains(&config.matchmaker.max_rank_delta) {
        return Err(anyhow!("Max rank delta must be within [0, 1]"));
    }
    if !(0.0..=1.0).contains(&config.matchmaker.default_rank_percentile) {
        return Err(anyhow!("Default rank percentile must be within [0, 1]"));
    }
    if config.matchmaker.default_max_rtt_ms <= 0.0 {
        return Err(anyhow!("Default max RTT must be positive"));
    }
    if config.matchmaker.candidate_dump_limit_bytes == 0 {
        return Err(anyhow!("Candidate dump limit must be greater than 0"));
    }

    Ok(())
}
