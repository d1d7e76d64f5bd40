//! Collaborator surfaces consumed by the engine
//!
//! The engine does not own persistence, leaderboards, accounts, or streams;
//! it talks to them through these traits. `memory` provides in-process
//! implementations used by tests and the development binary.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use memory::InMemoryCollaborators;

/// User id that owns system-wide records
pub const SYSTEM_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Storage permission: not readable by clients
pub const PERMISSION_NO_READ: i32 = 0;
/// Storage permission: not writable by clients
pub const PERMISSION_NO_WRITE: i32 = 0;

/// A stored object returned by reads and index queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    pub user_id: String,
    pub collection: String,
    pub key: String,
    pub value: String,
    pub version: String,
}

/// A conditional storage write.
///
/// `version` is the optimistic-concurrency fence: `*` means create-if-absent,
/// an empty string writes unconditionally, anything else must match the
/// stored version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageWrite {
    pub user_id: String,
    pub collection: String,
    pub key: String,
    pub value: String,
    pub permission_read: i32,
    pub permission_write: i32,
    pub version: String,
}

/// One page of an index listing
#[derive(Debug, Clone, Default)]
pub struct IndexPage {
    pub objects: Vec<StorageObject>,
    /// Empty when no further pages exist
    pub cursor: String,
}

/// Declaration of a storage index the host must register
#[derive(Debug, Clone)]
pub struct StorageIndexMeta {
    pub name: &'static str,
    pub collection: &'static str,
    pub key: &'static str,
    pub fields: &'static [&'static str],
    pub max_entries: usize,
}

/// Key-value store collaborator
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn read(&self, user_id: &str, collection: &str, key: &str)
        -> Result<Option<StorageObject>>;

    /// Perform a conditional write; returns the new storage version.
    async fn write(&self, write: StorageWrite) -> Result<String>;

    /// Query a storage index; `query` uses the store's query syntax, e.g.
    /// `+value.cache:/<pattern>/` for regex-over-cache search.
    async fn index_list(
        &self,
        index_name: &str,
        query: &str,
        limit: usize,
        cursor: &str,
    ) -> Result<IndexPage>;
}

/// A single leaderboard record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub owner_id: String,
    /// 1-based rank within the board's current window
    pub rank: i64,
}

/// Leaderboard collaborator
#[async_trait]
pub trait LeaderboardProvider: Send + Sync {
    /// List records for the board's current window. Returns the records page
    /// and the next cursor (empty when exhausted).
    async fn records_list(
        &self,
        board_id: &str,
        owner_ids: &[String],
        limit: usize,
        cursor: &str,
    ) -> Result<(Vec<LeaderboardRecord>, String)>;
}

/// Account record exposing the disable time used for alt policy decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub user_id: String,
    pub disable_time: Option<DateTime<Utc>>,
}

/// Account registry collaborator
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn accounts_get_ids(&self, user_ids: &[String]) -> Result<Vec<AccountRecord>>;
}

/// Stream addressing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamMode {
    /// Matchmaker diagnostics (candidate dumps)
    Matchmaker,
    /// Matchmaking presence (queued players per group)
    Matchmaking,
}

/// A presence on a stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub session_id: String,
    pub username: String,
    /// Opaque status payload set by the presence owner
    pub status: String,
}

/// Presence stream collaborator
#[async_trait]
pub trait StreamBus: Send + Sync {
    async fn stream_send(&self, mode: StreamMode, subject: &str, payload: &str) -> Result<()>;

    async fn stream_user_list(&self, mode: StreamMode, subject: &str)
        -> Result<Vec<PresenceRecord>>;

    /// Join a user session to a stream; returns false when the join was
    /// rejected by the presence registry.
    async fn stream_user_join(
        &self,
        mode: StreamMode,
        subject: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<bool>;
}

/// Metrics sink collaborator
pub trait MetricsSink: Send + Sync {
    fn gauge_set(&self, name: &str, value: f64);
    fn timer_record(&self, name: &str, duration: Duration);
}

/// Metrics sink that drops everything
#[derive(Debug, Default, Clone)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn gauge_set(&self, _name: &str, _value: f64) {}
    fn timer_record(&self, _name: &str, _duration: Duration) {}
}
