//! In-memory collaborator implementations
//!
//! Backs tests and the development binary with the same surfaces a production
//! deployment wires to real infrastructure. Version fences behave like the
//! real store: `*` creates, empty overwrites, anything else must match.

use crate::error::{MatchmakingError, Result};
use crate::store::{
    AccountProvider, AccountRecord, IndexPage, LeaderboardProvider, LeaderboardRecord,
    PresenceRecord, StorageClient, StorageObject, StorageWrite, StreamBus, StreamMode,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

type ObjectKey = (String, String, String); // (user_id, collection, key)

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    version: String,
}

/// One struct implementing every collaborator trait, for tests and tooling
#[derive(Default)]
pub struct InMemoryCollaborators {
    objects: RwLock<HashMap<ObjectKey, StoredValue>>,
    leaderboards: RwLock<HashMap<String, Vec<LeaderboardRecord>>>,
    failing_boards: RwLock<HashSet<String>>,
    accounts: RwLock<HashMap<String, AccountRecord>>,
    presences: RwLock<HashMap<(StreamMode, String), Vec<PresenceRecord>>>,
    sent_payloads: RwLock<Vec<(StreamMode, String, String)>>,
    version_counter: AtomicU64,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        format!("v{}", self.version_counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Seed a leaderboard with ranked records (rank 1 first).
    pub fn seed_leaderboard(&self, board_id: &str, owner_ids: &[&str]) {
        let records = owner_ids
            .iter()
            .enumerate()
            .map(|(i, owner)| LeaderboardRecord {
                owner_id: owner.to_string(),
                rank: (i + 1) as i64,
            })
            .collect();
        self.leaderboards
            .write()
            .unwrap()
            .insert(board_id.to_string(), records);
    }

    /// Make subsequent queries against this board fail.
    pub fn fail_leaderboard(&self, board_id: &str) {
        self.failing_boards
            .write()
            .unwrap()
            .insert(board_id.to_string());
    }

    pub fn seed_account(&self, user_id: &str, disable_time: Option<DateTime<Utc>>) {
        self.accounts.write().unwrap().insert(
            user_id.to_string(),
            AccountRecord {
                user_id: user_id.to_string(),
                disable_time,
            },
        );
    }

    pub fn seed_presence(&self, mode: StreamMode, subject: &str, presence: PresenceRecord) {
        self.presences
            .write()
            .unwrap()
            .entry((mode, subject.to_string()))
            .or_default()
            .push(presence);
    }

    /// Payloads published via `stream_send`, oldest first.
    pub fn sent_payloads(&self) -> Vec<(StreamMode, String, String)> {
        self.sent_payloads.read().unwrap().clone()
    }

    fn query_pattern(query: &str) -> Option<String> {
        // Queries take the form `+value.cache:/<pattern>/`.
        let start = query.find(":/")? + 2;
        let end = query.rfind('/')?;
        if end <= start {
            return None;
        }
        // Patterns are escaped literals; unescape for substring matching.
        Some(query[start..end].replace('\\', ""))
    }
}

#[async_trait]
impl StorageClient for InMemoryCollaborators {
    async fn read(
        &self,
        user_id: &str,
        collection: &str,
        key: &str,
    ) -> Result<Option<StorageObject>> {
        let objects = self.objects.read().unwrap();
        Ok(objects
            .get(&(user_id.to_string(), collection.to_string(), key.to_string()))
            .map(|stored| StorageObject {
                user_id: user_id.to_string(),
                collection: collection.to_string(),
                key: key.to_string(),
                value: stored.value.clone(),
                version: stored.version.clone(),
            }))
    }

    async fn write(&self, write: StorageWrite) -> Result<String> {
        let mut objects = self.objects.write().unwrap();
        let object_key = (
            write.user_id.clone(),
            write.collection.clone(),
            write.key.clone(),
        );

        let existing = objects.get(&object_key);
        match (write.version.as_str(), existing) {
            ("", _) => {}
            ("*", None) => {}
            ("*", Some(_)) => {
                return Err(MatchmakingError::Conflict {
                    collection: write.collection,
                    key: write.key,
                }
                .into())
            }
            (fence, Some(stored)) if fence == stored.version.as_str() => {}
            (_, _) => {
                return Err(MatchmakingError::Conflict {
                    collection: write.collection,
                    key: write.key,
                }
                .into())
            }
        }

        let version = self.next_version();
        objects.insert(
            object_key,
            StoredValue {
                value: write.value,
                version: version.clone(),
            },
        );
        Ok(version)
    }

    async fn index_list(
        &self,
        _index_name: &str,
        query: &str,
        limit: usize,
        _cursor: &str,
    ) -> Result<IndexPage> {
        let pattern = Self::query_pattern(query).ok_or_else(|| MatchmakingError::BadInput {
            reason: format!("unsupported index query: {}", query),
        })?;

        let objects = self.objects.read().unwrap();
        let mut page = IndexPage::default();
        for ((user_id, collection, key), stored) in objects.iter() {
            if page.objects.len() >= limit {
                break;
            }
            // The only registered index covers the login history cache field.
            let value: serde_json::Value = match serde_json::from_str(&stored.value) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let matched = value
                .get("cache")
                .and_then(|c| c.as_array())
                .map(|tokens| {
                    tokens
                        .iter()
                        .filter_map(|t| t.as_str())
                        .any(|t| t.contains(&pattern))
                })
                .unwrap_or(false);
            if matched {
                page.objects.push(StorageObject {
                    user_id: user_id.clone(),
                    collection: collection.clone(),
                    key: key.clone(),
                    value: stored.value.clone(),
                    version: stored.version.clone(),
                });
            }
        }
        Ok(page)
    }
}

#[async_trait]
impl LeaderboardProvider for InMemoryCollaborators {
    async fn records_list(
        &self,
        board_id: &str,
        _owner_ids: &[String],
        limit: usize,
        _cursor: &str,
    ) -> Result<(Vec<LeaderboardRecord>, String)> {
        if self.failing_boards.read().unwrap().contains(board_id) {
            return Err(MatchmakingError::Unavailable {
                message: format!("leaderboard {} unavailable", board_id),
            }
            .into());
        }
        let leaderboards = self.leaderboards.read().unwrap();
        let records = leaderboards
            .get(board_id)
            .map(|records| records.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok((records, String::new()))
    }
}

#[async_trait]
impl AccountProvider for InMemoryCollaborators {
    async fn accounts_get_ids(&self, user_ids: &[String]) -> Result<Vec<AccountRecord>> {
        let accounts = self.accounts.read().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| accounts.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl StreamBus for InMemoryCollaborators {
    async fn stream_send(&self, mode: StreamMode, subject: &str, payload: &str) -> Result<()> {
        self.sent_payloads
            .write()
            .unwrap()
            .push((mode, subject.to_string(), payload.to_string()));
        Ok(())
    }

    async fn stream_user_list(
        &self,
        mode: StreamMode,
        subject: &str,
    ) -> Result<Vec<PresenceRecord>> {
        let presences = self.presences.read().unwrap();
        Ok(presences
            .get(&(mode, subject.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn stream_user_join(
        &self,
        mode: StreamMode,
        subject: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<bool> {
        let mut presences = self.presences.write().unwrap();
        let entries = presences.entry((mode, subject.to_string())).or_default();
        if !entries
            .iter()
            .any(|p| p.user_id == user_id && p.session_id == session_id)
        {
            entries.push(PresenceRecord {
                user_id: user_id.to_string(),
                session_id: session_id.to_string(),
                username: String::new(),
                status: String::new(),
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_version_fences() {
        let store = InMemoryCollaborators::new();
        let write = |version: &str| StorageWrite {
            user_id: "u1".to_string(),
            collection: "c".to_string(),
            key: "k".to_string(),
            value: "{}".to_string(),
            permission_read: 0,
            permission_write: 0,
            version: version.to_string(),
        };

        // Create-if-absent succeeds once.
        let v1 = store.write(write("*")).await.unwrap();
        assert!(store.write(write("*")).await.is_err());

        // Matching fence succeeds; stale fence conflicts.
        let v2 = store.write(write(&v1)).await.unwrap();
        assert!(store.write(write(&v1)).await.is_err());

        // Unconditional write always succeeds.
        let v3 = store.write(write("")).await.unwrap();
        assert_ne!(v2, v3);

        let object = store.read("u1", "c", "k").await.unwrap().unwrap();
        assert_eq!(object.version, v3);
    }

    #[tokio::test]
    async fn test_index_list_matches_cache_tokens() {
        let store = InMemoryCollaborators::new();
        store
            .write(StorageWrite {
                user_id: "u1".to_string(),
                collection: "Login".to_string(),
                key: "history".to_string(),
                value: r#"{"cache":["1.2.3.4","OVR-1"]}"#.to_string(),
                permission_read: 0,
                permission_write: 0,
                version: "*".to_string(),
            })
            .await
            .unwrap();

        let page = store
            .index_list("Index_LoginHistory", "+value.cache:/1\\.2\\.3\\.4/", 10, "")
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].user_id, "u1");

        let page = store
            .index_list("Index_LoginHistory", "+value.cache:/9\\.9\\.9\\.9/", 10, "")
            .await
            .unwrap();
        assert!(page.objects.is_empty());
    }

    #[tokio::test]
    async fn test_leaderboard_seed_and_failure() {
        let store = InMemoryCollaborators::new();
        store.seed_leaderboard("arena_public:score:daily", &["a", "b", "c"]);

        let (records, _) = store
            .records_list("arena_public:score:daily", &[], 100, "")
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].owner_id, "b");
        assert_eq!(records[1].rank, 2);

        store.fail_leaderboard("arena_public:score:daily");
        assert!(store
            .records_list("arena_public:score:daily", &[], 100, "")
            .await
            .is_err());
    }
}
