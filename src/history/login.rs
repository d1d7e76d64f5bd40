//! Login history records
//!
//! One record per user. The `cache` field is the indexed full-text view,
//! rebuilt on every serialize; serialized documents stay under 5 MiB by
//! evicting the oldest history entries.

use crate::error::{MatchmakingError, Result};
use crate::history::alternates::AlternateSearchMatch;
use crate::store::{StorageClient, StorageWrite, PERMISSION_NO_READ, PERMISSION_NO_WRITE};
use crate::types::Xpid;
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const LOGIN_STORAGE_COLLECTION: &str = "Login";
pub const LOGIN_HISTORY_STORAGE_KEY: &str = "history";
pub const LOGIN_HISTORY_CACHE_INDEX: &str = "Index_LoginHistory";

/// Serialized documents must stay under this size
pub const MAX_LOGIN_HISTORY_BYTES: usize = 5 * 1024 * 1024;

/// Authorized IPs expire after this long without a sighting
const AUTHORIZED_IP_MAX_AGE_DAYS: i64 = 30;

/// History entries evicted per pass when the document is oversized
const EVICTIONS_PER_PASS: usize = 5;

/// Placeholder values that never enter the cache (empty serials, link HMDs)
pub(crate) fn is_ignored_login_value(value: &str) -> bool {
    matches!(
        value,
        "" | "1WMHH000X00000"
            | "N/A"
            | "UNK-0"
            | "OVR-ORG-0"
            | "unknown"
            | "1PASH5D1P17365"
            | "WMHD315M3010GV"
            | "VRLINKHMDQUEST"
            | "VRLINKHMDQUEST2"
            | "VRLINKHMDQUEST3"
    )
}

/// Hardware and OS details reported at login
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub headset_type: String,
    pub network_type: String,
    pub video_card: String,
    pub cpu_model: String,
    pub num_physical_cores: u32,
    pub num_logical_cores: u32,
    pub memory_total: u64,
    pub dedicated_gpu_memory: u64,
}

/// Client-reported login payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginProfile {
    pub hmd_serial_number: String,
    pub system_info: SystemInfo,
}

/// One sighted (XPID, client IP) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginHistoryEntry {
    #[serde(rename = "create_time")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "update_time")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "xpi")]
    pub xpid: Xpid,
    pub client_ip: String,
    pub login_data: LoginProfile,
}

impl LoginHistoryEntry {
    pub fn key(&self) -> String {
        login_history_entry_key(&self.xpid, &self.client_ip)
    }

    /// Two-digit confirmation code derived from the creation timestamp
    pub fn pending_code(&self) -> String {
        format!("{:02}", self.created_at.timestamp_subsec_nanos() % 100)
    }

    /// Composite identifying string for the reporting system.
    ///
    /// Components are joined with `::`; any `::` inside a component is
    /// replaced so the composite stays splittable.
    pub fn system_profile(&self) -> String {
        let info = &self.login_data.system_info;
        let components = [
            normalize_headset_type(&info.headset_type),
            info.network_type.clone(),
            info.video_card.clone(),
            info.cpu_model.clone(),
            info.num_physical_cores.to_string(),
            info.num_logical_cores.to_string(),
            info.memory_total.to_string(),
            info.dedicated_gpu_memory.to_string(),
        ];

        components
            .iter()
            .map(|c| c.replace("::", ";"))
            .collect::<Vec<_>>()
            .join("::")
    }

    /// Identifying tokens this entry contributes to the cache
    pub fn items(&self) -> Vec<String> {
        vec![
            self.client_ip.clone(),
            self.login_data.hmd_serial_number.clone(),
            self.xpid.token(),
            self.system_profile(),
        ]
    }
}

fn login_history_entry_key(xpid: &Xpid, client_ip: &str) -> String {
    format!("{}:{}", xpid.token(), client_ip)
}

/// Collapse vendor aliases so link-cable and standalone sessions on the same
/// headset produce one profile string.
fn normalize_headset_type(headset_type: &str) -> String {
    let trimmed = headset_type.trim();
    match trimmed {
        "Oculus Quest" | "Meta Quest" | "Quest" => "Quest".to_string(),
        "Oculus Quest 2" | "Meta Quest 2" | "Quest 2" => "Quest 2".to_string(),
        "Oculus Quest 3" | "Meta Quest 3" | "Quest 3" => "Quest 3".to_string(),
        other => other.to_string(),
    }
}

/// Per-user login history document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginHistory {
    /// Keyed by `<xpid-token>:<client-ip>`
    pub history: HashMap<String, LoginHistoryEntry>,
    /// Sorted, deduplicated identifying tokens; the indexed full-text field
    pub cache: Vec<String>,
    /// XPID token -> latest sighting
    pub xpis: HashMap<String, DateTime<Utc>>,
    /// Client IP -> latest sighting
    pub client_ips: HashMap<String, DateTime<Utc>>,
    /// Client IP -> authorization time
    #[serde(rename = "authorized_client_ips")]
    pub authorized_ips: HashMap<String, DateTime<Utc>>,
    #[serde(rename = "denied_client_addrs")]
    pub denied_client_addresses: Vec<String>,
    /// Entry key -> entry awaiting a confirmation code
    pub pending_authorizations: HashMap<String, LoginHistoryEntry>,
    /// User ids reached through one alternate hop
    #[serde(rename = "second_degree")]
    pub second_degree_alternates: Vec<String>,
    /// First-degree alternates with their match evidences
    #[serde(rename = "alternate_accounts")]
    pub alternate_map: HashMap<String, Vec<AlternateSearchMatch>>,
    /// Group id -> user id -> last notification time
    #[serde(rename = "notified_groups")]
    pub group_notifications: HashMap<String, HashMap<String, DateTime<Utc>>>,
    pub ignore_disabled_alternates: bool,

    #[serde(skip)]
    user_id: String,
    #[serde(skip)]
    version: String,
}

impl LoginHistory {
    /// Index the host must register so alternate search can query the cache.
    pub fn storage_index() -> crate::store::StorageIndexMeta {
        crate::store::StorageIndexMeta {
            name: LOGIN_HISTORY_CACHE_INDEX,
            collection: LOGIN_STORAGE_COLLECTION,
            key: LOGIN_HISTORY_STORAGE_KEY,
            fields: &[
                "cache",
                "xpis",
                "client_ips",
                "second_degree",
                "alternate_matches",
                "denied_client_addrs",
            ],
            max_entries: 10_000_000,
        }
    }

    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            version: "*".to_string(),
            ..Self::default()
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_storage_version(&mut self, user_id: impl Into<String>, version: impl Into<String>) {
        self.user_id = user_id.into();
        self.version = version.into();
    }

    /// Record a sighting: refresh an existing entry or insert a new one.
    pub fn update(&mut self, xpid: Xpid, client_ip: &str, login_data: LoginProfile) {
        let now = current_timestamp();
        if let Some(entry) = self
            .history
            .get_mut(&login_history_entry_key(&xpid, client_ip))
        {
            entry.updated_at = now;
            entry.login_data = login_data;
            return;
        }
        self.insert(LoginHistoryEntry {
            created_at: now,
            updated_at: now,
            xpid,
            client_ip: client_ip.to_string(),
            login_data,
        });
    }

    pub fn get(&self, xpid: &Xpid, client_ip: &str) -> Option<&LoginHistoryEntry> {
        self.history.get(&login_history_entry_key(xpid, client_ip))
    }

    pub fn insert(&mut self, entry: LoginHistoryEntry) {
        self.history.insert(entry.key(), entry);
    }

    /// Authorize an ip when a pending entry's confirmation code matches.
    pub fn authorize_ip_with_code(&mut self, ip: &str, code: &str) -> Result<()> {
        let pending = self
            .pending_authorizations
            .values()
            .find(|e| e.client_ip == ip);

        match pending {
            Some(entry) => {
                if entry.pending_code() != code {
                    return Err(MatchmakingError::BadInput {
                        reason: format!("invalid code {} for IP {}", code, ip),
                    }
                    .into());
                }
                self.authorize_ip(ip);
                Ok(())
            }
            None => Err(MatchmakingError::NotFound {
                what: "pending authorization".to_string(),
            }
            .into()),
        }
    }

    /// Authorize an ip unconditionally; returns true when newly added.
    pub fn authorize_ip(&mut self, ip: &str) -> bool {
        self.remove_pending_authorization(ip);
        let added = !self.authorized_ips.contains_key(ip);
        self.authorized_ips.insert(ip.to_string(), current_timestamp());
        added
    }

    pub fn is_authorized_ip(&self, ip: &str) -> bool {
        self.authorized_ips.contains_key(ip)
    }

    /// Queue an (xpid, ip) pair for code confirmation; returns the entry.
    pub fn add_pending_authorization(
        &mut self,
        xpid: Xpid,
        client_ip: &str,
        login_data: LoginProfile,
    ) -> LoginHistoryEntry {
        let now = current_timestamp();
        let entry = LoginHistoryEntry {
            created_at: now,
            updated_at: now,
            xpid,
            client_ip: client_ip.to_string(),
            login_data,
        };
        self.pending_authorizations
            .insert(entry.key(), entry.clone());
        entry
    }

    pub fn get_pending_authorization(&self, ip: &str) -> Option<&LoginHistoryEntry> {
        self.pending_authorizations
            .values()
            .find(|e| e.client_ip == ip)
    }

    pub fn remove_pending_authorization(&mut self, ip: &str) {
        self.pending_authorizations
            .retain(|_, entry| entry.client_ip != ip);
    }

    /// First- and second-degree alternate ids, each sorted and deduplicated.
    /// Second-degree ids already present in the first-degree map are elided.
    pub fn alternate_ids(&self) -> (Vec<String>, Vec<String>) {
        let mut first: Vec<String> = self.alternate_map.keys().cloned().collect();
        first.sort();
        first.dedup();

        let mut second: Vec<String> = self
            .second_degree_alternates
            .iter()
            .filter(|id| !self.alternate_map.contains_key(*id))
            .cloned()
            .collect();
        second.sort();
        second.dedup();

        (first, second)
    }

    /// Mark every alternate id as notified for this group.
    ///
    /// Returns true when at least one id had no prior notification or one
    /// strictly before `threshold`.
    pub fn notify_group(&mut self, group_id: &str, threshold: DateTime<Utc>) -> bool {
        let mut user_ids: Vec<String> = self
            .alternate_map
            .keys()
            .cloned()
            .chain(self.second_degree_alternates.iter().cloned())
            .collect();

        if user_ids.is_empty() {
            return false;
        }
        user_ids.sort();
        user_ids.dedup();

        let notified = self
            .group_notifications
            .entry(group_id.to_string())
            .or_default();

        let now = current_timestamp();
        let mut updated = false;
        for user_id in user_ids {
            match notified.get(&user_id) {
                Some(t) if *t >= threshold => {}
                _ => {
                    notified.insert(user_id, now);
                    updated = true;
                }
            }
        }
        updated
    }

    /// Rebuild the indexed cache and sighting maps from the history entries.
    pub fn rebuild_cache(&mut self) {
        self.cache = Vec::with_capacity(self.history.len() * 4 + self.denied_client_addresses.len());
        self.xpis = HashMap::with_capacity(self.history.len());
        self.client_ips = HashMap::with_capacity(self.history.len());

        for entry in self.history.values() {
            self.cache.push(entry.xpid.token());
            self.cache.push(entry.client_ip.clone());
            self.cache.push(entry.login_data.hmd_serial_number.clone());
            self.cache.push(entry.system_profile());

            if !entry.xpid.is_nil() {
                let token = entry.xpid.token();
                match self.xpis.get(&token) {
                    Some(t) if *t >= entry.updated_at => {}
                    _ => {
                        self.xpis.insert(token, entry.updated_at);
                    }
                }
            }

            if !entry.client_ip.is_empty() {
                match self.client_ips.get(&entry.client_ip) {
                    Some(t) if *t >= entry.updated_at => {}
                    _ => {
                        self.client_ips
                            .insert(entry.client_ip.clone(), entry.updated_at);
                    }
                }
            }
        }

        self.cache.extend(self.denied_client_addresses.iter().cloned());
        self.cache.sort();
        self.cache.dedup();
        self.cache.retain(|v| !is_ignored_login_value(v));
    }

    /// Drop authorized ips with no recent sighting.
    fn prune_authorized_ips(&mut self) {
        let now = current_timestamp();
        let max_age = Duration::days(AUTHORIZED_IP_MAX_AGE_DAYS);
        let client_ips = &self.client_ips;
        self.authorized_ips.retain(|ip, _| {
            client_ips
                .get(ip)
                .map(|last_use| now - *last_use <= max_age)
                .unwrap_or(false)
        });
    }

    /// Serialize the record within the size budget.
    ///
    /// Prunes stale authorized ips, rebuilds the cache, and evicts the oldest
    /// history entries until the encoded document fits.
    pub fn serialize_bounded(&mut self) -> Result<String> {
        if self.user_id.is_empty() {
            return Err(MatchmakingError::BadInput {
                reason: "login history has no user id".to_string(),
            }
            .into());
        }

        self.prune_authorized_ips();

        loop {
            self.rebuild_cache();
            let encoded = serde_json::to_string(self)?;
            if encoded.len() < MAX_LOGIN_HISTORY_BYTES {
                return Ok(encoded);
            }

            if self.history.is_empty() {
                return Err(MatchmakingError::Exhausted {
                    size: encoded.len(),
                }
                .into());
            }

            for _ in 0..EVICTIONS_PER_PASS {
                let oldest_key = self
                    .history
                    .iter()
                    .min_by_key(|(_, entry)| entry.updated_at)
                    .map(|(key, _)| key.clone());
                match oldest_key {
                    Some(key) => {
                        self.history.remove(&key);
                    }
                    None => break,
                }
            }
        }
    }

    /// Persist the record with its version fence, refreshing the fence on
    /// success. Conflicts surface so the caller can reload and retry.
    pub async fn store(&mut self, store: &dyn StorageClient) -> Result<()> {
        let value = self.serialize_bounded()?;
        let new_version = store
            .write(StorageWrite {
                user_id: self.user_id.clone(),
                collection: LOGIN_STORAGE_COLLECTION.to_string(),
                key: LOGIN_HISTORY_STORAGE_KEY.to_string(),
                value,
                permission_read: PERMISSION_NO_READ,
                permission_write: PERMISSION_NO_WRITE,
                version: self.version.clone(),
            })
            .await?;
        self.version = new_version;
        Ok(())
    }
}

/// Load a user's login history, creating a fresh record when absent.
pub async fn load_login_history(store: &dyn StorageClient, user_id: &str) -> Result<LoginHistory> {
    match store
        .read(user_id, LOGIN_STORAGE_COLLECTION, LOGIN_HISTORY_STORAGE_KEY)
        .await?
    {
        Some(object) => {
            let mut history: LoginHistory = serde_json::from_str(&object.value)?;
            history.set_storage_version(user_id, object.version);
            Ok(history)
        }
        None => Ok(LoginHistory::new(user_id)),
    }
}
