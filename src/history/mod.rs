//! Per-user login/identity history
//!
//! Tracks device, IP, and system-profile sightings, pending and authorized
//! client-IP allowlists, and first/second-degree alternate-account links.
//! Records persist through the storage collaborator with a version fence and
//! feed the token index used by alternate-account search.

pub mod alternates;
pub mod login;

pub use alternates::{login_alternate_search, login_history_regex_search, AlternateSearchMatch};
pub use login::{
    LoginHistory, LoginHistoryEntry, LoginProfile, SystemInfo, LOGIN_HISTORY_CACHE_INDEX,
    LOGIN_HISTORY_STORAGE_KEY, LOGIN_STORAGE_COLLECTION, MAX_LOGIN_HISTORY_BYTES,
};
