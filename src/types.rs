//! Common types used throughout the matchmaking engine

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use skillratings::weng_lin::WengLinRating;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for users
pub type UserId = String;

/// Unique identifier for connected sessions
pub type SessionId = String;

/// Matchmaking ticket identifier, shared by all members of a party
pub type TicketId = String;

/// Public game modes handled by the matchmaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    ArenaPublic,
    CombatPublic,
    SocialPublic,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::ArenaPublic => "arena_public",
            GameMode::CombatPublic => "combat_public",
            GameMode::SocialPublic => "social_public",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "arena_public" => Ok(GameMode::ArenaPublic),
            "combat_public" => Ok(GameMode::CombatPublic),
            "social_public" => Ok(GameMode::SocialPublic),
            other => Err(format!("unknown game mode: {}", other)),
        }
    }
}

/// Rating information for a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub rating: f64,
    pub uncertainty: f64,
}

impl Default for PlayerRating {
    fn default() -> Self {
        Self {
            rating: 25.0,
            uncertainty: 25.0 / 3.0,
        }
    }
}

impl From<WengLinRating> for PlayerRating {
    fn from(rating: WengLinRating) -> Self {
        Self {
            rating: rating.rating,
            uncertainty: rating.uncertainty,
        }
    }
}

impl From<PlayerRating> for WengLinRating {
    fn from(rating: PlayerRating) -> Self {
        Self {
            rating: rating.rating,
            uncertainty: rating.uncertainty,
        }
    }
}

/// Presence identifiers carried by a queued ticket entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPresence {
    pub user_id: UserId,
    pub session_id: SessionId,
    #[serde(default)]
    pub username: String,
}

/// External platform identifier: a platform prefix plus an account number.
///
/// Serialized as its token form, e.g. `OVR-3963667097037078`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Xpid {
    pub platform_code: String,
    pub account_id: u64,
}

impl Xpid {
    pub fn new(platform_code: impl Into<String>, account_id: u64) -> Self {
        Self {
            platform_code: platform_code.into(),
            account_id,
        }
    }

    /// Token form used as (half of) the login history entry key.
    pub fn token(&self) -> String {
        format!("{}-{}", self.platform_code, self.account_id)
    }

    pub fn is_nil(&self) -> bool {
        self.platform_code.is_empty() && self.account_id == 0
    }
}

impl fmt::Display for Xpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform_code, self.account_id)
    }
}

impl FromStr for Xpid {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (platform, account) = s
            .rsplit_once('-')
            .ok_or_else(|| format!("malformed XPID: {}", s))?;
        let account_id = account
            .parse::<u64>()
            .map_err(|_| format!("malformed XPID account number: {}", s))?;
        Ok(Self {
            platform_code: platform.to_string(),
            account_id,
        })
    }
}

impl Serialize for Xpid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl<'de> Deserialize<'de> for Xpid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
