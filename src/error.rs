//! Error types for the matchmaking engine
//!
//! Two layers live here: `MatchmakingError` is the internal taxonomy used
//! throughout the crate, and `LobbyError` is the wire-facing lobby error with
//! client-stable numeric codes, translated onto `LobbySessionFailure`
//! payloads and from generic RPC status codes.

use crate::types::GameMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Internal error taxonomy for engine operations
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("bad input: {reason}")]
    BadInput { reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("version conflict writing {collection}/{key}")]
    Conflict { collection: String, key: String },

    #[error("document exceeds size budget after eviction: {size} bytes")]
    Exhausted { size: usize },

    #[error("collaborator unavailable: {message}")]
    Unavailable { message: String },

    #[error("operation timed out: {message}")]
    Timeout { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Lobby error codes. These values are hard-coded in the game client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum LobbyErrorCode {
    UnknownError = -1,
    TimeoutServerFindFailed = 0,
    UpdateRequired = 1,
    BadRequest = 2,
    Timeout = 3,
    ServerDoesNotExist = 4,
    ServerIncompatible = 5,
    ServerFindFailed = 6,
    ServerIsLocked = 7,
    ServerIsFull = 8,
    InternalError = 9,
    MissingEntitlement = 10,
    BannedFromLobbyGroup = 11,
    KickedFromLobbyGroup = 12,
    NotALobbyGroupMod = 13,
}

impl LobbyErrorCode {
    pub fn value(self) -> i32 {
        self as i32
    }

    fn prefix(self) -> &'static str {
        match self {
            LobbyErrorCode::TimeoutServerFindFailed => "timeout: server find failed: ",
            LobbyErrorCode::UpdateRequired => "update required: ",
            LobbyErrorCode::BadRequest => "bad request: ",
            LobbyErrorCode::Timeout => "timeout: ",
            LobbyErrorCode::ServerDoesNotExist => "server does not exist: ",
            LobbyErrorCode::ServerIncompatible => "server is incompatible: ",
            LobbyErrorCode::ServerFindFailed => "server find failed: ",
            LobbyErrorCode::ServerIsLocked => "server is locked: ",
            LobbyErrorCode::ServerIsFull => "server is full: ",
            LobbyErrorCode::InternalError => "internal error: ",
            LobbyErrorCode::MissingEntitlement => "missing entitlement: ",
            LobbyErrorCode::BannedFromLobbyGroup => "banned: ",
            LobbyErrorCode::KickedFromLobbyGroup => "kicked: ",
            LobbyErrorCode::NotALobbyGroupMod => "not a mod: ",
            LobbyErrorCode::UnknownError => "unknown error: ",
        }
    }

    /// Map a transport-level status code onto a lobby error code.
    ///
    /// `RpcCode::Ok` maps to `None` (no failure to report).
    pub fn from_rpc(code: RpcCode) -> Option<Self> {
        match code {
            RpcCode::Ok => None,
            RpcCode::Cancelled | RpcCode::InvalidArgument => Some(LobbyErrorCode::BadRequest),
            RpcCode::NotFound => Some(LobbyErrorCode::ServerDoesNotExist),
            RpcCode::AlreadyExists | RpcCode::FailedPrecondition => {
                Some(LobbyErrorCode::ServerIncompatible)
            }
            RpcCode::PermissionDenied => Some(LobbyErrorCode::KickedFromLobbyGroup),
            RpcCode::ResourceExhausted => Some(LobbyErrorCode::ServerIsFull),
            RpcCode::Unavailable => Some(LobbyErrorCode::ServerFindFailed),
            RpcCode::DeadlineExceeded => Some(LobbyErrorCode::TimeoutServerFindFailed),
            RpcCode::Aborted
            | RpcCode::OutOfRange
            | RpcCode::Unimplemented
            | RpcCode::Internal
            | RpcCode::DataLoss
            | RpcCode::Unauthenticated => Some(LobbyErrorCode::InternalError),
            RpcCode::Unknown => Some(LobbyErrorCode::InternalError),
        }
    }
}

/// Generic RPC status codes as surfaced by transport collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

/// A transport status error carrying an RPC code
#[derive(Debug, thiserror::Error)]
#[error("rpc status {code:?}: {message}")]
pub struct RpcStatus {
    pub code: RpcCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Lobby error with a client-stable numeric code
#[derive(Debug)]
pub struct LobbyError {
    code: LobbyErrorCode,
    message: String,
    source: Option<anyhow::Error>,
}

impl LobbyError {
    pub fn new(code: LobbyErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(code: LobbyErrorCode, message: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn code(&self) -> LobbyErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LobbyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code.prefix(), self.message)
    }
}

impl std::error::Error for LobbyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref())
    }
}

/// Check whether `err` is a `LobbyError` with the given code.
pub fn lobby_error_is(err: &anyhow::Error, code: LobbyErrorCode) -> bool {
    err.downcast_ref::<LobbyError>()
        .map(|e| e.code == code)
        .unwrap_or(false)
}

/// Extract the lobby error code from `err`, falling back to `UnknownError`.
pub fn lobby_error_code(err: &anyhow::Error) -> LobbyErrorCode {
    err.downcast_ref::<LobbyError>()
        .map(|e| e.code)
        .unwrap_or(LobbyErrorCode::UnknownError)
}

/// Tagged failure message emitted on the wire when a lobby session fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySessionFailure {
    pub mode: String,
    pub group_id: Uuid,
    pub code: i32,
    pub message: String,
}

/// Convert an error into a `LobbySessionFailure` payload.
///
/// Lobby errors keep their own code and message; transport status errors map
/// through `LobbyErrorCode::from_rpc`; anything else is an internal error.
pub fn lobby_session_failure(
    mode: GameMode,
    group_id: Uuid,
    err: &anyhow::Error,
) -> Option<LobbySessionFailure> {
    let (code, message) = if let Some(lobby_err) = err.downcast_ref::<LobbyError>() {
        (lobby_err.code, lobby_err.message.clone())
    } else if let Some(status) = err.downcast_ref::<RpcStatus>() {
        let code = LobbyErrorCode::from_rpc(status.code)?;
        (code, status.message.clone())
    } else {
        (LobbyErrorCode::InternalError, err.to_string())
    };

    Some(LobbySessionFailure {
        mode: mode.to_string(),
        group_id,
        code: code.value(),
        message,
    })
}
