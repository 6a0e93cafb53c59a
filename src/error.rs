//! Unified error handling for meshircd.
//!
//! Each concern gets its own enum, matching the severity classes the daemon
//! distinguishes: fatal to the process, to one registration, to one mode
//! call, or to one server link.

use meshirc_proto::{IdError, NameError};
use thiserror::Error;

// ============================================================================
// Module registration
// ============================================================================

/// A module load or unload was refused. Tables are untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("module {0} is already loaded")]
    AlreadyLoaded(String),

    #[error("module {0} is still unloading")]
    Unloading(String),

    #[error("module has no name")]
    MissingName,

    #[error("module {module}: {scope} mode {letter} is already provided by {owner}")]
    ModeConflict {
        module: String,
        scope: &'static str,
        letter: char,
        owner: String,
    },

    #[error("module {module}: '{letter}' is not a valid mode letter")]
    InvalidModeLetter { module: String, letter: char },

    #[error("module {module}: status symbol {symbol} is already used by mode {existing}")]
    StatusSymbolConflict {
        module: String,
        symbol: char,
        existing: char,
    },

    #[error("module {module}: status mode {letter} needs a rank and a symbol")]
    StatusMissingRank { module: String, letter: char },

    #[error("module {module}: status symbol '{symbol}' for mode {letter} is not printable")]
    InvalidStatusSymbol {
        module: String,
        letter: char,
        symbol: char,
    },

    #[error("module {module}: user mode {letter} cannot be a status mode")]
    UserStatusMode { module: String, letter: char },

    #[error("module {module}: invalid command name '{command}'")]
    InvalidCommandName { module: String, command: String },

    #[error("module {0} is not loaded")]
    NotLoaded(String),

    #[error("module {0} is a core module and cannot be unloaded")]
    CoreModule(String),
}

impl RegistryError {
    /// The module the error concerns, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::AlreadyLoaded(m)
            | Self::Unloading(m)
            | Self::NotLoaded(m)
            | Self::CoreModule(m) => Some(m),
            Self::MissingName => None,
            Self::ModeConflict { module, .. }
            | Self::InvalidModeLetter { module, .. }
            | Self::StatusSymbolConflict { module, .. }
            | Self::StatusMissingRank { module, .. }
            | Self::InvalidStatusSymbol { module, .. }
            | Self::UserStatusMode { module, .. }
            | Self::InvalidCommandName { module, .. } => Some(module),
        }
    }
}

// ============================================================================
// Mode engine
// ============================================================================

/// Errors that abort a whole mode call. Per-letter problems never surface
/// here; they are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("cannot resolve mode source {0}")]
    UnresolvedSource(String),

    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("no such user: {0}")]
    NoSuchUser(String),
}

// ============================================================================
// Server links
// ============================================================================

/// Server-link errors, split into recoverable answers and link-fatal ones.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("handshake already completed")]
    HandshakeAlreadyComplete,

    #[error("handshake not yet completed")]
    HandshakeNotComplete,

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("no such target: {0}")]
    NoSuchTarget(String),

    #[error("user {0} is already connected")]
    UserAlreadyConnected(String),

    #[error("no such server: {0}")]
    NoSuchServer(String),

    #[error("protocol version {0} is not compatible")]
    IncompatibleVersion(u32),

    #[error("common module sets differ: {0:?}")]
    ModuleMismatch(Vec<String>),

    #[error("no link block for server {0}")]
    NoLinkConfigured(String),

    #[error("server {name} connected from unexpected address {address}")]
    MismatchedAddress { name: String, address: String },

    #[error("bad link password from {0}")]
    BadPassword(String),

    #[error("server {0} is already connected")]
    ServerAlreadyConnected(String),

    #[error("unknown near hop {0}")]
    UnknownNearHop(String),
}

impl LinkError {
    /// Whether the link must be dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleVersion(_)
                | Self::ModuleMismatch(_)
                | Self::NoLinkConfigured(_)
                | Self::MismatchedAddress { .. }
                | Self::BadPassword(_)
                | Self::ServerAlreadyConnected(_)
                | Self::UnknownNearHop(_)
        )
    }

    /// Whether an `ErrorReply` code received from a peer means it dropped us.
    pub fn is_fatal_code(code: &str) -> bool {
        matches!(
            code,
            "INCOMPATIBLE_VERSION"
                | "MODULE_MISMATCH"
                | "NO_LINK_CONFIGURED"
                | "MISMATCHED_ADDRESS"
                | "BAD_PASSWORD"
                | "SERVER_ALREADY_CONNECTED"
                | "UNKNOWN_NEAR_HOP"
        )
    }

    /// Static error code for the wire and for metrics labels.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::HandshakeAlreadyComplete => "HANDSHAKE_ALREADY_COMPLETE",
            Self::HandshakeNotComplete => "HANDSHAKE_NOT_COMPLETE",
            Self::NoSuchUser(_) => "NO_SUCH_USER",
            Self::NoSuchChannel(_) => "NO_SUCH_CHANNEL",
            Self::NoSuchTarget(_) => "NO_SUCH_TARGET",
            Self::UserAlreadyConnected(_) => "USER_ALREADY_CONNECTED",
            Self::NoSuchServer(_) => "NO_SUCH_SERVER",
            Self::IncompatibleVersion(_) => "INCOMPATIBLE_VERSION",
            Self::ModuleMismatch(_) => "MODULE_MISMATCH",
            Self::NoLinkConfigured(_) => "NO_LINK_CONFIGURED",
            Self::MismatchedAddress { .. } => "MISMATCHED_ADDRESS",
            Self::BadPassword(_) => "BAD_PASSWORD",
            Self::ServerAlreadyConnected(_) => "SERVER_ALREADY_CONNECTED",
            Self::UnknownNearHop(_) => "UNKNOWN_NEAR_HOP",
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// A local user could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("no free uuid left")]
    UuidSpaceExhausted,
}

// ============================================================================
// Startup
// ============================================================================

/// Problems that prevent the daemon from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),

    #[error("invalid server ID: {0}")]
    ServerId(#[from] IdError),

    #[error("invalid server name: {0}")]
    ServerName(#[from] NameError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to load core module: {0}")]
    CoreModule(#[from] RegistryError),
}

// ============================================================================
// Storage
// ============================================================================

/// Key-value storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_error_severity() {
        assert!(!LinkError::HandshakeNotComplete.is_fatal());
        assert!(!LinkError::NoSuchUser("1AAAAAAAA".into()).is_fatal());
        assert!(LinkError::ModuleMismatch(vec!["ChannelOpAccess".into()]).is_fatal());
        assert!(LinkError::BadPassword("hub.example.net".into()).is_fatal());
        assert_eq!(LinkError::IncompatibleVersion(1).error_code(), "INCOMPATIBLE_VERSION");
    }

    #[test]
    fn fatal_codes_match_fatal_errors() {
        let errors = [
            LinkError::HandshakeAlreadyComplete,
            LinkError::HandshakeNotComplete,
            LinkError::NoSuchUser(String::new()),
            LinkError::NoSuchChannel(String::new()),
            LinkError::NoSuchTarget(String::new()),
            LinkError::UserAlreadyConnected(String::new()),
            LinkError::NoSuchServer(String::new()),
            LinkError::IncompatibleVersion(1),
            LinkError::ModuleMismatch(Vec::new()),
            LinkError::NoLinkConfigured(String::new()),
            LinkError::MismatchedAddress {
                name: String::new(),
                address: String::new(),
            },
            LinkError::BadPassword(String::new()),
            LinkError::ServerAlreadyConnected(String::new()),
            LinkError::UnknownNearHop(String::new()),
        ];
        for err in errors {
            assert_eq!(LinkError::is_fatal_code(err.error_code()), err.is_fatal(), "{err:?}");
        }
    }

    #[test]
    fn registry_error_names_module_and_conflict() {
        let err = RegistryError::ModeConflict {
            module: "Second".into(),
            scope: "channel",
            letter: 'q',
            owner: "First".into(),
        };
        assert_eq!(err.module(), Some("Second"));
        let text = err.to_string();
        assert!(text.contains("Second"));
        assert!(text.contains("First"));
        assert!(text.contains('q'));
    }
}
