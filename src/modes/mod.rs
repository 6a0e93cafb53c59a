//! Mode engine.
//!
//! Channel and user modes share one algorithm; the only difference is the
//! Status type, which exists for channels alone. See [`engine`].

mod engine;

use crate::modules::Arg;
use crate::state::Matrix;
use meshirc_proto::UserUuid;
use std::fmt;

/// Which mode table a letter lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeScope {
    Channel,
    User,
}

impl ModeScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ModeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity a mode string is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeTarget {
    /// Folded channel key.
    Channel(String),
    User(UserUuid),
}

impl ModeTarget {
    pub fn scope(&self) -> ModeScope {
        match self {
            Self::Channel(_) => ModeScope::Channel,
            Self::User(_) => ModeScope::User,
        }
    }

    pub fn to_arg(&self) -> Arg {
        match self {
            Self::Channel(key) => Arg::Channel(key.clone()),
            Self::User(uuid) => Arg::User(uuid.clone()),
        }
    }

    pub fn from_arg(arg: &Arg) -> Option<Self> {
        match arg {
            Arg::Channel(key) => Some(Self::Channel(key.clone())),
            Arg::User(uuid) => Some(Self::User(uuid.clone())),
            _ => None,
        }
    }
}

impl Matrix {
    /// Whether the entity currently carries a mode.
    pub fn target_has_mode(&self, target: &ModeTarget, letter: char) -> bool {
        match target {
            ModeTarget::Channel(key) => self.channels.get(key).is_some_and(|c| c.modes.has(letter)),
            ModeTarget::User(uuid) => self.users.get(uuid).is_some_and(|u| u.modes.has(letter)),
        }
    }
}
