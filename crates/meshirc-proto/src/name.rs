//! Validated server and channel names.

use crate::casemap::irc_to_lower;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of a channel name.
pub const CHANNEL_NAME_MAX: usize = 64;

/// Maximum length of a server name.
pub const SERVER_NAME_MAX: usize = 64;

/// Name validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// Empty name.
    #[error("name is empty")]
    Empty,
    /// Name exceeds the length cap.
    #[error("name is longer than {max} characters")]
    TooLong {
        /// Maximum accepted length.
        max: usize,
    },
    /// Server name without a dot.
    #[error("server name '{0}' must look like a domain name")]
    NotADomain(String),
    /// Channel name containing a separator or control character.
    #[error("channel name '{0}' contains a forbidden character")]
    ForbiddenChar(String),
}

/// A server name, which must look like a domain (contain a dot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerName(String);

impl ServerName {
    /// Validate a server name.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.chars().count() > SERVER_NAME_MAX {
            return Err(NameError::TooLong {
                max: SERVER_NAME_MAX,
            });
        }
        if !name.contains('.') || name.contains(' ') {
            return Err(NameError::NotADomain(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServerName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerName> for String {
    fn from(value: ServerName) -> Self {
        value.0
    }
}

/// A channel name with its case-folded lookup key.
///
/// The display form keeps the casing of whoever created the channel; the
/// key is what channel tables are indexed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName {
    display: String,
    key: String,
}

impl ChannelName {
    /// Validate a channel name.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.chars().count() > CHANNEL_NAME_MAX {
            return Err(NameError::TooLong {
                max: CHANNEL_NAME_MAX,
            });
        }
        if name
            .chars()
            .any(|c| matches!(c, ' ' | ',' | '\0' | '\x07' | '\r' | '\n'))
        {
            return Err(NameError::ForbiddenChar(name.to_string()));
        }
        Ok(Self {
            display: name.to_string(),
            key: irc_to_lower(name),
        })
    }

    /// The name as first seen.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// The case-folded lookup key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
