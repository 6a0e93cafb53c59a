//! Validated network identifiers.
//!
//! Server IDs and user uuids are used as map keys throughout the daemon, so
//! they are checked once at construction and carried as opaque values.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of the per-server uuid suffix.
pub const UUID_SUFFIX_LEN: usize = 6;

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Server IDs are exactly three characters.
    #[error("server ID must be exactly 3 characters, got {0}")]
    ServerIdLength(usize),
    /// Server IDs are `[0-9][A-Z0-9][A-Z0-9]`.
    #[error("server ID must be alphanumeric and start with a digit, got '{0}'")]
    ServerIdFormat(String),
    /// User uuids are exactly nine characters.
    #[error("uuid must be exactly 9 characters, got {0}")]
    UuidLength(usize),
    /// The six-character suffix is `[A-Z][A-Z0-9]{5}`.
    #[error("uuid suffix must be a letter followed by [A-Z0-9], got '{0}'")]
    UuidFormat(String),
}

/// A server's 3-character network-unique identifier, e.g. `1AA`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    /// Validate and upper-case a server ID.
    pub fn parse(sid: &str) -> Result<Self, IdError> {
        let sid = sid.to_ascii_uppercase();
        if sid.chars().count() != 3 {
            return Err(IdError::ServerIdLength(sid.chars().count()));
        }
        let mut chars = sid.chars();
        let first_is_digit = chars.next().is_some_and(|c| c.is_ascii_digit());
        if !first_is_digit || !sid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdError::ServerIdFormat(sid));
        }
        Ok(Self(sid))
    }

    /// The ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServerId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerId> for String {
    fn from(value: ServerId) -> Self {
        value.0
    }
}

/// A network-unique user identifier: owning server ID + 6-character counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserUuid(String);

impl UserUuid {
    /// Build a uuid from a server ID and a counter suffix.
    pub fn new(server: &ServerId, suffix: &str) -> Result<Self, IdError> {
        Self::parse(&format!("{}{}", server.as_str(), suffix))
    }

    /// Validate a full 9-character uuid.
    pub fn parse(uuid: &str) -> Result<Self, IdError> {
        let len = uuid.chars().count();
        if len != 3 + UUID_SUFFIX_LEN {
            return Err(IdError::UuidLength(len));
        }
        if !uuid.is_ascii() {
            return Err(IdError::UuidFormat(uuid.to_string()));
        }
        ServerId::parse(&uuid[..3])?;
        let suffix = &uuid[3..];
        let leading_letter = suffix.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        let rest_ok = suffix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !leading_letter || !rest_ok {
            return Err(IdError::UuidFormat(suffix.to_string()));
        }
        Ok(Self(uuid.to_ascii_uppercase()))
    }

    /// Build the uuid for a counter value. Counter values are valid suffixes
    /// by construction.
    pub fn from_counter(server: &ServerId, counter: &UuidCounter) -> Self {
        Self(format!("{}{}", server.as_str(), counter.as_str()))
    }

    /// The owning server's ID (first three characters).
    #[must_use]
    pub fn server_id(&self) -> ServerId {
        ServerId(self.0[..3].to_string())
    }

    /// The uuid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserUuid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserUuid> for String {
    fn from(value: UserUuid) -> Self {
        value.0
    }
}

/// Six-position uuid suffix counter.
///
/// Non-leading positions step `A..Z` then `0..9`; a position past `9` wraps
/// to `0` and carries into its left neighbour. The leading position only
/// takes letters, and carrying past its `Z` wraps the whole counter back to
/// `AAAAAA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuidCounter([u8; UUID_SUFFIX_LEN]);

impl Default for UuidCounter {
    fn default() -> Self {
        Self([b'A'; UUID_SUFFIX_LEN])
    }
}

impl UuidCounter {
    /// Resume from a known suffix.
    pub fn from_suffix(suffix: &str) -> Result<Self, IdError> {
        let bytes: [u8; UUID_SUFFIX_LEN] = suffix
            .as_bytes()
            .try_into()
            .map_err(|_| IdError::UuidFormat(suffix.to_string()))?;
        let leading_ok = bytes[0].is_ascii_uppercase();
        let rest_ok = bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if !leading_ok || !rest_ok {
            return Err(IdError::UuidFormat(suffix.to_string()));
        }
        Ok(Self(bytes))
    }

    /// The current suffix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("AAAAAA")
    }

    /// Step to the next value.
    pub fn advance(&mut self) {
        for pos in (1..UUID_SUFFIX_LEN).rev() {
            match self.0[pos] {
                b'Z' => {
                    self.0[pos] = b'0';
                    return;
                }
                b'9' => self.0[pos] = b'0',
                c => {
                    self.0[pos] = c + 1;
                    return;
                }
            }
        }
        if self.0[0] == b'Z' {
            self.0 = [b'A'; UUID_SUFFIX_LEN];
        } else {
            self.0[0] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_id_accepts_digit_prefix() {
        let sid = ServerId::parse("1aa").unwrap();
        assert_eq!(sid.as_str(), "1AA");
    }

    #[test]
    fn server_id_rejects_bad_input() {
        assert_eq!(ServerId::parse("1A"), Err(IdError::ServerIdLength(2)));
        assert!(matches!(ServerId::parse("AAA"), Err(IdError::ServerIdFormat(_))));
        assert!(matches!(ServerId::parse("1A-"), Err(IdError::ServerIdFormat(_))));
    }

    #[test]
    fn uuid_carries_server_prefix() {
        let sid = ServerId::parse("2BB").unwrap();
        let uuid = UserUuid::new(&sid, "AAAAB0").unwrap();
        assert_eq!(uuid.as_str(), "2BBAAAAB0");
        assert_eq!(uuid.server_id(), sid);
    }

    #[test]
    fn uuid_rejects_digit_leading_suffix() {
        assert!(matches!(UserUuid::parse("2BB0AAAAA"), Err(IdError::UuidFormat(_))));
        assert!(matches!(UserUuid::parse("2BBAAAA"), Err(IdError::UuidLength(7))));
    }

    fn advanced(start: &str) -> String {
        let mut counter = UuidCounter::from_suffix(start).unwrap();
        counter.advance();
        counter.as_str().to_string()
    }

    #[test]
    fn counter_starts_at_all_a() {
        assert_eq!(UuidCounter::default().as_str(), "AAAAAA");
        assert_eq!(advanced("AAAAAA"), "AAAAAB");
    }

    #[test]
    fn counter_letters_roll_into_digits() {
        assert_eq!(advanced("AAAAAZ"), "AAAAA0");
        assert_eq!(advanced("AAAAA0"), "AAAAA1");
    }

    #[test]
    fn counter_carries_past_nine() {
        assert_eq!(advanced("AAAAA9"), "AAAAB0");
        assert_eq!(advanced("AAAZ99"), "AAA000");
    }

    #[test]
    fn counter_leading_position_is_letters_only() {
        assert_eq!(advanced("A99999"), "B00000");
        assert_eq!(advanced("Z99999"), "AAAAAA");
        assert!(UuidCounter::from_suffix("0AAAAA").is_err());
    }

    #[test]
    fn ids_deserialize_with_validation() {
        let sid: ServerId = serde_json::from_str("\"9ZZ\"").unwrap();
        assert_eq!(sid.as_str(), "9ZZ");
        assert!(serde_json::from_str::<ServerId>("\"ZZZ\"").is_err());
    }
}
