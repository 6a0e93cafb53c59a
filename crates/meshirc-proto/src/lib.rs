//! # meshirc-proto
//!
//! Shared vocabulary for the meshircd daemon:
//!
//! - validated identifiers ([`ServerId`], [`UserUuid`], [`ServerName`], [`ChannelName`])
//! - RFC 1459 case mapping and wildcard mask matching
//! - mode primitives ([`ModeType`], [`ModeChange`])
//! - the parsed [`CommandRecord`] delivered by transport collaborators
//! - the server-link wire contract ([`LinkMessage`])
//!
//! Line framing and the textual IRC grammar are deliberately not part of
//! this crate; transports hand over already-parsed records.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod id;
pub mod link;
pub mod mode;
pub mod name;
pub mod record;

pub use casemap::{irc_eq, irc_lower_char, irc_to_lower, wildcard_match};
pub use id::{IdError, ServerId, UUID_SUFFIX_LEN, UserUuid, UuidCounter};
pub use link::{
    COMPATIBLE_VERSIONS, LinkMessage, PROTOCOL_VERSION, SourceRef, SyncTarget, is_compatible,
};
pub use mode::{ModeChange, ModeType, format_changes, is_valid_mode_letter};
pub use name::{ChannelName, NameError, ServerName, CHANNEL_NAME_MAX, SERVER_NAME_MAX};
pub use record::CommandRecord;
