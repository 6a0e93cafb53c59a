//! Server-to-server link contract.
//!
//! Every record exchanged between linked servers is a [`LinkMessage`]. The
//! encoding is left to the transport; the types only fix which fields must
//! survive the trip. Entity-carrying records always include the entity's
//! creation timestamp (unix seconds) so the receiver can resolve conflicts.

use crate::id::{ServerId, UserUuid};
use crate::record::CommandRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Link protocol version spoken by this build.
pub const PROTOCOL_VERSION: u32 = 200;

/// Protocol versions this build can link with. Always contains
/// [`PROTOCOL_VERSION`].
pub const COMPATIBLE_VERSIONS: &[u32] = &[200];

/// Whether a peer's advertised protocol version is acceptable.
#[must_use]
pub fn is_compatible(version: u32) -> bool {
    COMPATIBLE_VERSIONS.contains(&version)
}

/// The identity a relayed change is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceRef {
    /// A server, by ID.
    Server(ServerId),
    /// A user, by uuid.
    User(UserUuid),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(sid) => write!(f, "{sid}"),
            Self::User(uuid) => write!(f, "{uuid}"),
        }
    }
}

/// The entity a mode or metadata record applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTarget {
    /// A channel, by name.
    Channel(String),
    /// A user, by uuid.
    User(UserUuid),
}

/// One server-link record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkMessage {
    /// Handshake, sent by the initiator first and answered by the responder.
    Introduce {
        /// Server name (contains a dot).
        name: String,
        /// Pre-shared link secret.
        password: String,
        /// Free-form description.
        description: String,
        /// Sender's [`PROTOCOL_VERSION`].
        protocol_version: u32,
        /// Names of the sender's loaded common modules.
        common_modules: BTreeSet<String>,
        /// Sender's server ID.
        sid: ServerId,
    },
    /// Topology announcement for a server behind the sender.
    AddServer {
        /// New server's ID.
        sid: ServerId,
        /// New server's name.
        name: String,
        /// New server's description.
        description: String,
        /// Hops from the receiver.
        hop_count: u32,
        /// The server one hop closer to the sender.
        near_hop: ServerId,
    },
    /// A server and everything behind it split off.
    ServerDisconnected {
        /// The server whose link was lost.
        sid: ServerId,
    },
    /// A user connected somewhere in the mesh.
    ConnectUser {
        /// Network-unique ID.
        uuid: UserUuid,
        /// Current nickname.
        nick: String,
        /// Username.
        ident: String,
        /// Displayed host.
        host: String,
        /// Real name.
        realname: String,
        /// Connection time.
        connect_ts: i64,
        /// Time the nickname was taken.
        nick_ts: i64,
    },
    /// A user left the network.
    RemoveUser {
        /// Departing user.
        uuid: UserUuid,
        /// Quit reason.
        reason: String,
    },
    /// Applied mode changes on a channel or user.
    SetMode {
        /// Who made the changes.
        source: SourceRef,
        /// The entity changed.
        target: SyncTarget,
        /// Creation time of the target.
        target_ts: i64,
        /// Mode string, e.g. `+ov-b`.
        modes: String,
        /// Positional parameters.
        params: Vec<String>,
    },
    /// Metadata update. `value: None` deletes the key.
    SetMetadata {
        /// The entity changed.
        target: SyncTarget,
        /// Creation time of the target.
        target_ts: i64,
        /// Namespace (`server`, `user`, `client`, `ext`, `private`).
        namespace: String,
        /// Metadata key.
        key: String,
        /// New value.
        value: Option<String>,
    },
    /// A user joined a channel.
    JoinChannel {
        /// Channel name.
        channel: String,
        /// Channel creation time on the sender.
        channel_ts: i64,
        /// Joining user.
        user: UserUuid,
    },
    /// A user left a channel.
    LeaveChannel {
        /// Channel name.
        channel: String,
        /// Leaving user.
        user: UserUuid,
        /// Part reason.
        reason: Option<String>,
    },
    /// Channel topic update.
    SetTopic {
        /// Channel name.
        channel: String,
        /// Channel creation time on the sender.
        channel_ts: i64,
        /// Topic text.
        topic: String,
        /// Setter hostmask or name.
        setter: String,
        /// Time the topic was set.
        topic_ts: i64,
    },
    /// The sender finished replaying its state.
    EndBurst,
    /// Module-defined server command.
    Extension {
        /// Originating identity.
        source: SourceRef,
        /// Parsed command.
        record: CommandRecord,
    },
    /// Recoverable error answer. The link stays up.
    ErrorReply {
        /// Stable error code.
        code: String,
        /// Short description.
        detail: String,
    },
}

impl LinkMessage {
    /// Short record name for logging and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Introduce { .. } => "introduce",
            Self::AddServer { .. } => "add_server",
            Self::ServerDisconnected { .. } => "server_disconnected",
            Self::ConnectUser { .. } => "connect_user",
            Self::RemoveUser { .. } => "remove_user",
            Self::SetMode { .. } => "set_mode",
            Self::SetMetadata { .. } => "set_metadata",
            Self::JoinChannel { .. } => "join_channel",
            Self::LeaveChannel { .. } => "leave_channel",
            Self::SetTopic { .. } => "set_topic",
            Self::EndBurst => "end_burst",
            Self::Extension { .. } => "extension",
            Self::ErrorReply { .. } => "error_reply",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_version_is_compatible() {
        assert!(is_compatible(PROTOCOL_VERSION));
        assert!(!is_compatible(PROTOCOL_VERSION + 1));
    }

    #[test]
    fn messages_are_tagged_by_kind() {
        let msg = LinkMessage::ServerDisconnected {
            sid: ServerId::parse("3CC").unwrap(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"server_disconnected","sid":"3CC"}"#);
        let back: LinkMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "server_disconnected");
    }
}
