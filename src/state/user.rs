//! User entity.

use super::metadata::Metadata;
use super::modes::ModeStore;
use meshirc_proto::{ServerId, UserUuid};
use std::collections::BTreeSet;

/// A user connected somewhere in the mesh.
#[derive(Debug, Clone)]
pub struct User {
    pub uuid: UserUuid,
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realname: String,
    /// Server the user is connected to.
    pub server: ServerId,
    pub connect_ts: i64,
    pub nick_ts: i64,
    pub modes: ModeStore,
    pub metadata: Metadata,
    /// Folded names of joined channels.
    pub channels: BTreeSet<String>,
}

impl User {
    /// `nick!ident@host`.
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.host)
    }
}
