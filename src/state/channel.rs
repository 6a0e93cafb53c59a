//! Channel entity.

use super::metadata::Metadata;
use super::modes::ModeStore;
use meshirc_proto::{ChannelName, UserUuid};
use std::collections::BTreeMap;

/// Channel topic with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub name: ChannelName,
    /// Creation time, the authority for burst conflicts.
    pub created: i64,
    pub topic: Option<Topic>,
    /// Member uuid to status letters, highest rank first.
    pub members: BTreeMap<UserUuid, String>,
    pub modes: ModeStore,
    pub metadata: Metadata,
}

impl Channel {
    pub fn new(name: ChannelName, created: i64) -> Self {
        Self {
            name,
            created,
            topic: None,
            members: BTreeMap::new(),
            modes: ModeStore::default(),
            metadata: Metadata::default(),
        }
    }

    pub fn key(&self) -> &str {
        self.name.key()
    }

    pub fn is_member(&self, uuid: &UserUuid) -> bool {
        self.members.contains_key(uuid)
    }

    /// Status letters held by a member, highest rank first.
    pub fn status(&self, uuid: &UserUuid) -> Option<&str> {
        self.members.get(uuid).map(String::as_str)
    }

    /// Throw away every mode, status and topic. Used when a remote burst
    /// proves this copy of the channel is the younger one.
    pub fn reset(&mut self, created: i64) {
        self.created = created;
        self.topic = None;
        self.modes.clear();
        self.metadata = Metadata::default();
        for status in self.members.values_mut() {
            status.clear();
        }
    }
}
