//! State burst for a newly linked peer.
//!
//! Order matters: servers first so the peer knows the whole tree, then
//! users (connect, modes, metadata), then channels (membership, modes with
//! statuses folded in, topic, metadata), then `EndBurst`. Every record
//! carries the entity's creation timestamp.

use super::LinkId;
use crate::state::Matrix;
use meshirc_proto::{LinkMessage, ModeChange, SourceRef, SyncTarget, format_changes};
use tracing::info;

impl Matrix {
    /// Build the burst for a link. Entities behind the link itself are
    /// left out.
    pub fn generate_burst(&self, id: LinkId) -> Vec<LinkMessage> {
        let mut messages = Vec::new();
        let behind = |sid: &meshirc_proto::ServerId| self.sync.link_for(sid) == Some(id);
        let local = SourceRef::Server(self.server.id.clone());

        for node in self.sync.topology.bfs_order() {
            if node.link == id {
                continue;
            }
            messages.push(LinkMessage::AddServer {
                sid: node.id.clone(),
                name: node.name.as_str().to_string(),
                description: node.description.clone(),
                hop_count: node.hop_count + 1,
                near_hop: node.next_closest.clone(),
            });
        }

        let mut users: Vec<_> = self.users.values().filter(|u| !behind(&u.server)).collect();
        users.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        for user in &users {
            messages.push(LinkMessage::ConnectUser {
                uuid: user.uuid.clone(),
                nick: user.nick.clone(),
                ident: user.ident.clone(),
                host: user.host.clone(),
                realname: user.realname.clone(),
                connect_ts: user.connect_ts,
                nick_ts: user.nick_ts,
            });
            let (modes, params) = user.modes.to_mode_string();
            if modes.len() > 1 {
                messages.push(LinkMessage::SetMode {
                    source: local.clone(),
                    target: SyncTarget::User(user.uuid.clone()),
                    target_ts: user.connect_ts,
                    modes,
                    params,
                });
            }
            for (namespace, key, value) in user.metadata.iter() {
                messages.push(LinkMessage::SetMetadata {
                    target: SyncTarget::User(user.uuid.clone()),
                    target_ts: user.connect_ts,
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    value: Some(value.to_string()),
                });
            }
        }

        let chunk = self.limits.max_mode_changes.max(1);
        for channel in self.channels.values() {
            let name = channel.name.as_str().to_string();
            let mut changes = Vec::new();
            for (uuid, statuses) in &channel.members {
                if behind(&uuid.server_id()) {
                    continue;
                }
                messages.push(LinkMessage::JoinChannel {
                    channel: name.clone(),
                    channel_ts: channel.created,
                    user: uuid.clone(),
                });
                changes.extend(
                    statuses
                        .chars()
                        .map(|letter| ModeChange::new(true, letter, Some(uuid.to_string()))),
                );
            }
            for (letter, value) in &channel.modes.values {
                changes.push(ModeChange::new(true, *letter, value.clone()));
            }
            for (letter, entries) in &channel.modes.lists {
                changes.extend(
                    entries
                        .iter()
                        .map(|e| ModeChange::new(true, *letter, Some(e.param.clone()))),
                );
            }
            for batch in changes.chunks(chunk) {
                let (modes, params) = format_changes(batch);
                messages.push(LinkMessage::SetMode {
                    source: local.clone(),
                    target: SyncTarget::Channel(name.clone()),
                    target_ts: channel.created,
                    modes,
                    params,
                });
            }
            if let Some(topic) = &channel.topic {
                messages.push(LinkMessage::SetTopic {
                    channel: name.clone(),
                    channel_ts: channel.created,
                    topic: topic.text.clone(),
                    setter: topic.set_by.clone(),
                    topic_ts: topic.set_at,
                });
            }
            for (namespace, key, value) in channel.metadata.iter() {
                messages.push(LinkMessage::SetMetadata {
                    target: SyncTarget::Channel(name.clone()),
                    target_ts: channel.created,
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    value: Some(value.to_string()),
                });
            }
        }

        messages.push(LinkMessage::EndBurst);
        messages
    }

    pub(crate) fn send_burst(&mut self, id: LinkId) {
        let messages = self.generate_burst(id);
        info!(link = %id, records = messages.len(), "Sending burst");
        for message in messages {
            self.send_on_link(id, message);
        }
    }
}
