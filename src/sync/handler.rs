//! Applying records received from a linked peer.

use super::handshake::Introduction;
use super::topology::ServerNode;
use super::{HandshakeState, LinkId, Propagate};
use crate::error::{LinkError, ModeError};
use crate::metrics;
use crate::modules::{Arg, Targets};
use crate::state::reply::ERR_NICKCOLLISION;
use crate::state::{Channel, Matrix, User};
use crate::telemetry::spans;
use meshirc_proto::{
    ChannelName, CommandRecord, LinkMessage, ServerId, ServerName, SourceRef, SyncTarget, UserUuid,
    irc_to_lower,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

impl From<ModeError> for LinkError {
    fn from(err: ModeError) -> Self {
        match err {
            ModeError::UnresolvedSource(s) => Self::NoSuchTarget(s),
            ModeError::NoSuchChannel(c) => Self::NoSuchChannel(c),
            ModeError::NoSuchUser(u) => Self::NoSuchUser(u),
        }
    }
}

/// Whether the remote copy of a conflicting entity wins. Earlier creation
/// wins; on a tie the side that initiated the link wins.
pub fn remote_wins(remote_ts: i64, local_ts: i64, local_origin: bool) -> bool {
    remote_ts < local_ts || (remote_ts == local_ts && !local_origin)
}

impl Matrix {
    /// Process one record from a server connection. Fatal errors drop the
    /// connection; recoverable ones are answered with `ErrorReply`.
    pub fn handle_link_message(&mut self, id: LinkId, message: LinkMessage) {
        let Some(link) = self.sync.link(id) else {
            debug!(link = %id, "record for unknown link");
            return;
        };
        let remote = link.remote.clone();
        let span = spans::peer(id.0, remote.as_ref().map(ServerId::as_str));
        let _guard = span.enter();
        metrics::record_link_message(message.kind());

        let established = link.state.is_established();
        let result = match (message, remote) {
            (
                LinkMessage::Introduce {
                    name,
                    password,
                    description,
                    protocol_version,
                    common_modules,
                    sid,
                },
                _,
            ) => self.handle_introduce(
                id,
                Introduction {
                    name,
                    password,
                    description,
                    protocol_version,
                    common_modules,
                    sid,
                },
            ),
            (LinkMessage::ErrorReply { code, detail }, _) => {
                warn!(link = %id, code = %code, detail = %detail, "Peer reported an error");
                if !established && LinkError::is_fatal_code(&code) {
                    self.close_link(id);
                }
                Ok(())
            }
            (message, Some(remote)) if established => self.apply_link_record(id, &remote, message),
            _ => Err(LinkError::HandshakeNotComplete),
        };

        if let Err(err) = result {
            let code = err.error_code();
            self.send_on_link(
                id,
                LinkMessage::ErrorReply {
                    code: code.to_string(),
                    detail: err.to_string(),
                },
            );
            if err.is_fatal() {
                warn!(link = %id, code, error = %err, "Dropping server link");
                metrics::record_link_rejection(code);
                self.close_link(id);
            } else {
                debug!(link = %id, code, error = %err, "Rejected link record");
            }
        }
    }

    fn apply_link_record(&mut self, id: LinkId, remote: &ServerId, message: LinkMessage) -> Result<(), LinkError> {
        match message {
            LinkMessage::AddServer {
                sid,
                name,
                description,
                hop_count,
                near_hop,
            } => self.remote_add_server(id, remote, sid, name, description, hop_count, near_hop),
            LinkMessage::ServerDisconnected { sid } => {
                let Some(node) = self.sync.topology.get(&sid) else {
                    return Err(LinkError::NoSuchServer(sid.to_string()));
                };
                if node.link != id {
                    warn!(sid = %sid, link = %id, via = %node.link, "Ignoring split for a server not routed through this link");
                    return Ok(());
                }
                self.netsplit(&sid, Some(id));
                Ok(())
            }
            LinkMessage::ConnectUser {
                uuid,
                nick,
                ident,
                host,
                realname,
                connect_ts,
                nick_ts,
            } => self.remote_connect_user(
                id,
                User {
                    server: uuid.server_id(),
                    uuid,
                    nick,
                    ident,
                    host,
                    realname,
                    connect_ts,
                    nick_ts,
                    modes: Default::default(),
                    metadata: Default::default(),
                    channels: BTreeSet::new(),
                },
            ),
            LinkMessage::RemoveUser { uuid, reason } => {
                if !self.users.contains_key(&uuid) {
                    return Err(LinkError::NoSuchUser(uuid.to_string()));
                }
                self.remove_user(&uuid, &reason, Propagate::Except(id));
                Ok(())
            }
            LinkMessage::SetMode {
                source,
                target,
                target_ts,
                modes,
                params,
            } => self.remote_set_mode(id, remote, source, target, target_ts, &modes, &params),
            LinkMessage::SetMetadata {
                target,
                target_ts,
                namespace,
                key,
                value,
            } => self.remote_set_metadata(id, target, target_ts, &namespace, &key, value),
            LinkMessage::JoinChannel {
                channel,
                channel_ts,
                user,
            } => self.remote_join(id, &channel, channel_ts, &user),
            LinkMessage::LeaveChannel {
                channel,
                user,
                reason,
            } => {
                if !self.users.contains_key(&user) {
                    return Err(LinkError::NoSuchUser(user.to_string()));
                }
                if !self.part_channel(&user, &channel, reason.as_deref(), Propagate::Except(id)) {
                    return Err(LinkError::NoSuchChannel(channel));
                }
                Ok(())
            }
            LinkMessage::SetTopic {
                channel,
                channel_ts,
                topic,
                setter,
                topic_ts,
            } => self.remote_set_topic(id, &channel, channel_ts, &topic, &setter, topic_ts),
            LinkMessage::EndBurst => {
                self.end_burst(id, remote);
                Ok(())
            }
            LinkMessage::Extension { source, record } => {
                self.remote_extension(id, remote, &source, &record);
                Ok(())
            }
            LinkMessage::Introduce { .. } => Err(LinkError::HandshakeAlreadyComplete),
            LinkMessage::ErrorReply { .. } => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn remote_add_server(
        &mut self,
        id: LinkId,
        remote: &ServerId,
        sid: ServerId,
        name: String,
        description: String,
        hop_count: u32,
        near_hop: ServerId,
    ) -> Result<(), LinkError> {
        if sid == self.server.id
            || self.sync.topology.contains(&sid)
            || self.sync.topology.find_by_name(&name).is_some()
        {
            return Err(LinkError::ServerAlreadyConnected(name));
        }
        let near_known = self
            .sync
            .topology
            .get(&near_hop)
            .is_some_and(|n| n.link == id);
        if !near_known {
            return Err(LinkError::UnknownNearHop(near_hop.to_string()));
        }
        let parsed = ServerName::parse(&name).map_err(|_| LinkError::NoSuchServer(name.clone()))?;
        let synced = self
            .sync
            .link(id)
            .is_some_and(|l| l.state == HandshakeState::Synced);
        self.sync.topology.add_server(ServerNode {
            id: sid.clone(),
            name: parsed,
            description: description.clone(),
            hop_count,
            next_closest: near_hop.clone(),
            link: id,
            bursted: synced,
        });
        info!(sid = %sid, name = %name, via = %remote, hops = hop_count, "Server introduced");
        self.broadcast(
            Propagate::Except(id),
            LinkMessage::AddServer {
                sid,
                name,
                description,
                hop_count: hop_count + 1,
                near_hop,
            },
        );
        Ok(())
    }

    fn remote_connect_user(&mut self, id: LinkId, mut user: User) -> Result<(), LinkError> {
        if self.users.contains_key(&user.uuid) {
            return Err(LinkError::UserAlreadyConnected(user.uuid.to_string()));
        }
        if !self.sync.topology.contains(&user.server) {
            return Err(LinkError::NoSuchServer(user.server.to_string()));
        }

        if let Some(existing) = self.nicks.get(&irc_to_lower(&user.nick)).cloned() {
            let local_origin = self.sync.link(id).is_some_and(|l| l.local_origin);
            let existing_ts = self.users.get(&existing).map_or(i64::MAX, |u| u.nick_ts);
            if remote_wins(user.nick_ts, existing_ts, local_origin) {
                info!(nick = %user.nick, loser = %existing, "Nick collision lost locally");
                if self.is_local(&existing) {
                    let nick = user.nick.clone();
                    self.send_numeric(&existing, ERR_NICKCOLLISION, &[&nick, "Nickname collision"]);
                }
                let renamed = existing.to_string();
                self.rename_user(&existing, &renamed, user.nick_ts);
            } else {
                info!(nick = %user.nick, loser = %user.uuid, "Nick collision won locally");
                user.nick = user.uuid.to_string();
            }
        }

        let announce = LinkMessage::ConnectUser {
            uuid: user.uuid.clone(),
            nick: user.nick.clone(),
            ident: user.ident.clone(),
            host: user.host.clone(),
            realname: user.realname.clone(),
            connect_ts: user.connect_ts,
            nick_ts: user.nick_ts,
        };
        let uuid = user.uuid.clone();
        self.insert_user(user);
        self.broadcast(Propagate::Except(id), announce);
        self.run_action_standard("remoteconnect", &[Arg::User(uuid.clone())], &Targets::user(uuid));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn remote_set_mode(
        &mut self,
        id: LinkId,
        remote: &ServerId,
        source: SourceRef,
        target: SyncTarget,
        target_ts: i64,
        modes: &str,
        params: &[String],
    ) -> Result<(), LinkError> {
        match target {
            SyncTarget::Channel(name) => {
                let key = irc_to_lower(&name);
                self.adopt_older_channel(&key, target_ts);
                let Some(channel) = self.channels.get(&key) else {
                    return Err(LinkError::NoSuchChannel(name));
                };
                if target_ts > channel.created || self.lost_to_us(id, &key) {
                    debug!(channel = %name, "discarding modes for newer channel copy");
                    return Ok(());
                }
                self.set_channel_modes(&key, &source, Some(remote), modes, params)?;
            }
            SyncTarget::User(uuid) => {
                let Some(user) = self.users.get(&uuid) else {
                    return Err(LinkError::NoSuchUser(uuid.to_string()));
                };
                if target_ts > user.connect_ts {
                    return Ok(());
                }
                self.set_user_modes(&uuid, &source, Some(remote), modes, params)?;
            }
        }
        Ok(())
    }

    fn remote_set_metadata(
        &mut self,
        id: LinkId,
        target: SyncTarget,
        target_ts: i64,
        namespace: &str,
        key: &str,
        value: Option<String>,
    ) -> Result<(), LinkError> {
        match target {
            SyncTarget::Channel(name) => {
                let ckey = irc_to_lower(&name);
                self.adopt_older_channel(&ckey, target_ts);
                let Some(channel) = self.channels.get(&ckey) else {
                    return Err(LinkError::NoSuchChannel(name));
                };
                if target_ts > channel.created || self.lost_to_us(id, &ckey) {
                    return Ok(());
                }
                self.set_channel_metadata(&ckey, namespace, key, value, Propagate::Except(id));
            }
            SyncTarget::User(uuid) => {
                let Some(user) = self.users.get(&uuid) else {
                    return Err(LinkError::NoSuchUser(uuid.to_string()));
                };
                if target_ts > user.connect_ts {
                    return Ok(());
                }
                self.set_user_metadata(&uuid, namespace, key, value, Propagate::Except(id));
            }
        }
        Ok(())
    }

    /// Reset a channel when the sender's copy is older. The older creation
    /// time wins on every server, not only where the two copies met.
    /// Returns whether the channel exists.
    fn adopt_older_channel(&mut self, key: &str, remote_ts: i64) -> bool {
        let Some(channel) = self.channels.get_mut(key) else {
            return false;
        };
        if remote_ts < channel.created {
            info!(channel = %channel.name.as_str(), local_ts = channel.created, remote_ts, "Older channel relayed, resetting");
            channel.reset(remote_ts);
        }
        true
    }

    /// The peer's copy of this channel lost its creation-time conflict.
    fn lost_to_us(&self, id: LinkId, key: &str) -> bool {
        self.sync.link(id).is_some_and(|l| l.burst_lost.contains(key))
    }

    fn remote_join(&mut self, id: LinkId, name: &str, channel_ts: i64, uuid: &UserUuid) -> Result<(), LinkError> {
        if !self.users.contains_key(uuid) {
            return Err(LinkError::NoSuchUser(uuid.to_string()));
        }
        let channel_name =
            ChannelName::parse(name).map_err(|_| LinkError::NoSuchChannel(name.to_string()))?;
        let key = channel_name.key().to_string();
        let Some(link) = self.sync.link_mut(id) else {
            return Ok(());
        };
        let bursting = link.state == HandshakeState::Bursting;
        let undecided = !link.burst_created.contains(&key) && !link.burst_lost.contains(&key);
        let local_origin = link.local_origin;

        match self.channels.get_mut(&key) {
            None => {
                self.channels
                    .insert(key.clone(), Channel::new(channel_name, channel_ts));
                if bursting {
                    link.burst_created.insert(key.clone());
                }
            }
            Some(channel) if bursting && undecided => {
                if remote_wins(channel_ts, channel.created, local_origin) {
                    info!(channel = %name, local_ts = channel.created, remote_ts = channel_ts, "Channel conflict lost, resetting");
                    channel.reset(channel_ts);
                    link.burst_created.insert(key.clone());
                } else {
                    debug!(channel = %name, "Channel conflict won");
                    link.burst_lost.insert(key.clone());
                }
            }
            Some(channel) if channel_ts < channel.created => {
                info!(channel = %name, local_ts = channel.created, remote_ts = channel_ts, "Older channel relayed, resetting");
                channel.reset(channel_ts);
            }
            Some(_) => {}
        }

        let already = self.channels.get(&key).is_some_and(|c| c.is_member(uuid));
        if !already {
            self.add_member(&key, uuid);
        }
        let Some(channel) = self.channels.get(&key) else {
            return Ok(());
        };
        let announce = LinkMessage::JoinChannel {
            channel: channel.name.as_str().to_string(),
            channel_ts: channel.created,
            user: uuid.clone(),
        };
        self.broadcast(Propagate::Except(id), announce);
        Ok(())
    }

    fn remote_set_topic(
        &mut self,
        id: LinkId,
        name: &str,
        channel_ts: i64,
        text: &str,
        setter: &str,
        topic_ts: i64,
    ) -> Result<(), LinkError> {
        let key = irc_to_lower(name);
        self.adopt_older_channel(&key, channel_ts);
        let Some(channel) = self.channels.get(&key) else {
            return Err(LinkError::NoSuchChannel(name.to_string()));
        };
        if channel_ts > channel.created || self.lost_to_us(id, &key) {
            return Ok(());
        }
        let just_created = self
            .sync
            .link(id)
            .is_some_and(|l| l.burst_created.contains(&key));
        let newer = channel.topic.as_ref().is_none_or(|t| topic_ts > t.set_at);
        if newer || just_created {
            self.set_topic(&key, text, setter, topic_ts, Propagate::Except(id));
        }
        Ok(())
    }

    fn end_burst(&mut self, id: LinkId, remote: &ServerId) {
        if let Some(link) = self.sync.link_mut(id) {
            link.state = HandshakeState::Synced;
            link.burst_created.clear();
            link.burst_lost.clear();
        }
        for sid in self.sync.topology.get_downstream_sids(remote) {
            if let Some(node) = self.sync.topology.get_mut(&sid) {
                node.bursted = true;
            }
        }
        info!(link = %id, sid = %remote, "Burst complete");
        self.run_action_standard(
            "burstcomplete",
            &[Arg::Server(remote.clone())],
            &Targets::none(),
        );
    }

    fn remote_extension(&mut self, id: LinkId, remote: &ServerId, source: &SourceRef, record: &CommandRecord) {
        if self.handle_server_command(remote, source, record) {
            self.broadcast(
                Propagate::Except(id),
                LinkMessage::Extension {
                    source: source.clone(),
                    record: record.clone(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::remote_wins;

    #[test]
    fn earlier_creation_wins() {
        assert!(remote_wins(100, 200, true));
        assert!(!remote_wins(200, 100, false));
    }

    #[test]
    fn ties_go_to_the_initiator() {
        assert!(!remote_wins(100, 100, true));
        assert!(remote_wins(100, 100, false));
    }
}
