//! The Matrix - the server context.
//!
//! Holds every table the daemon works on: loaded modules, users, channels,
//! the mesh topology and link states. It is owned by the event loop and
//! passed explicitly to every dispatch call and module handler; there are
//! no globals and no locks.

use super::channel::{Channel, Topic};
use super::reply::{ClientReply, ERR_ERRONEUSNICKNAME, ERR_NOSUCHCHANNEL, ERR_NOTONCHANNEL, RPL_ISUPPORT};
use super::storage::Storage;
use super::uid::UidGenerator;
use super::user::User;
use crate::config::{Config, LimitsConfig, LinkBlock};
use crate::error::{StartupError, UserError};
use crate::modules::builtin;
use crate::modules::{Arg, Registry, Targets};
use crate::sync::{Propagate, SyncManager};
use futures_util::future::LocalBoxFuture;
use meshirc_proto::{
    ChannelName, LinkMessage, ServerId, ServerName, SourceRef, SyncTarget, UserUuid, irc_to_lower,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Current unix time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// This server's identity.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub id: ServerId,
    pub name: ServerName,
    pub description: String,
}

pub struct Matrix {
    pub server: ServerInfo,
    pub limits: LimitsConfig,
    pub links: Vec<LinkBlock>,
    pub registry: Registry,
    pub users: HashMap<UserUuid, User>,
    /// Folded nick to uuid.
    pub nicks: HashMap<String, UserUuid>,
    /// Folded channel name to channel.
    pub channels: BTreeMap<String, Channel>,
    pub sync: SyncManager,
    pub storage: Box<dyn Storage>,
    pub(crate) unloading: BTreeSet<String>,
    pub(crate) pending_teardowns: Vec<LocalBoxFuture<'static, String>>,
    senders: HashMap<UserUuid, UnboundedSender<ClientReply>>,
    uid_gen: UidGenerator,
}

fn valid_nick(nick: &str) -> bool {
    const SPECIAL: &str = "[]\\`_^{|}";
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    nick.len() <= 30
        && (first.is_ascii_alphabetic() || SPECIAL.contains(first))
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || SPECIAL.contains(c))
}

impl Matrix {
    /// Build the context from validated configuration.
    pub fn new(config: &Config, storage: Box<dyn Storage>) -> Result<Self, StartupError> {
        let id = ServerId::parse(&config.server.sid)?;
        let name = ServerName::parse(&config.server.name)?;
        let mut matrix = Self {
            server: ServerInfo {
                id: id.clone(),
                name,
                description: config.server.description.clone(),
            },
            limits: config.limits.clone(),
            links: config.links.clone(),
            registry: Registry::new(),
            users: HashMap::new(),
            nicks: HashMap::new(),
            channels: BTreeMap::new(),
            sync: SyncManager::new(id.clone()),
            storage,
            unloading: BTreeSet::new(),
            pending_teardowns: Vec::new(),
            senders: HashMap::new(),
            uid_gen: UidGenerator::new(id),
        };

        for module in builtin::core_modules() {
            matrix.load_module(module)?;
        }
        for name in &config.modules.load {
            match builtin::by_name(name) {
                Some(module) => {
                    if let Err(e) = matrix.load_module(module) {
                        warn!(module = %name, error = %e, "Configured module not loaded");
                    }
                }
                None => warn!(module = %name, "Unknown module in configuration"),
            }
        }
        Ok(matrix)
    }

    /// Replace the uuid allocator, e.g. to resume a counter.
    pub fn set_uid_generator(&mut self, generator: UidGenerator) {
        self.uid_gen = generator;
    }

    /// Take queued module teardowns for the event loop to drive.
    pub fn take_teardowns(&mut self) -> Vec<LocalBoxFuture<'static, String>> {
        std::mem::take(&mut self.pending_teardowns)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn is_local(&self, uuid: &UserUuid) -> bool {
        self.users
            .get(uuid)
            .is_some_and(|u| u.server == self.server.id)
    }

    pub fn nick_of(&self, uuid: &UserUuid) -> String {
        self.users
            .get(uuid)
            .map(|u| u.nick.clone())
            .unwrap_or_else(|| "*".to_string())
    }

    /// Resolve a uuid or nick to a known user.
    pub fn find_user(&self, name: &str) -> Option<UserUuid> {
        if let Ok(uuid) = UserUuid::parse(name)
            && self.users.contains_key(&uuid)
        {
            return Some(uuid);
        }
        self.nicks.get(&irc_to_lower(name)).cloned()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    /// Members of a channel connected to this server.
    pub fn local_members(&self, key: &str) -> Vec<UserUuid> {
        self.channels
            .get(key)
            .map(|c| {
                c.members
                    .keys()
                    .filter(|u| self.is_local(u))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Delivery to local users
    // ------------------------------------------------------------------

    pub fn send_to_user(&self, uuid: &UserUuid, reply: ClientReply) {
        if let Some(tx) = self.senders.get(uuid)
            && tx.send(reply).is_err()
        {
            debug!(uuid = %uuid, "reply channel closed");
        }
    }

    /// Send a numeric to a local user, prefixed with their nick.
    pub fn send_numeric(&self, uuid: &UserUuid, code: u16, params: &[&str]) {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(self.nick_of(uuid));
        full.extend(params.iter().map(|p| p.to_string()));
        self.send_to_user(uuid, ClientReply::numeric(code, full));
    }

    /// Send to every local member of a channel.
    pub fn send_to_channel(&self, key: &str, reply: &ClientReply, except: Option<&UserUuid>) {
        for member in self.local_members(key) {
            if Some(&member) != except {
                self.send_to_user(&member, reply.clone());
            }
        }
    }

    // ------------------------------------------------------------------
    // User lifecycle
    // ------------------------------------------------------------------

    /// Register a locally connected user and announce it to the mesh.
    pub fn connect_local_user(
        &mut self,
        nick: &str,
        ident: &str,
        host: &str,
        realname: &str,
        sender: UnboundedSender<ClientReply>,
    ) -> Result<UserUuid, UserError> {
        if !valid_nick(nick) {
            let _ = sender.send(ClientReply::numeric(
                ERR_ERRONEUSNICKNAME,
                vec!["*".into(), nick.into(), "Erroneous nickname".into()],
            ));
            return Err(UserError::ErroneousNickname(nick.to_string()));
        }
        let folded = irc_to_lower(nick);
        if self.nicks.contains_key(&folded) {
            return Err(UserError::NicknameInUse(nick.to_string()));
        }
        let users = &self.users;
        let uuid = self
            .uid_gen
            .next(|u| users.contains_key(u))
            .ok_or(UserError::UuidSpaceExhausted)?;

        let ts = now();
        let user = User {
            uuid: uuid.clone(),
            nick: nick.to_string(),
            ident: ident.to_string(),
            host: host.to_string(),
            realname: realname.to_string(),
            server: self.server.id.clone(),
            connect_ts: ts,
            nick_ts: ts,
            modes: Default::default(),
            metadata: Default::default(),
            channels: BTreeSet::new(),
        };
        self.insert_user(user);
        self.senders.insert(uuid.clone(), sender);
        self.update_user_stats();

        let mut isupport = self.registry.isupport(self.limits.max_mode_changes);
        isupport.push("are supported by this server".to_string());
        let isupport: Vec<&str> = isupport.iter().map(String::as_str).collect();
        self.send_numeric(&uuid, RPL_ISUPPORT, &isupport);

        info!(uuid = %uuid, nick = %nick, "User connected");
        self.broadcast(
            Propagate::All,
            LinkMessage::ConnectUser {
                uuid: uuid.clone(),
                nick: nick.to_string(),
                ident: ident.to_string(),
                host: host.to_string(),
                realname: realname.to_string(),
                connect_ts: ts,
                nick_ts: ts,
            },
        );
        self.run_action_standard("connect", &[Arg::User(uuid.clone())], &Targets::user(uuid.clone()));
        Ok(uuid)
    }

    pub(crate) fn insert_user(&mut self, user: User) {
        self.nicks.insert(irc_to_lower(&user.nick), user.uuid.clone());
        self.users.insert(user.uuid.clone(), user);
    }

    /// Track high-water user counts in storage.
    fn update_user_stats(&mut self) {
        let local = self
            .users
            .values()
            .filter(|u| u.server == self.server.id)
            .count() as i64;
        let global = self.users.len() as i64;
        for (key, count) in [("stats:max-local", local), ("stats:max-global", global)] {
            if self.storage.get_i64(key).unwrap_or(0) < count {
                self.storage.set(key, Some(Value::from(count)));
            }
        }
    }

    /// Disconnect a user anywhere in the mesh and announce it.
    pub fn disconnect_user(&mut self, uuid: &UserUuid, reason: &str) -> bool {
        self.remove_user(uuid, reason, Propagate::All)
    }

    pub(crate) fn remove_user(&mut self, uuid: &UserUuid, reason: &str, propagate: Propagate) -> bool {
        let Some(user) = self.users.get(uuid) else {
            return false;
        };
        let hostmask = user.hostmask();
        let channels: Vec<String> = user.channels.iter().cloned().collect();

        self.run_action_standard(
            "quit",
            &[Arg::User(uuid.clone()), Arg::Text(reason.to_string())],
            &Targets::user(uuid.clone()),
        );

        let quit = ClientReply::event(hostmask, "QUIT", vec![reason.to_string()]);
        let mut notified = BTreeSet::new();
        for key in &channels {
            for member in self.local_members(key) {
                if member != *uuid && notified.insert(member.clone()) {
                    self.send_to_user(&member, quit.clone());
                }
            }
        }
        for key in &channels {
            self.remove_member(key, uuid);
        }

        if let Some(user) = self.users.remove(uuid) {
            let folded = irc_to_lower(&user.nick);
            if self.nicks.get(&folded) == Some(uuid) {
                self.nicks.remove(&folded);
            }
        }
        self.senders.remove(uuid);
        debug!(uuid = %uuid, reason = %reason, "User removed");

        self.broadcast(
            propagate,
            LinkMessage::RemoveUser {
                uuid: uuid.clone(),
                reason: reason.to_string(),
            },
        );
        true
    }

    /// Rename a user locally. Used when a nick collision is lost.
    pub(crate) fn rename_user(&mut self, uuid: &UserUuid, new_nick: &str, nick_ts: i64) {
        let Some(user) = self.users.get_mut(uuid) else {
            return;
        };
        let old_mask = user.hostmask();
        let old_folded = irc_to_lower(&user.nick);
        user.nick = new_nick.to_string();
        user.nick_ts = nick_ts;
        let channels: Vec<String> = user.channels.iter().cloned().collect();
        if self.nicks.get(&old_folded) == Some(uuid) {
            self.nicks.remove(&old_folded);
        }
        self.nicks.insert(irc_to_lower(new_nick), uuid.clone());

        let reply = ClientReply::event(old_mask, "NICK", vec![new_nick.to_string()]);
        self.send_to_user(uuid, reply.clone());
        for key in &channels {
            self.send_to_channel(key, &reply, Some(uuid));
        }
    }

    // ------------------------------------------------------------------
    // Channel lifecycle
    // ------------------------------------------------------------------

    /// Join a local user to a channel, creating it if needed. The creator
    /// receives the highest-ranked status.
    pub fn join_channel(&mut self, uuid: &UserUuid, name: &str, key: Option<&str>) -> bool {
        let channel_name = match ChannelName::parse(name) {
            Ok(n) if n.as_str().starts_with(['#', '&']) => n,
            _ => {
                self.send_numeric(uuid, ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
                return false;
            }
        };
        let ckey = channel_name.key().to_string();
        let exists = self.channels.contains_key(&ckey);
        if exists && self.channels.get(&ckey).is_some_and(|c| c.is_member(uuid)) {
            return false;
        }

        let targets = if exists {
            Targets::channel(ckey.clone())
        } else {
            Targets::none()
        };
        let params = [
            Arg::User(uuid.clone()),
            Arg::Channel(ckey.clone()),
            Arg::OptText(key.map(str::to_string)),
        ];
        if self.run_action_voting("joinpermission", &params, &targets) < 0 {
            return false;
        }

        if !exists {
            self.channels
                .insert(ckey.clone(), Channel::new(channel_name, now()));
        }
        self.add_member(&ckey, uuid);

        let Some(channel) = self.channels.get(&ckey) else {
            return false;
        };
        let announce = LinkMessage::JoinChannel {
            channel: channel.name.as_str().to_string(),
            channel_ts: channel.created,
            user: uuid.clone(),
        };
        self.broadcast(Propagate::All, announce);

        if !exists && let Some(top) = self.registry.statuses().first().cloned() {
            let source = SourceRef::Server(self.server.id.clone());
            if let Err(e) = self.set_channel_modes(
                &ckey,
                &source,
                None,
                &format!("+{}", top.letter),
                &[uuid.to_string()],
            ) {
                debug!(error = %e, "failed to grant creator status");
            }
        }
        true
    }

    /// Add a member and announce the join locally.
    pub(crate) fn add_member(&mut self, key: &str, uuid: &UserUuid) {
        let Some(channel) = self.channels.get_mut(key) else {
            return;
        };
        channel.members.entry(uuid.clone()).or_default();
        let display = channel.name.as_str().to_string();
        let Some(user) = self.users.get_mut(uuid) else {
            return;
        };
        user.channels.insert(key.to_string());
        let hostmask = user.hostmask();

        self.run_action_standard(
            "join",
            &[Arg::User(uuid.clone()), Arg::Channel(key.to_string())],
            &Targets::channel(key),
        );
        self.send_to_channel(key, &ClientReply::event(hostmask, "JOIN", vec![display]), None);
    }

    /// Part a user from a channel and announce it.
    pub fn part_channel(&mut self, uuid: &UserUuid, name: &str, reason: Option<&str>, propagate: Propagate) -> bool {
        let key = irc_to_lower(name);
        let Some(channel) = self.channels.get(&key) else {
            if self.is_local(uuid) {
                self.send_numeric(uuid, ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
            }
            return false;
        };
        if !channel.is_member(uuid) {
            if self.is_local(uuid) {
                self.send_numeric(uuid, ERR_NOTONCHANNEL, &[name, "You're not on that channel"]);
            }
            return false;
        }
        let display = channel.name.as_str().to_string();
        let hostmask = self.users.get(uuid).map(User::hostmask).unwrap_or_default();
        let mut params = vec![display.clone()];
        params.extend(reason.map(str::to_string));
        self.send_to_channel(&key, &ClientReply::event(hostmask, "PART", params), None);
        self.remove_member(&key, uuid);
        self.broadcast(
            propagate,
            LinkMessage::LeaveChannel {
                channel: display,
                user: uuid.clone(),
                reason: reason.map(str::to_string),
            },
        );
        true
    }

    /// Remove a member; destroys the channel when it empties.
    pub(crate) fn remove_member(&mut self, key: &str, uuid: &UserUuid) {
        self.run_action_standard(
            "leave",
            &[Arg::User(uuid.clone()), Arg::Channel(key.to_string())],
            &Targets::channel(key),
        );
        if let Some(user) = self.users.get_mut(uuid) {
            user.channels.remove(key);
        }
        let empty = match self.channels.get_mut(key) {
            Some(channel) => {
                channel.members.remove(uuid);
                channel.members.is_empty()
            }
            None => false,
        };
        if empty {
            self.run_action_standard(
                "channeldestroy",
                &[Arg::Channel(key.to_string())],
                &Targets::channel(key),
            );
            self.channels.remove(key);
            debug!(channel = %key, "Channel destroyed");
        }
    }

    /// Set a channel topic and announce it.
    pub fn set_topic(&mut self, key: &str, text: &str, setter: &str, set_at: i64, propagate: Propagate) -> bool {
        if !self.channels.contains_key(key) {
            return false;
        }
        self.run_action_standard(
            "topic",
            &[
                Arg::Channel(key.to_string()),
                Arg::Text(text.to_string()),
                Arg::Text(setter.to_string()),
            ],
            &Targets::channel(key),
        );
        let Some(channel) = self.channels.get_mut(key) else {
            return false;
        };
        channel.topic = Some(Topic {
            text: text.to_string(),
            set_by: setter.to_string(),
            set_at,
        });
        let display = channel.name.as_str().to_string();
        let channel_ts = channel.created;
        self.send_to_channel(
            key,
            &ClientReply::event(setter, "TOPIC", vec![display.clone(), text.to_string()]),
            None,
        );
        self.broadcast(
            propagate,
            LinkMessage::SetTopic {
                channel: display,
                channel_ts,
                topic: text.to_string(),
                setter: setter.to_string(),
                topic_ts: set_at,
            },
        );
        true
    }

    /// Set or delete channel metadata. Returns whether anything changed.
    pub fn set_channel_metadata(
        &mut self,
        key: &str,
        namespace: &str,
        meta_key: &str,
        value: Option<String>,
        propagate: Propagate,
    ) -> bool {
        let Some(channel) = self.channels.get_mut(key) else {
            return false;
        };
        if !channel.metadata.set(namespace, meta_key, value.clone()) {
            return false;
        }
        let target = SyncTarget::Channel(channel.name.as_str().to_string());
        let target_ts = channel.created;
        self.run_action_standard(
            "channelmetadataupdate",
            &[
                Arg::Channel(key.to_string()),
                Arg::Text(namespace.to_string()),
                Arg::Text(meta_key.to_string()),
                Arg::OptText(value.clone()),
            ],
            &Targets::channel(key),
        );
        self.broadcast(
            propagate,
            LinkMessage::SetMetadata {
                target,
                target_ts,
                namespace: namespace.to_string(),
                key: meta_key.to_string(),
                value,
            },
        );
        true
    }

    /// Set or delete user metadata. Returns whether anything changed.
    pub fn set_user_metadata(
        &mut self,
        uuid: &UserUuid,
        namespace: &str,
        meta_key: &str,
        value: Option<String>,
        propagate: Propagate,
    ) -> bool {
        let Some(user) = self.users.get_mut(uuid) else {
            return false;
        };
        if !user.metadata.set(namespace, meta_key, value.clone()) {
            return false;
        }
        let target_ts = user.connect_ts;
        self.run_action_standard(
            "usermetadataupdate",
            &[
                Arg::User(uuid.clone()),
                Arg::Text(namespace.to_string()),
                Arg::Text(meta_key.to_string()),
                Arg::OptText(value.clone()),
            ],
            &Targets::user(uuid.clone()),
        );
        self.broadcast(
            propagate,
            LinkMessage::SetMetadata {
                target: SyncTarget::User(uuid.clone()),
                target_ts,
                namespace: namespace.to_string(),
                key: meta_key.to_string(),
                value,
            },
        );
        true
    }

    /// Flush storage and partially unload every module.
    pub fn shutdown(&mut self) {
        info!("Shutting down");
        self.unload_all();
        if let Err(e) = self.storage.flush() {
            tracing::error!(error = %e, "Failed to flush storage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nick_validation() {
        assert!(valid_nick("alice"));
        assert!(valid_nick("[bot]-2"));
        assert!(!valid_nick(""));
        assert!(!valid_nick("1abc"));
        assert!(!valid_nick("a b"));
        assert!(!valid_nick(&"a".repeat(31)));
    }
}
