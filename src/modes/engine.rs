//! Applying mode strings.
//!
//! One left-to-right pass over the letters, consuming positional parameters
//! as the letter's type requires. Per-letter problems are soft: the letter
//! is skipped and scanning continues. Only an unresolvable acting identity
//! fails the whole call.

use super::ModeTarget;
use crate::error::ModeError;
use crate::metrics;
use crate::modules::{Arg, ModeEntry, Targets};
use crate::state::reply::{ClientReply, ERR_BANLISTFULL, ERR_UNKNOWNMODE};
use crate::state::{ListEntry, Matrix, ModeStore, User, now};
use meshirc_proto::{ModeChange, ModeType, ServerId, SourceRef, UserUuid};
use tracing::debug;

impl Matrix {
    /// Apply a mode string to a channel.
    ///
    /// `via` is the direct neighbor a remote change arrived from, so that
    /// propagation can skip it.
    pub fn set_channel_modes(
        &mut self,
        key: &str,
        source: &SourceRef,
        via: Option<&ServerId>,
        modes: &str,
        params: &[String],
    ) -> Result<Vec<ModeChange>, ModeError> {
        if !self.channels.contains_key(key) {
            return Err(ModeError::NoSuchChannel(key.to_string()));
        }
        self.apply_modes(ModeTarget::Channel(key.to_string()), source, via, modes, params)
    }

    /// Apply a mode string to a user.
    pub fn set_user_modes(
        &mut self,
        uuid: &UserUuid,
        source: &SourceRef,
        via: Option<&ServerId>,
        modes: &str,
        params: &[String],
    ) -> Result<Vec<ModeChange>, ModeError> {
        if !self.users.contains_key(uuid) {
            return Err(ModeError::NoSuchUser(uuid.to_string()));
        }
        self.apply_modes(ModeTarget::User(uuid.clone()), source, via, modes, params)
    }

    /// Display name of an acting identity.
    pub fn source_name(&self, source: &SourceRef) -> Option<String> {
        match source {
            SourceRef::User(uuid) => self.users.get(uuid).map(User::hostmask),
            SourceRef::Server(sid) if *sid == self.server.id => {
                Some(self.server.name.as_str().to_string())
            }
            SourceRef::Server(sid) => self.sync.server_name(sid).map(str::to_string),
        }
    }

    fn apply_modes(
        &mut self,
        target: ModeTarget,
        source: &SourceRef,
        via: Option<&ServerId>,
        modes: &str,
        params: &[String],
    ) -> Result<Vec<ModeChange>, ModeError> {
        let source_name = self
            .source_name(source)
            .ok_or_else(|| ModeError::UnresolvedSource(source.to_string()))?;
        let local_user = match source {
            SourceRef::User(uuid) if self.is_local(uuid) => Some(uuid.clone()),
            _ => None,
        };
        let scope = target.scope();
        let targets = match &target {
            ModeTarget::Channel(key) => Targets::channel(key.clone()),
            ModeTarget::User(uuid) => Targets::user(uuid.clone()),
        };
        let cap = self.limits.max_mode_changes;

        let mut adding = true;
        let mut params = params.iter();
        let mut changes: Vec<ModeChange> = Vec::new();

        'scan: for letter in modes.chars() {
            match letter {
                '+' => {
                    adding = true;
                    continue;
                }
                '-' => {
                    adding = false;
                    continue;
                }
                _ => {}
            }
            let Some(entry) = self.registry.mode(scope, letter).cloned() else {
                if let Some(uuid) = &local_user {
                    let letter = letter.to_string();
                    self.send_numeric(uuid, ERR_UNKNOWNMODE, &[&letter, "is unknown mode char to me"]);
                }
                continue;
            };

            let raw = if entry.mode_type.takes_param(adding) {
                match params.next() {
                    Some(p) => Some(p.clone()),
                    None => {
                        if entry.mode_type == ModeType::List
                            && let Some(uuid) = &local_user
                        {
                            self.send_mode_list(uuid, &target, letter);
                        }
                        continue;
                    }
                }
            } else {
                None
            };

            let concrete: Vec<Option<String>> = match raw {
                Some(raw) => {
                    let checked = if adding {
                        entry.handler.check_set(self, &target, &raw)
                    } else {
                        entry.handler.check_unset(self, &target, &raw)
                    };
                    match checked {
                        Some(list) => list.into_iter().map(Some).collect(),
                        None => continue,
                    }
                }
                None => vec![None],
            };

            for param in concrete {
                if let Some(uuid) = &local_user {
                    let action = format!("modepermission-{scope}-{letter}");
                    let vote = [
                        Arg::User(uuid.clone()),
                        target.to_arg(),
                        Arg::Flag(adding),
                        Arg::OptText(param.clone()),
                    ];
                    if self.run_action_voting(&action, &vote, &targets) < 0 {
                        continue;
                    }
                }

                let Some(recorded) =
                    self.apply_one(&target, &entry, adding, param, &source_name, local_user.as_ref())
                else {
                    continue;
                };

                metrics::record_mode_change(scope.as_str(), letter);
                let change = ModeChange::new(adding, letter, recorded);
                self.run_action_standard(
                    &format!("modechange-{scope}-{letter}"),
                    &[
                        target.to_arg(),
                        Arg::Text(source_name.clone()),
                        Arg::Flag(adding),
                        Arg::OptText(change.param.clone()),
                    ],
                    &targets,
                );
                changes.push(change);
                if changes.len() >= cap {
                    debug!(cap, "mode change cap reached");
                    break 'scan;
                }
            }
        }

        if changes.is_empty() {
            return Ok(changes);
        }

        let mut recipients = Arg::Users(match &target {
            ModeTarget::Channel(key) => self.local_members(key),
            ModeTarget::User(uuid) if self.is_local(uuid) => vec![uuid.clone()],
            ModeTarget::User(_) => Vec::new(),
        });
        self.run_action_processing(
            &format!("modemessage-{scope}"),
            &mut recipients,
            &[
                target.to_arg(),
                Arg::Text(source_name),
                Arg::Changes(changes.clone()),
            ],
            &targets,
        );
        self.run_action_standard(
            &format!("modechanges-{scope}"),
            &[
                target.to_arg(),
                Arg::Source(source.clone()),
                Arg::OptServer(via.cloned()),
                Arg::Changes(changes.clone()),
            ],
            &targets,
        );
        Ok(changes)
    }

    /// Apply one concrete change. Returns the parameter to record, or
    /// `None` when nothing changed.
    fn apply_one(
        &mut self,
        target: &ModeTarget,
        entry: &ModeEntry,
        adding: bool,
        param: Option<String>,
        source_name: &str,
        requester: Option<&UserUuid>,
    ) -> Option<Option<String>> {
        match entry.mode_type {
            ModeType::Status => {
                let ModeTarget::Channel(key) = target else {
                    return None;
                };
                let member = self.find_user(param.as_deref()?)?;
                self.apply_status(key, &member, entry.letter, adding)
                    .then(|| Some(self.nick_of(&member)))
            }
            ModeType::List => {
                let param = param?;
                let capacity = self.limits.list_capacity;
                if adding && param.chars().count() > self.limits.list_param_length {
                    return None;
                }
                let store = self.mode_store_mut(target)?;
                if !adding {
                    let list = store.lists.get_mut(&entry.letter)?;
                    let pos = list.iter().position(|e| e.param == param)?;
                    list.remove(pos);
                    if list.is_empty() {
                        store.lists.remove(&entry.letter);
                    }
                    return Some(Some(param));
                }
                let list = store.lists.entry(entry.letter).or_default();
                if list.iter().any(|e| e.param == param) {
                    return None;
                }
                if list.len() >= capacity {
                    if list.is_empty() {
                        store.lists.remove(&entry.letter);
                    }
                    if let Some(uuid) = requester {
                        let letter = entry.letter.to_string();
                        let display = self.target_display(target);
                        self.send_numeric(uuid, ERR_BANLISTFULL, &[&display, &param, &letter, "Channel list is full"]);
                    }
                    return None;
                }
                list.push(ListEntry {
                    param: param.clone(),
                    set_by: source_name.to_string(),
                    set_at: now(),
                });
                Some(Some(param))
            }
            ModeType::Param | ModeType::ParamOnUnset | ModeType::NoParam => {
                let store = self.mode_store_mut(target)?;
                if adding {
                    if store.values.get(&entry.letter) == Some(&param) {
                        return None;
                    }
                    store.values.insert(entry.letter, param.clone());
                    Some(param)
                } else {
                    store.values.remove(&entry.letter)?;
                    Some(param)
                }
            }
        }
    }

    /// Grant or revoke a status letter. Returns whether the member changed.
    fn apply_status(&mut self, key: &str, member: &UserUuid, letter: char, adding: bool) -> bool {
        let Some(rank) = self.registry.status_rank(letter) else {
            return false;
        };
        let Some(held) = self
            .channels
            .get_mut(key)
            .and_then(|c| c.members.get_mut(member))
        else {
            return false;
        };
        if !adding {
            let before = held.len();
            held.retain(|c| c != letter);
            return held.len() != before;
        }
        if held.contains(letter) {
            return false;
        }
        let registry = &self.registry;
        let pos = held
            .char_indices()
            .find(|(_, c)| registry.status_rank(*c).is_none_or(|r| r < rank))
            .map(|(i, _)| i)
            .unwrap_or(held.len());
        held.insert(pos, letter);
        true
    }

    fn mode_store_mut(&mut self, target: &ModeTarget) -> Option<&mut ModeStore> {
        match target {
            ModeTarget::Channel(key) => self.channels.get_mut(key).map(|c| &mut c.modes),
            ModeTarget::User(uuid) => self.users.get_mut(uuid).map(|u| &mut u.modes),
        }
    }

    /// Channel display name or user nick.
    pub fn target_display(&self, target: &ModeTarget) -> String {
        match target {
            ModeTarget::Channel(key) => self
                .channels
                .get(key)
                .map(|c| c.name.as_str().to_string())
                .unwrap_or_else(|| key.clone()),
            ModeTarget::User(uuid) => self.nick_of(uuid),
        }
    }

    fn send_mode_list(&self, uuid: &UserUuid, target: &ModeTarget, letter: char) {
        let entries = match target {
            ModeTarget::Channel(key) => self.channels.get(key).map(|c| c.modes.list(letter).to_vec()),
            ModeTarget::User(u) => self.users.get(u).map(|u| u.modes.list(letter).to_vec()),
        };
        self.send_to_user(
            uuid,
            ClientReply::ModeList {
                target: self.target_display(target),
                mode: letter,
                entries: entries.unwrap_or_default(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::modes::ModeTarget;
    use crate::modules::{ChannelModeSpec, ModeHandler, Module, SimpleMode};
    use crate::state::Matrix;
    use crate::state::reply::ClientReply;
    use crate::state::testing::{local_user, matrix};
    use meshirc_proto::{ModeChange, ModeType, SourceRef};
    use std::rc::Rc;

    struct HalfOp;

    impl Module for HalfOp {
        fn name(&self) -> &'static str {
            "HalfOp"
        }

        fn channel_modes(&self) -> Vec<ChannelModeSpec> {
            vec![ChannelModeSpec::status('h', 50, '%', Rc::new(SimpleMode))]
        }
    }

    fn server(m: &Matrix) -> SourceRef {
        SourceRef::Server(m.server.id.clone())
    }

    #[test]
    fn higher_status_lands_before_lower() {
        let mut m = matrix();
        m.load_module(Rc::new(HalfOp)).unwrap();
        let (alice, _rx) = local_user(&mut m, "alice");
        let (bob, _rx2) = local_user(&mut m, "bob");
        assert!(m.join_channel(&alice, "#rust", None));
        assert!(m.join_channel(&bob, "#rust", None));
        let src = server(&m);

        m.set_channel_modes("#rust", &src, None, "+v", &["bob".into()]).unwrap();
        m.set_channel_modes("#rust", &src, None, "+h", &["bob".into()]).unwrap();
        assert_eq!(m.channels["#rust"].status(&bob), Some("hv"));
        m.set_channel_modes("#rust", &src, None, "+o", &["bob".into()]).unwrap();
        assert_eq!(m.channels["#rust"].status(&bob), Some("ohv"));
        m.set_channel_modes("#rust", &src, None, "-h", &["bob".into()]).unwrap();
        assert_eq!(m.channels["#rust"].status(&bob), Some("ov"));
    }

    #[test]
    fn list_add_is_idempotent() {
        let mut m = matrix();
        let (alice, mut rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let src = SourceRef::User(alice.clone());
        let first = m
            .set_channel_modes("#rust", &src, None, "+b", &["*!*@foo".into()])
            .unwrap();
        assert_eq!(first, vec![ModeChange::new(true, 'b', Some("*!*@foo".into()))]);
        while rx.try_recv().is_ok() {}

        let second = m
            .set_channel_modes("#rust", &src, None, "+b", &["*!*@foo".into()])
            .unwrap();
        assert!(second.is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(m.channels["#rust"].modes.list('b').len(), 1);
    }

    #[test]
    fn change_cap_stops_scanning() {
        let mut m = matrix();
        let (alice, _rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let params: Vec<String> = (0..25).map(|i| format!("*!*@host{i}")).collect();
        let modes = format!("+{}", "b".repeat(25));
        let src = server(&m);
        let changes = m.set_channel_modes("#rust", &src, None, &modes, &params).unwrap();
        assert_eq!(changes.len(), 20);
        assert_eq!(m.channels["#rust"].modes.list('b').len(), 20);
        assert_eq!(changes[19].param.as_deref(), Some("*!*@host19"));
    }

    #[test]
    fn list_capacity_notifies_local_requester() {
        let mut m = matrix();
        m.limits.list_capacity = 1;
        let (alice, mut rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let src = SourceRef::User(alice.clone());
        m.set_channel_modes("#rust", &src, None, "+bb", &["a!*@*".into(), "b!*@*".into()])
            .unwrap();
        assert_eq!(m.channels["#rust"].modes.list('b').len(), 1);
        let codes: Vec<u16> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|r| r.code())
            .collect();
        assert!(codes.contains(&478));
    }

    #[test]
    fn param_length_cap_counts_chars_and_spares_removals() {
        let mut m = matrix();
        let (alice, _rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let src = server(&m);
        m.set_channel_modes("#rust", &src, None, "+b", &["*!*@long.example".into()])
            .unwrap();

        m.limits.list_param_length = 5;
        let removed = m
            .set_channel_modes("#rust", &src, None, "-b", &["*!*@long.example".into()])
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert!(m.channels["#rust"].modes.list('b').is_empty());

        // Five characters, six bytes.
        let added = m.set_channel_modes("#rust", &src, None, "+b", &["é!*@*".into()]).unwrap();
        assert_eq!(added.len(), 1);
        let rejected = m.set_channel_modes("#rust", &src, None, "+b", &["éé!*@*".into()]).unwrap();
        assert!(rejected.is_empty());
    }

    #[test]
    fn unknown_letter_is_soft() {
        let mut m = matrix();
        let (alice, mut rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        while rx.try_recv().is_ok() {}
        let src = SourceRef::User(alice.clone());
        let changes = m.set_channel_modes("#rust", &src, None, "+Zn", &[]).unwrap();
        assert_eq!(changes, vec![ModeChange::new(true, 'n', None)]);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.code(), Some(472));
    }

    #[test]
    fn param_mode_only_consumes_when_adding() {
        let mut m = matrix();
        let (alice, _rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let src = server(&m);
        m.set_channel_modes("#rust", &src, None, "+l", &["10".into()]).unwrap();
        assert_eq!(m.channels["#rust"].modes.value('l'), Some("10"));
        let changes = m
            .set_channel_modes("#rust", &src, None, "-l+k", &["secret".into()])
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(m.channels["#rust"].modes.value('k'), Some("secret"));
        assert!(!m.channels["#rust"].modes.has('l'));
    }

    #[test]
    fn list_query_without_param_returns_contents() {
        let mut m = matrix();
        let (alice, mut rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let src = SourceRef::User(alice.clone());
        m.set_channel_modes("#rust", &src, None, "+b", &["*!*@x".into()]).unwrap();
        while rx.try_recv().is_ok() {}
        let changes = m.set_channel_modes("#rust", &src, None, "+b", &[]).unwrap();
        assert!(changes.is_empty());
        match rx.try_recv().unwrap() {
            ClientReply::ModeList { mode, entries, .. } => {
                assert_eq!(mode, 'b');
                assert_eq!(entries[0].param, "*!*@x");
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn unresolved_source_fails_call() {
        let mut m = matrix();
        let (alice, _rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let ghost = SourceRef::Server(meshirc_proto::ServerId::parse("9ZZ").unwrap());
        assert!(m.set_channel_modes("#rust", &ghost, None, "+n", &[]).is_err());
        assert!(!m.channels["#rust"].modes.has('n'));
    }

    #[test]
    fn non_op_is_denied() {
        let mut m = matrix();
        let (alice, _rx) = local_user(&mut m, "alice");
        let (bob, mut rx) = local_user(&mut m, "bob");
        m.join_channel(&alice, "#rust", None);
        m.join_channel(&bob, "#rust", None);
        while rx.try_recv().is_ok() {}
        let src = SourceRef::User(bob.clone());
        let changes = m.set_channel_modes("#rust", &src, None, "+m", &[]).unwrap();
        assert!(changes.is_empty());
        assert_eq!(rx.try_recv().unwrap().code(), Some(482));
    }

    struct Reject;

    impl ModeHandler for Reject {
        fn check_set(&self, _: &mut Matrix, _: &ModeTarget, _: &str) -> Option<Vec<String>> {
            None
        }
    }

    struct Rejecting;

    impl Module for Rejecting {
        fn name(&self) -> &'static str {
            "Rejecting"
        }

        fn channel_modes(&self) -> Vec<ChannelModeSpec> {
            vec![ChannelModeSpec::new('X', ModeType::Param, Rc::new(Reject))]
        }
    }

    #[test]
    fn rejected_param_skips_letter_only() {
        let mut m = matrix();
        m.load_module(Rc::new(Rejecting)).unwrap();
        let (alice, _rx) = local_user(&mut m, "alice");
        m.join_channel(&alice, "#rust", None);
        let src = server(&m);
        let changes = m
            .set_channel_modes("#rust", &src, None, "+Xs", &["nope".into()])
            .unwrap();
        assert_eq!(changes, vec![ModeChange::new(true, 's', None)]);
    }
}
