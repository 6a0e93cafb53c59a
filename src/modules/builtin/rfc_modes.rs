//! Standard RFC channel and user modes.
//!
//! Statuses `o`/`v`, the ban list `b`, key `k`, limit `l` and the plain
//! flags `n t m s i`; user modes `i` and `w`. Changes from local users
//! need operator rank (or whatever `checkchannellevel` decides), and user
//! modes can only be changed on oneself.

use super::check_channel_level;
use crate::modes::ModeTarget;
use crate::modules::{
    ActionArgs, ActionSpec, Arg, ChannelModeSpec, ModeHandler, Module, SimpleMode, UserModeSpec,
    action_fn,
};
use crate::state::Matrix;
use crate::state::reply::{
    ERR_BADCHANNELKEY, ERR_BANNEDFROMCHAN, ERR_CHANNELISFULL, ERR_CHANOPRIVSNEEDED,
    ERR_USERSDONTMATCH,
};
use meshirc_proto::{ModeType, wildcard_match};
use std::rc::Rc;

const PLAIN_CHANNEL_MODES: [char; 4] = ['n', 'm', 's', 'i'];
const USER_MODES: [char; 2] = ['i', 'w'];
const KEY_MAX: usize = 23;

pub struct RfcChannelModes;

impl Module for RfcChannelModes {
    fn name(&self) -> &'static str {
        "RfcChannelModes"
    }

    fn core(&self) -> bool {
        true
    }

    fn channel_modes(&self) -> Vec<ChannelModeSpec> {
        let mut modes = vec![
            ChannelModeSpec::status('o', 100, '@', Rc::new(StatusMode)),
            ChannelModeSpec::status('v', 10, '+', Rc::new(StatusMode)),
            ChannelModeSpec::new('b', ModeType::List, Rc::new(BanMode)),
            ChannelModeSpec::new('k', ModeType::ParamOnUnset, Rc::new(KeyMode)),
            ChannelModeSpec::new('l', ModeType::Param, Rc::new(LimitMode)),
            ChannelModeSpec::new('t', ModeType::NoParam, Rc::new(TopicLockMode)),
        ];
        modes.extend(
            PLAIN_CHANNEL_MODES
                .iter()
                .map(|&letter| ChannelModeSpec::new(letter, ModeType::NoParam, Rc::new(SimpleMode))),
        );
        modes
    }

    fn user_modes(&self) -> Vec<UserModeSpec> {
        USER_MODES
            .iter()
            .map(|&letter| UserModeSpec {
                letter,
                mode_type: ModeType::NoParam,
                handler: Rc::new(SimpleMode),
            })
            .collect()
    }

    fn actions(&self) -> Vec<ActionSpec> {
        let channel_letters = ['o', 'v', 'b', 'k', 'l', 't'].into_iter().chain(PLAIN_CHANNEL_MODES);
        let mut actions: Vec<ActionSpec> = channel_letters
            .map(|letter| {
                ActionSpec::new(
                    format!("modepermission-channel-{letter}"),
                    0,
                    action_fn(move |m, args| channel_mode_permission(m, args, letter)),
                )
            })
            .collect();
        actions.extend(USER_MODES.iter().map(|letter| {
            ActionSpec::new(
                format!("modepermission-user-{letter}"),
                0,
                action_fn(user_mode_permission),
            )
        }));
        actions
    }
}

/// Local users need channel level `mode-<letter>`.
pub(super) fn channel_mode_permission(matrix: &mut Matrix, args: &mut ActionArgs<'_>, letter: char) -> Option<bool> {
    let uuid = args.user(0)?.clone();
    let key = args.channel(1)?.to_string();
    if check_channel_level(matrix, &format!("mode-{letter}"), &key, &uuid) {
        return None;
    }
    let display = matrix.target_display(&ModeTarget::Channel(key));
    matrix.send_numeric(&uuid, ERR_CHANOPRIVSNEEDED, &[&display, "You're not channel operator"]);
    Some(false)
}

fn user_mode_permission(matrix: &mut Matrix, args: &mut ActionArgs<'_>) -> Option<bool> {
    let source = args.user(0)?;
    match args.params.get(1) {
        Some(Arg::User(target)) if target == source => None,
        _ => {
            let source = source.clone();
            matrix.send_numeric(&source, ERR_USERSDONTMATCH, &["Cannot change mode for other users"]);
            Some(false)
        }
    }
}

/// Split a comma-separated parameter into its non-empty parts.
fn fan_out(param: &str) -> Vec<String> {
    param
        .split(',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Complete a partial mask to `nick!user@host` form.
pub fn normalize_mask(mask: &str) -> String {
    let (nick_user, host) = match mask.split_once('@') {
        Some((left, host)) => (left, if host.is_empty() { "*" } else { host }),
        None if mask.contains('.') && !mask.contains('!') => ("*", mask),
        None => (mask, "*"),
    };
    let (nick, user) = match nick_user.split_once('!') {
        Some((nick, user)) => (nick, user),
        None if mask.contains('@') => ("*", nick_user),
        None => (nick_user, "*"),
    };
    let nick = if nick.is_empty() { "*" } else { nick };
    let user = if user.is_empty() { "*" } else { user };
    format!("{nick}!{user}@{host}")
}

struct StatusMode;

impl ModeHandler for StatusMode {
    fn check_set(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        Some(fan_out(param))
    }

    fn check_unset(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        Some(fan_out(param))
    }
}

struct BanMode;

impl BanMode {
    fn masks(param: &str) -> Vec<String> {
        fan_out(param).iter().map(|m| normalize_mask(m)).collect()
    }
}

impl ModeHandler for BanMode {
    fn affected_actions(&self) -> Vec<(&'static str, i32)> {
        vec![("joinpermission", 10)]
    }

    fn check_set(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        Some(Self::masks(param))
    }

    fn check_unset(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        Some(Self::masks(param))
    }

    fn apply(&self, matrix: &mut Matrix, target: &ModeTarget, args: &mut ActionArgs<'_>) -> Option<bool> {
        let ModeTarget::Channel(key) = target else {
            return None;
        };
        let uuid = args.user(0)?.clone();
        let hostmask = matrix.users.get(&uuid)?.hostmask();
        let banned = matrix
            .channels
            .get(key)?
            .modes
            .list('b')
            .iter()
            .any(|entry| wildcard_match(&entry.param, &hostmask));
        if !banned {
            return None;
        }
        let display = matrix.target_display(target);
        matrix.send_numeric(&uuid, ERR_BANNEDFROMCHAN, &[&display, "Cannot join channel (+b)"]);
        Some(false)
    }
}

struct KeyMode;

impl ModeHandler for KeyMode {
    fn affected_actions(&self) -> Vec<(&'static str, i32)> {
        vec![("joinpermission", 10)]
    }

    fn check_set(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        if param.is_empty() || param.contains([' ', ',']) {
            return None;
        }
        Some(vec![param.chars().take(KEY_MAX).collect()])
    }

    fn apply(&self, matrix: &mut Matrix, target: &ModeTarget, args: &mut ActionArgs<'_>) -> Option<bool> {
        let ModeTarget::Channel(key) = target else {
            return None;
        };
        let uuid = args.user(0)?.clone();
        let expected = matrix.channels.get(key)?.modes.value('k')?.to_string();
        if args.text(2) == Some(expected.as_str()) {
            return None;
        }
        let display = matrix.target_display(target);
        matrix.send_numeric(&uuid, ERR_BADCHANNELKEY, &[&display, "Cannot join channel (+k)"]);
        Some(false)
    }
}

struct LimitMode;

impl ModeHandler for LimitMode {
    fn affected_actions(&self) -> Vec<(&'static str, i32)> {
        vec![("joinpermission", 10)]
    }

    fn check_set(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        match param.parse::<u32>() {
            Ok(limit) if limit > 0 => Some(vec![limit.to_string()]),
            _ => None,
        }
    }

    fn apply(&self, matrix: &mut Matrix, target: &ModeTarget, args: &mut ActionArgs<'_>) -> Option<bool> {
        let ModeTarget::Channel(key) = target else {
            return None;
        };
        let uuid = args.user(0)?.clone();
        let channel = matrix.channels.get(key)?;
        let limit: usize = channel.modes.value('l')?.parse().ok()?;
        if channel.members.len() < limit {
            return None;
        }
        let display = matrix.target_display(target);
        matrix.send_numeric(&uuid, ERR_CHANNELISFULL, &[&display, "Cannot join channel (+l)"]);
        Some(false)
    }
}

struct TopicLockMode;

impl ModeHandler for TopicLockMode {
    fn affected_actions(&self) -> Vec<(&'static str, i32)> {
        vec![("topicpermission", 10)]
    }

    fn apply(&self, matrix: &mut Matrix, target: &ModeTarget, args: &mut ActionArgs<'_>) -> Option<bool> {
        let ModeTarget::Channel(key) = target else {
            return None;
        };
        let uuid = args.user(0)?.clone();
        if check_channel_level(matrix, "topic", key, &uuid) {
            return None;
        }
        let display = matrix.target_display(target);
        matrix.send_numeric(&uuid, ERR_CHANOPRIVSNEEDED, &[&display, "You're not channel operator"]);
        Some(false)
    }
}
