//! Per-channel access levels.
//!
//! List mode `W` holds `status:level` entries. A member may perform
//! `level` when their highest status ranks at least as high as `status`.
//! `*` grants the level to everyone, `-` to no one.

use super::highest_rank;
use super::rfc_modes::channel_mode_permission;
use crate::modes::ModeTarget;
use crate::modules::{ActionArgs, ActionSpec, ChannelModeSpec, ModeHandler, Module, action_fn};
use crate::state::Matrix;
use meshirc_proto::ModeType;
use std::rc::Rc;

const LETTER: char = 'W';

pub struct ChannelOpAccess;

impl Module for ChannelOpAccess {
    fn name(&self) -> &'static str {
        "ChannelOpAccess"
    }

    fn channel_modes(&self) -> Vec<ChannelModeSpec> {
        vec![ChannelModeSpec::new(LETTER, ModeType::List, Rc::new(AccessMode))]
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::new(
                "modepermission-channel-W",
                0,
                action_fn(|matrix, args| channel_mode_permission(matrix, args, LETTER)),
            ),
            ActionSpec::new(
                "modeactioncheck-channel-W-checkchannellevel",
                1,
                action_fn(|matrix, args| {
                    let ModeTarget::Channel(key) = ModeTarget::from_arg(args.params.first()?)? else {
                        return None;
                    };
                    let level = args.text(1)?;
                    match entry_for(matrix, &key, level) {
                        Some(_) => None,
                        None => Some(false),
                    }
                }),
            ),
        ]
    }
}

/// The first `W` entry governing `level` on a channel.
fn entry_for(matrix: &Matrix, key: &str, level: &str) -> Option<String> {
    matrix
        .channels
        .get(key)?
        .modes
        .list(LETTER)
        .iter()
        .find(|entry| entry.param.split_once(':').is_some_and(|(_, perm)| perm == level))
        .map(|entry| entry.param.clone())
}

struct AccessMode;

impl AccessMode {
    fn valid(matrix: &Matrix, param: &str) -> bool {
        let Some((status, perm)) = param.split_once(':') else {
            return false;
        };
        if perm.is_empty() {
            return false;
        }
        matches!(status, "*" | "-")
            || (status.chars().count() == 1
                && status.chars().next().is_some_and(|c| matrix.registry.status(c).is_some()))
    }
}

impl ModeHandler for AccessMode {
    fn affected_actions(&self) -> Vec<(&'static str, i32)> {
        vec![("checkchannellevel", 10)]
    }

    fn check_set(&self, matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        let accepted: Vec<String> = param
            .split(',')
            .filter(|p| Self::valid(matrix, p))
            .map(str::to_string)
            .collect();
        (!accepted.is_empty()).then_some(accepted)
    }

    fn check_unset(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        let params: Vec<String> = param
            .split(',')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        (!params.is_empty()).then_some(params)
    }

    fn apply(&self, matrix: &mut Matrix, target: &ModeTarget, args: &mut ActionArgs<'_>) -> Option<bool> {
        let ModeTarget::Channel(key) = target else {
            return None;
        };
        let level = args.text(0)?;
        let uuid = args.user(2)?;
        let entry = entry_for(matrix, key, level)?;
        let (status, _) = entry.split_once(':')?;
        match status {
            "*" => Some(true),
            "-" => Some(false),
            _ => {
                // Entries naming a status that has since been unloaded deny.
                let letter = status.chars().next()?;
                let Some(required) = matrix.registry.status_rank(letter) else {
                    return Some(false);
                };
                Some(highest_rank(matrix, key, uuid).is_some_and(|rank| rank >= required))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::builtin::check_channel_level;
    use crate::state::testing::{local_user, matrix};
    use meshirc_proto::SourceRef;

    fn access_matrix() -> Matrix {
        let mut m = matrix();
        m.load_module(Rc::new(ChannelOpAccess))
            .expect("ChannelOpAccess loads");
        m
    }

    #[test]
    fn rejects_unknown_status_letters() {
        let m = access_matrix();
        assert!(AccessMode::valid(&m, "v:topic"));
        assert!(AccessMode::valid(&m, "*:mode-b"));
        assert!(!AccessMode::valid(&m, "q:topic"));
        assert!(!AccessMode::valid(&m, "v:"));
        assert!(!AccessMode::valid(&m, "topic"));
    }

    #[test]
    fn voiced_members_may_set_topic_when_granted() {
        let mut m = access_matrix();
        let (op, _op_rx) = local_user(&mut m, "op");
        let (voiced, mut rx) = local_user(&mut m, "voiced");
        assert!(m.join_channel(&op, "#room", None));
        assert!(m.join_channel(&voiced, "#room", None));

        let acting = SourceRef::User(op.clone());
        m.set_channel_modes("#room", &acting, None, "+tv", &["voiced".into()])
            .expect("modes apply");
        while rx.try_recv().is_ok() {}

        assert!(!check_channel_level(&mut m, "topic", "#room", &voiced));

        m.set_channel_modes("#room", &acting, None, "+W", &["v:topic".into()])
            .expect("modes apply");
        assert!(check_channel_level(&mut m, "topic", "#room", &voiced));
        // Other levels keep the default.
        assert!(!check_channel_level(&mut m, "mode-b", "#room", &voiced));
    }

    #[test]
    fn dash_denies_even_operators() {
        let mut m = access_matrix();
        let (op, _rx) = local_user(&mut m, "op");
        assert!(m.join_channel(&op, "#room", None));
        let acting = SourceRef::User(op.clone());
        m.set_channel_modes("#room", &acting, None, "+W", &["-:topic".into()])
            .expect("modes apply");
        assert!(!check_channel_level(&mut m, "topic", "#room", &op));
    }
}
