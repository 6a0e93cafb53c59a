//! Mode change announcement and propagation.

use crate::modes::{ModeScope, ModeTarget};
use crate::modules::{ActionArgs, ActionSpec, Arg, Module, action_fn};
use crate::state::Matrix;
use crate::state::reply::ClientReply;
use crate::sync::Propagate;
use meshirc_proto::{LinkMessage, ModeChange, SyncTarget, format_changes};

/// Renders `MODE` announcements to local members and relays applied
/// changes to the rest of the mesh.
pub struct CoreModeSync;

impl Module for CoreModeSync {
    fn name(&self) -> &'static str {
        "CoreModeSync"
    }

    fn core(&self) -> bool {
        true
    }

    fn actions(&self) -> Vec<ActionSpec> {
        let mut actions = Vec::new();
        for scope in [ModeScope::Channel, ModeScope::User] {
            actions.push(ActionSpec::new(
                format!("modemessage-{scope}"),
                -100,
                action_fn(announce),
            ));
            actions.push(ActionSpec::new(
                format!("modechanges-{scope}"),
                0,
                action_fn(propagate),
            ));
        }
        actions
    }
}

/// Send the rendered change to every remaining recipient, then drain them.
fn announce(matrix: &mut Matrix, args: &mut ActionArgs<'_>) -> Option<bool> {
    let target = ModeTarget::from_arg(args.params.first()?)?;
    let source = args.text(1)?.to_string();
    let (modes, params) = format_changes(args.changes(2)?);
    let mut line = vec![matrix.target_display(&target), modes];
    line.extend(params);
    let reply = ClientReply::event(source, "MODE", line);
    let recipients = args.users_mut(0)?;
    for uuid in recipients.drain(..) {
        matrix.send_to_user(&uuid, reply.clone());
    }
    Some(true)
}

/// Relay applied changes to every neighbor but the one they came from.
/// Status parameters travel as uuids.
fn propagate(matrix: &mut Matrix, args: &mut ActionArgs<'_>) -> Option<bool> {
    let target = ModeTarget::from_arg(args.params.first()?)?;
    let source = args.source(1)?.clone();
    let via = args.opt_server(2).and_then(|sid| matrix.sync.link_for(sid));
    let changes: Vec<ModeChange> = args
        .changes(3)?
        .iter()
        .map(|change| {
            let is_status = matches!(target, ModeTarget::Channel(_))
                && matrix.registry.status(change.mode).is_some();
            let param = match (&change.param, is_status) {
                (Some(nick), true) => matrix
                    .find_user(nick)
                    .map(|uuid| uuid.to_string())
                    .or_else(|| Some(nick.clone())),
                (param, _) => param.clone(),
            };
            ModeChange::new(change.adding, change.mode, param)
        })
        .collect();

    let (sync_target, target_ts) = match &target {
        ModeTarget::Channel(key) => {
            let channel = matrix.channels.get(key)?;
            (SyncTarget::Channel(channel.name.as_str().to_string()), channel.created)
        }
        ModeTarget::User(uuid) => (SyncTarget::User(uuid.clone()), matrix.users.get(uuid)?.connect_ts),
    };
    let (modes, params) = format_changes(&changes);
    matrix.broadcast(
        Propagate::except(via),
        LinkMessage::SetMode {
            source,
            target: sync_target,
            target_ts,
            modes,
            params,
        },
    );
    None
}
