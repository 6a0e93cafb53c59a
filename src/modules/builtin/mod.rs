//! Modules shipped with the daemon.
//!
//! The core set is always loaded. Everything else is loaded by name from
//! the `[modules]` section of the configuration.

mod core_commands;
mod mode_sync;
mod op_access;
mod rfc_modes;

pub use core_commands::CoreCommands;
pub use mode_sync::CoreModeSync;
pub use op_access::ChannelOpAccess;
pub use rfc_modes::RfcChannelModes;

use super::actions::{Arg, Targets};
use super::traits::Module;
use crate::state::Matrix;
use meshirc_proto::UserUuid;
use std::rc::Rc;

/// Modules loaded unconditionally, in load order.
pub fn core_modules() -> Vec<Rc<dyn Module>> {
    vec![
        Rc::new(RfcChannelModes),
        Rc::new(CoreModeSync),
        Rc::new(CoreCommands),
    ]
}

/// Look up an optional module by its configured name.
pub fn by_name(name: &str) -> Option<Rc<dyn Module>> {
    match name {
        "ChannelOpAccess" => Some(Rc::new(ChannelOpAccess)),
        _ => None,
    }
}

/// Rank of the highest status a member holds.
pub fn highest_rank(matrix: &Matrix, key: &str, uuid: &UserUuid) -> Option<i32> {
    let letter = matrix.channels.get(key)?.status(uuid)?.chars().next()?;
    matrix.registry.status_rank(letter)
}

/// Whether a member may perform a channel action such as `topic` or
/// `mode-b`.
///
/// Modules vote through `checkchannellevel`; a positive sum allows, a
/// negative one denies. Without an opinion the member needs operator
/// rank.
pub fn check_channel_level(matrix: &mut Matrix, level: &str, key: &str, uuid: &UserUuid) -> bool {
    let vote = matrix.run_action_voting(
        "checkchannellevel",
        &[
            Arg::Text(level.to_string()),
            Arg::Channel(key.to_string()),
            Arg::User(uuid.clone()),
        ],
        &Targets::channel(key),
    );
    if vote != 0 {
        return vote > 0;
    }
    let required = matrix.registry.status_rank('o').unwrap_or(0);
    highest_rank(matrix, key, uuid).is_some_and(|rank| rank >= required)
}
