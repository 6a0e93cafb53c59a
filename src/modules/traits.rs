//! The contract between the core and feature modules.

use super::actions::{ActionArgs, ActionFn};
use super::commands::{CommandData, CommandSource};
use crate::modes::ModeTarget;
use crate::state::Matrix;
use futures_util::future::LocalBoxFuture;
use meshirc_proto::{CommandRecord, ModeType};
use std::rc::Rc;

/// Pending asynchronous module teardown.
pub type Teardown = LocalBoxFuture<'static, ()>;

/// Rank and prefix symbol of a status mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSpec {
    pub rank: i32,
    pub symbol: char,
}

/// A channel mode declared by a module.
#[derive(Clone)]
pub struct ChannelModeSpec {
    pub letter: char,
    pub mode_type: ModeType,
    pub handler: Rc<dyn ModeHandler>,
    /// Required for [`ModeType::Status`], ignored otherwise.
    pub status: Option<StatusSpec>,
}

impl ChannelModeSpec {
    pub fn new(letter: char, mode_type: ModeType, handler: Rc<dyn ModeHandler>) -> Self {
        Self {
            letter,
            mode_type,
            handler,
            status: None,
        }
    }

    pub fn status(letter: char, rank: i32, symbol: char, handler: Rc<dyn ModeHandler>) -> Self {
        Self {
            letter,
            mode_type: ModeType::Status,
            handler,
            status: Some(StatusSpec { rank, symbol }),
        }
    }
}

/// A user mode declared by a module.
#[derive(Clone)]
pub struct UserModeSpec {
    pub letter: char,
    pub mode_type: ModeType,
    pub handler: Rc<dyn ModeHandler>,
}

/// An action handler declared by a module.
#[derive(Clone)]
pub struct ActionSpec {
    pub name: String,
    pub priority: i32,
    pub handler: ActionFn,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, priority: i32, handler: ActionFn) -> Self {
        Self {
            name: name.into(),
            priority,
            handler,
        }
    }
}

/// A user or server command declared by a module.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub priority: i32,
    pub handler: Rc<dyn CommandHandler>,
}

/// A loadable extension.
///
/// Everything a module declares is installed atomically on load and removed
/// again on unload. Handlers get the server context passed explicitly on
/// every call and must not block.
pub trait Module {
    fn name(&self) -> &'static str;

    /// Core modules are always loaded and cannot be fully unloaded.
    fn core(&self) -> bool {
        false
    }

    /// Force the module into the common set even if it declares nothing
    /// wire-visible.
    fn required_on_all_servers(&self) -> bool {
        false
    }

    fn channel_modes(&self) -> Vec<ChannelModeSpec> {
        Vec::new()
    }

    fn user_modes(&self) -> Vec<UserModeSpec> {
        Vec::new()
    }

    fn actions(&self) -> Vec<ActionSpec> {
        Vec::new()
    }

    fn user_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn server_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Called on every unload, before the tables are cleared.
    fn unload(&self, _matrix: &mut Matrix) -> Option<Teardown> {
        None
    }

    /// Called only on a full unload, after the tables are cleared.
    fn full_unload(&self, _matrix: &mut Matrix) -> Option<Teardown> {
        None
    }
}

/// Behavior of one mode letter.
///
/// `check_set`/`check_unset` validate a raw parameter and may fan it out
/// into several concrete parameters; `None` rejects the letter. They are
/// only consulted for modes that consume a parameter.
pub trait ModeHandler {
    /// Actions this mode hooks as a conditional handler, with priorities.
    fn affected_actions(&self) -> Vec<(&'static str, i32)> {
        Vec::new()
    }

    fn check_set(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        Some(vec![param.to_string()])
    }

    fn check_unset(&self, _matrix: &mut Matrix, _target: &ModeTarget, param: &str) -> Option<Vec<String>> {
        Some(vec![param.to_string()])
    }

    /// Run as a hooked handler for `args.action` on an entity carrying
    /// this mode.
    fn apply(&self, _matrix: &mut Matrix, _target: &ModeTarget, _args: &mut ActionArgs<'_>) -> Option<bool> {
        None
    }
}

/// A command implementation.
pub trait CommandHandler {
    /// Turn a record into command data. `None` lets the next handler for
    /// the same command try.
    fn parse_params(
        &self,
        matrix: &mut Matrix,
        source: &CommandSource,
        record: &CommandRecord,
    ) -> Option<CommandData>;

    /// Run the command. `false` lets the next handler try.
    fn execute(&self, matrix: &mut Matrix, source: &CommandSource, data: &CommandData) -> bool;
}

/// Plain mode with no extra behavior.
pub struct SimpleMode;

impl ModeHandler for SimpleMode {}
