//! Module system.
//!
//! Feature modules extend the daemon by declaring modes, action handlers and
//! commands. The [`Registry`] validates and installs those declarations;
//! the dispatch engine in [`actions`] runs them.
//!
//! - [`traits`]: the load-time contract (`Module`, `ModeHandler`, `CommandHandler`)
//! - [`registry`]: the shared tables and all-or-nothing registration
//! - [`actions`]: the seven dispatch semantics and their argument types
//! - [`commands`]: user and server command dispatch
//! - [`lifecycle`]: load/unload through the server context
//! - [`builtin`]: the modules shipped with the daemon

pub mod actions;
pub mod builtin;
pub mod commands;
pub mod lifecycle;
pub mod registry;
pub mod traits;

pub use actions::{ActionArgs, ActionFn, Arg, Targets, action_fn};
pub use commands::{CommandData, CommandSource};
pub use registry::{ModeEntry, Registry, StatusEntry};
pub use traits::{
    ActionSpec, ChannelModeSpec, CommandHandler, CommandSpec, ModeHandler, Module, StatusSpec,
    SimpleMode, Teardown, UserModeSpec,
};
