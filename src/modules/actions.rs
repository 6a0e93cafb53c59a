//! Action dispatch engine.
//!
//! Handlers are registered under string action names and run in descending
//! priority order, ties in registration order. Modes may hook an action
//! through [`ModeHandler::affected_actions`]; such hooked handlers run before
//! the plain ones, once per target entity that carries the mode and for
//! which the nested `modeactioncheck-<scope>-<letter>-<action>` vote is not
//! negative.
//!
//! Every call terminates after the handler list is exhausted or a semantic's
//! sentinel is reached. Dispatch is reentrant: handlers receive the server
//! context and may run further dispatches.
//!
//! [`ModeHandler::affected_actions`]: super::traits::ModeHandler::affected_actions

use super::commands::CommandData;
use super::traits::ModeHandler;
use crate::metrics;
use crate::modes::{ModeScope, ModeTarget};
use crate::state::Matrix;
use crate::telemetry::spans;
use meshirc_proto::{ModeChange, ServerId, SourceRef, UserUuid};
use std::ops::ControlFlow;
use std::rc::Rc;

/// Plain action handler. `None` abstains.
pub type ActionFn = Rc<dyn Fn(&mut Matrix, &mut ActionArgs<'_>) -> Option<bool>>;

/// Box a closure as an [`ActionFn`].
pub fn action_fn<F>(f: F) -> ActionFn
where
    F: Fn(&mut Matrix, &mut ActionArgs<'_>) -> Option<bool> + 'static,
{
    Rc::new(f)
}

/// Typed action argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    User(UserUuid),
    /// Folded channel key.
    Channel(String),
    Server(ServerId),
    Source(SourceRef),
    Text(String),
    OptText(Option<String>),
    OptServer(Option<ServerId>),
    Mode(char),
    Flag(bool),
    Int(i64),
    Changes(Vec<ModeChange>),
    Users(Vec<UserUuid>),
    Servers(Vec<ServerId>),
    Texts(Vec<String>),
    Data(CommandData),
}

impl Arg {
    /// A collection argument with nothing left in it.
    pub fn is_drained(&self) -> bool {
        match self {
            Self::Changes(v) => v.is_empty(),
            Self::Users(v) => v.is_empty(),
            Self::Servers(v) => v.is_empty(),
            Self::Texts(v) => v.is_empty(),
            _ => false,
        }
    }
}

/// What a handler sees: the action name, read-only parameters and, for the
/// processing semantics, the mutable collections being threaded through.
pub struct ActionArgs<'a> {
    pub action: &'a str,
    pub params: &'a [Arg],
    pub data: &'a mut [Arg],
}

impl ActionArgs<'_> {
    pub fn user(&self, idx: usize) -> Option<&UserUuid> {
        match self.params.get(idx) {
            Some(Arg::User(u)) => Some(u),
            _ => None,
        }
    }

    pub fn channel(&self, idx: usize) -> Option<&str> {
        match self.params.get(idx) {
            Some(Arg::Channel(c)) => Some(c),
            _ => None,
        }
    }

    pub fn server(&self, idx: usize) -> Option<&ServerId> {
        match self.params.get(idx) {
            Some(Arg::Server(s)) => Some(s),
            _ => None,
        }
    }

    pub fn text(&self, idx: usize) -> Option<&str> {
        match self.params.get(idx) {
            Some(Arg::Text(t)) => Some(t),
            Some(Arg::OptText(Some(t))) => Some(t),
            _ => None,
        }
    }

    pub fn flag(&self, idx: usize) -> Option<bool> {
        match self.params.get(idx) {
            Some(Arg::Flag(f)) => Some(*f),
            _ => None,
        }
    }

    pub fn changes(&self, idx: usize) -> Option<&[ModeChange]> {
        match self.params.get(idx) {
            Some(Arg::Changes(c)) => Some(c),
            _ => None,
        }
    }

    pub fn source(&self, idx: usize) -> Option<&SourceRef> {
        match self.params.get(idx) {
            Some(Arg::Source(s)) => Some(s),
            _ => None,
        }
    }

    pub fn opt_server(&self, idx: usize) -> Option<&ServerId> {
        match self.params.get(idx) {
            Some(Arg::OptServer(s)) => s.as_ref(),
            _ => None,
        }
    }

    pub fn users_mut(&mut self, idx: usize) -> Option<&mut Vec<UserUuid>> {
        match self.data.get_mut(idx) {
            Some(Arg::Users(u)) => Some(u),
            _ => None,
        }
    }

    pub fn texts_mut(&mut self, idx: usize) -> Option<&mut Vec<String>> {
        match self.data.get_mut(idx) {
            Some(Arg::Texts(t)) => Some(t),
            _ => None,
        }
    }
}

/// Entities a dispatch concerns. Hooked mode handlers only run for these.
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub users: Vec<UserUuid>,
    /// Folded channel keys.
    pub channels: Vec<String>,
}

impl Targets {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn channel(key: impl Into<String>) -> Self {
        Self {
            users: Vec::new(),
            channels: vec![key.into()],
        }
    }

    pub fn user(uuid: UserUuid) -> Self {
        Self {
            users: vec![uuid],
            channels: Vec::new(),
        }
    }
}

enum Invocation {
    Hook {
        handler: Rc<dyn ModeHandler>,
        target: ModeTarget,
    },
    Plain(ActionFn),
}

impl Matrix {
    /// Run all handlers, ignoring results.
    pub fn run_action_standard(&mut self, action: &str, params: &[Arg], targets: &Targets) {
        self.dispatch("standard", action, params, &mut [], targets, |_| {
            ControlFlow::Continue(())
        });
    }

    /// Stop at the first handler returning `Some(true)` and return `true`;
    /// `false` once exhausted.
    pub fn run_action_until_true(&mut self, action: &str, params: &[Arg], targets: &Targets) -> bool {
        let mut hit = false;
        self.dispatch("until_true", action, params, &mut [], targets, |result| {
            if result == Some(true) {
                hit = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        hit
    }

    /// Stop at the first handler returning `Some(false)` and return `false`;
    /// `true` once exhausted.
    pub fn run_action_until_false(&mut self, action: &str, params: &[Arg], targets: &Targets) -> bool {
        let mut passed = true;
        self.dispatch("until_false", action, params, &mut [], targets, |result| {
            if result == Some(false) {
                passed = false;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        passed
    }

    /// Run all handlers; whether any returned `Some(true)`.
    pub fn run_action_flag_true(&mut self, action: &str, params: &[Arg], targets: &Targets) -> bool {
        let mut flagged = false;
        self.dispatch("flag_true", action, params, &mut [], targets, |result| {
            flagged |= result == Some(true);
            ControlFlow::Continue(())
        });
        flagged
    }

    /// Run all handlers; whether any returned `Some(false)`.
    pub fn run_action_flag_false(&mut self, action: &str, params: &[Arg], targets: &Targets) -> bool {
        let mut flagged = false;
        self.dispatch("flag_false", action, params, &mut [], targets, |result| {
            flagged |= result == Some(false);
            ControlFlow::Continue(())
        });
        flagged
    }

    /// Sum of +1 per `Some(true)` and -1 per `Some(false)`. Negative vetoes.
    pub fn run_action_voting(&mut self, action: &str, params: &[Arg], targets: &Targets) -> i32 {
        let mut sum = 0;
        self.dispatch("voting", action, params, &mut [], targets, |result| {
            match result {
                Some(true) => sum += 1,
                Some(false) => sum -= 1,
                None => {}
            }
            ControlFlow::Continue(())
        });
        sum
    }

    /// Thread one collection through the handlers until one drains it.
    pub fn run_action_processing(
        &mut self,
        action: &str,
        data: &mut Arg,
        params: &[Arg],
        targets: &Targets,
    ) {
        self.dispatch(
            "processing",
            action,
            params,
            std::slice::from_mut(data),
            targets,
            |_| ControlFlow::Continue(()),
        );
    }

    /// Thread several collections through the handlers until all are drained.
    pub fn run_action_processing_multiple(
        &mut self,
        action: &str,
        data: &mut [Arg],
        params: &[Arg],
        targets: &Targets,
    ) {
        self.dispatch("processing_multiple", action, params, data, targets, |_| {
            ControlFlow::Continue(())
        });
    }

    fn dispatch(
        &mut self,
        semantic: &'static str,
        action: &str,
        params: &[Arg],
        data: &mut [Arg],
        targets: &Targets,
        mut step: impl FnMut(Option<bool>) -> ControlFlow<()>,
    ) {
        metrics::record_dispatch(semantic);
        let span = spans::dispatch(action, semantic);
        let _guard = span.enter();

        let invocations = self.invocations(action, params, targets);
        for invocation in &invocations {
            if !data.is_empty() && data.iter().all(Arg::is_drained) {
                break;
            }
            let mut args = ActionArgs {
                action,
                params,
                data: &mut *data,
            };
            let result = match invocation {
                Invocation::Hook { handler, target } => handler.apply(self, target, &mut args),
                Invocation::Plain(handler) => handler(self, &mut args),
            };
            if step(result).is_break() {
                break;
            }
        }
    }

    /// Hooked handlers for carrying targets first, then plain handlers.
    fn invocations(&mut self, action: &str, params: &[Arg], targets: &Targets) -> Vec<Invocation> {
        let mut out = Vec::new();
        for hook in self.registry.mode_hooks(action) {
            let candidates: Vec<ModeTarget> = match hook.scope {
                ModeScope::Channel => targets
                    .channels
                    .iter()
                    .map(|c| ModeTarget::Channel(c.clone()))
                    .collect(),
                ModeScope::User => targets.users.iter().cloned().map(ModeTarget::User).collect(),
            };
            for target in candidates {
                if !self.target_has_mode(&target, hook.letter) {
                    continue;
                }
                if !self.mode_applies(hook.scope, hook.letter, action, &target, params) {
                    continue;
                }
                out.push(Invocation::Hook {
                    handler: Rc::clone(&hook.handler),
                    target,
                });
            }
        }
        out.extend(
            self.registry
                .action_handlers(action)
                .into_iter()
                .map(Invocation::Plain),
        );
        out
    }

    /// Nested vote on whether a carried mode participates for this target.
    /// Abstention counts as "applies".
    fn mode_applies(
        &mut self,
        scope: ModeScope,
        letter: char,
        action: &str,
        target: &ModeTarget,
        params: &[Arg],
    ) -> bool {
        let check = format!("modeactioncheck-{}-{}-{}", scope.as_str(), letter, action);
        if !self.registry.has_action(&check) {
            return true;
        }
        let mut nested = Vec::with_capacity(params.len() + 1);
        nested.push(target.to_arg());
        nested.extend_from_slice(params);
        self.run_action_voting(&check, &nested, &Targets::none()) >= 0
    }
}
