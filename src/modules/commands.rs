//! User and server command dispatch.

use super::actions::{Arg, Targets};
use crate::state::Matrix;
use crate::state::reply::{ClientReply, ERR_UNKNOWNCOMMAND};
use crate::telemetry::spans;
use meshirc_proto::{CommandRecord, ServerId, SourceRef, UserUuid};
use std::collections::BTreeMap;
use tracing::debug;

/// Parsed command parameters, keyed by name.
///
/// The keys `channel`/`channels` and `user`/`users` double as dispatch
/// targets for the permission check.
pub type CommandData = BTreeMap<&'static str, Arg>;

/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    /// A locally connected user.
    User(UserUuid),
    /// A remote identity, relayed by a directly linked server.
    Server { via: ServerId, source: SourceRef },
}

impl CommandSource {
    pub fn user(&self) -> Option<&UserUuid> {
        match self {
            Self::User(uuid) => Some(uuid),
            Self::Server { .. } => None,
        }
    }
}

fn targets_from(data: &CommandData) -> Targets {
    let mut targets = Targets::none();
    for (key, arg) in data {
        match (*key, arg) {
            ("channel", Arg::Channel(c)) => targets.channels.push(c.clone()),
            ("channels", Arg::Texts(cs)) => targets.channels.extend(cs.iter().cloned()),
            ("user", Arg::User(u)) => targets.users.push(u.clone()),
            ("users", Arg::Users(us)) => targets.users.extend(us.iter().cloned()),
            _ => {}
        }
    }
    targets
}

impl Matrix {
    /// Dispatch a command from a local user. Returns whether some handler
    /// took it.
    pub fn handle_user_command(&mut self, uuid: &UserUuid, record: &CommandRecord) -> bool {
        let name = record.command_name();
        let span = spans::command(&name, uuid.as_str());
        let _guard = span.enter();

        let handlers = self.registry.user_commands(&name);
        if handlers.is_empty() {
            let nick = self.nick_of(uuid);
            self.send_to_user(
                uuid,
                ClientReply::numeric(
                    ERR_UNKNOWNCOMMAND,
                    vec![nick, name.clone(), "Unknown command".to_string()],
                ),
            );
            return false;
        }

        let source = CommandSource::User(uuid.clone());
        let permission = format!("commandpermission-{name}");
        for handler in handlers {
            let Some(data) = handler.parse_params(self, &source, record) else {
                continue;
            };
            let params = [Arg::User(uuid.clone()), Arg::Data(data.clone())];
            if !self.run_action_until_false(&permission, &params, &targets_from(&data)) {
                debug!(command = %name, "command vetoed");
                return true;
            }
            if handler.execute(self, &source, &data) {
                self.run_action_standard(&format!("commandextra-{name}"), &params, &Targets::none());
                return true;
            }
        }
        false
    }

    /// Dispatch a module-defined command relayed by a linked server.
    pub fn handle_server_command(&mut self, via: &ServerId, source: &SourceRef, record: &CommandRecord) -> bool {
        let name = record.command_name();
        let source = CommandSource::Server {
            via: via.clone(),
            source: source.clone(),
        };
        for handler in self.registry.server_commands(&name) {
            let Some(data) = handler.parse_params(self, &source, record) else {
                continue;
            };
            if handler.execute(self, &source, &data) {
                return true;
            }
        }
        debug!(command = %name, via = %via, "unhandled server command");
        false
    }
}
