//! Core user commands: MODE, JOIN, PART and TOPIC.

use crate::modes::ModeTarget;
use crate::modules::{Arg, CommandData, CommandHandler, CommandSource, CommandSpec, Module, Targets};
use crate::state::reply::{
    ERR_NEEDMOREPARAMS, ERR_NOSUCHCHANNEL, ERR_NOSUCHNICK, ERR_NOTONCHANNEL, RPL_CHANNELMODEIS,
    RPL_NOTOPIC, RPL_TOPIC, RPL_UMODEIS,
};
use crate::state::{Matrix, now};
use crate::sync::Propagate;
use meshirc_proto::{CommandRecord, SourceRef, irc_to_lower};
use std::rc::Rc;
use tracing::debug;

pub struct CoreCommands;

impl Module for CoreCommands {
    fn name(&self) -> &'static str {
        "CoreCommands"
    }

    fn core(&self) -> bool {
        true
    }

    fn user_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec {
                name: "MODE".into(),
                priority: 0,
                handler: Rc::new(ModeCommand),
            },
            CommandSpec {
                name: "JOIN".into(),
                priority: 0,
                handler: Rc::new(JoinCommand),
            },
            CommandSpec {
                name: "PART".into(),
                priority: 0,
                handler: Rc::new(PartCommand),
            },
            CommandSpec {
                name: "TOPIC".into(),
                priority: 0,
                handler: Rc::new(TopicCommand),
            },
        ]
    }
}

/// Require `count` parameters, answering ERR_NEEDMOREPARAMS otherwise.
fn need_params(matrix: &Matrix, source: &CommandSource, record: &CommandRecord, count: usize) -> bool {
    if record.params.len() >= count {
        return true;
    }
    if let Some(uuid) = source.user() {
        let command = record.command_name();
        matrix.send_numeric(uuid, ERR_NEEDMOREPARAMS, &[&command, "Not enough parameters"]);
    }
    false
}

fn split_list(param: Option<&String>) -> Vec<String> {
    param
        .map(|p| p.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

struct ModeCommand;

impl CommandHandler for ModeCommand {
    fn parse_params(&self, matrix: &mut Matrix, source: &CommandSource, record: &CommandRecord) -> Option<CommandData> {
        let uuid = source.user()?;
        if !need_params(matrix, source, record, 1) {
            return None;
        }
        let target = &record.params[0];
        let mut data = CommandData::new();
        if target.starts_with(['#', '&']) {
            let key = irc_to_lower(target);
            if !matrix.channels.contains_key(&key) {
                matrix.send_numeric(uuid, ERR_NOSUCHCHANNEL, &[target, "No such channel"]);
                return None;
            }
            data.insert("channel", Arg::Channel(key));
        } else {
            let Some(user) = matrix.find_user(target) else {
                matrix.send_numeric(uuid, ERR_NOSUCHNICK, &[target, "No such nick/channel"]);
                return None;
            };
            data.insert("user", Arg::User(user));
        }
        if let Some(modes) = record.params.get(1) {
            data.insert("modes", Arg::Text(modes.clone()));
            data.insert("params", Arg::Texts(record.params[2..].to_vec()));
        }
        Some(data)
    }

    fn execute(&self, matrix: &mut Matrix, source: &CommandSource, data: &CommandData) -> bool {
        let Some(uuid) = source.user() else {
            return false;
        };
        let modes = match data.get("modes") {
            Some(Arg::Text(modes)) => Some(modes.as_str()),
            _ => None,
        };
        let params = match data.get("params") {
            Some(Arg::Texts(params)) => params.as_slice(),
            _ => &[],
        };
        let acting = SourceRef::User(uuid.clone());

        let result = match (data.get("channel"), data.get("user"), modes) {
            (Some(Arg::Channel(key)), _, Some(modes)) => {
                matrix.set_channel_modes(key, &acting, None, modes, params)
            }
            (Some(Arg::Channel(key)), _, None) => {
                let target = ModeTarget::Channel(key.clone());
                let display = matrix.target_display(&target);
                let mut modes = String::from("+");
                let mut values = Vec::new();
                if let Some(channel) = matrix.channels.get(key) {
                    for (letter, value) in &channel.modes.values {
                        modes.push(*letter);
                        values.extend(value.iter().cloned());
                    }
                }
                let mut reply = vec![display.as_str(), modes.as_str()];
                reply.extend(values.iter().map(String::as_str));
                matrix.send_numeric(uuid, RPL_CHANNELMODEIS, &reply);
                return true;
            }
            (_, Some(Arg::User(target)), Some(modes)) => {
                matrix.set_user_modes(target, &acting, None, modes, params)
            }
            (_, Some(Arg::User(target)), None) => {
                let modes = matrix
                    .users
                    .get(target)
                    .map(|u| u.modes.to_mode_string().0)
                    .unwrap_or_else(|| "+".to_string());
                matrix.send_numeric(uuid, RPL_UMODEIS, &[&modes]);
                return true;
            }
            _ => return false,
        };
        if let Err(e) = result {
            debug!(error = %e, "MODE failed");
        }
        true
    }
}

struct JoinCommand;

impl CommandHandler for JoinCommand {
    fn parse_params(&self, matrix: &mut Matrix, source: &CommandSource, record: &CommandRecord) -> Option<CommandData> {
        source.user()?;
        if !need_params(matrix, source, record, 1) {
            return None;
        }
        let names = split_list(record.params.first());
        let mut data = CommandData::new();
        data.insert("channels", Arg::Texts(names.iter().map(|n| irc_to_lower(n)).collect()));
        data.insert("names", Arg::Texts(names));
        data.insert("keys", Arg::Texts(split_list(record.params.get(1))));
        Some(data)
    }

    fn execute(&self, matrix: &mut Matrix, source: &CommandSource, data: &CommandData) -> bool {
        let Some(uuid) = source.user() else {
            return false;
        };
        let (Some(Arg::Texts(names)), Some(Arg::Texts(keys))) = (data.get("names"), data.get("keys")) else {
            return false;
        };
        for (i, name) in names.iter().enumerate() {
            matrix.join_channel(uuid, name, keys.get(i).map(String::as_str));
        }
        true
    }
}

struct PartCommand;

impl CommandHandler for PartCommand {
    fn parse_params(&self, matrix: &mut Matrix, source: &CommandSource, record: &CommandRecord) -> Option<CommandData> {
        source.user()?;
        if !need_params(matrix, source, record, 1) {
            return None;
        }
        let names = split_list(record.params.first());
        let mut data = CommandData::new();
        data.insert("channels", Arg::Texts(names.iter().map(|n| irc_to_lower(n)).collect()));
        data.insert("names", Arg::Texts(names));
        data.insert("reason", Arg::OptText(record.params.get(1).cloned()));
        Some(data)
    }

    fn execute(&self, matrix: &mut Matrix, source: &CommandSource, data: &CommandData) -> bool {
        let Some(uuid) = source.user() else {
            return false;
        };
        let Some(Arg::Texts(names)) = data.get("names") else {
            return false;
        };
        let reason = match data.get("reason") {
            Some(Arg::OptText(reason)) => reason.as_deref(),
            _ => None,
        };
        for name in names {
            matrix.part_channel(uuid, name, reason, Propagate::All);
        }
        true
    }
}

struct TopicCommand;

impl CommandHandler for TopicCommand {
    fn parse_params(&self, matrix: &mut Matrix, source: &CommandSource, record: &CommandRecord) -> Option<CommandData> {
        let uuid = source.user()?;
        if !need_params(matrix, source, record, 1) {
            return None;
        }
        let name = &record.params[0];
        let key = irc_to_lower(name);
        if !matrix.channels.contains_key(&key) {
            matrix.send_numeric(uuid, ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
            return None;
        }
        let mut data = CommandData::new();
        data.insert("channel", Arg::Channel(key));
        data.insert("topic", Arg::OptText(record.params.get(1).cloned()));
        Some(data)
    }

    fn execute(&self, matrix: &mut Matrix, source: &CommandSource, data: &CommandData) -> bool {
        let Some(uuid) = source.user() else {
            return false;
        };
        let Some(Arg::Channel(key)) = data.get("channel") else {
            return false;
        };
        let Some(channel) = matrix.channels.get(key) else {
            return false;
        };
        let display = channel.name.as_str().to_string();

        let Some(Arg::OptText(Some(text))) = data.get("topic") else {
            match channel.topic.clone() {
                Some(topic) => matrix.send_numeric(uuid, RPL_TOPIC, &[&display, &topic.text]),
                None => matrix.send_numeric(uuid, RPL_NOTOPIC, &[&display, "No topic is set"]),
            }
            return true;
        };

        if !channel.is_member(uuid) {
            matrix.send_numeric(uuid, ERR_NOTONCHANNEL, &[&display, "You're not on that channel"]);
            return true;
        }
        let vote = matrix.run_action_voting(
            "topicpermission",
            &[Arg::User(uuid.clone()), Arg::Channel(key.clone())],
            &Targets::channel(key.clone()),
        );
        if vote < 0 {
            return true;
        }
        let setter = matrix
            .users
            .get(uuid)
            .map(|u| u.hostmask())
            .unwrap_or_default();
        matrix.set_topic(key, text, &setter, now(), Propagate::All);
        true
    }
}
