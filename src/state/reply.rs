//! Replies delivered to locally connected users.
//!
//! Wire formatting belongs to the transport; the core only hands over
//! structured events and numeric replies.

use super::modes::ListEntry;

pub const RPL_UMODEIS: u16 = 221;
pub const RPL_CHANNELMODEIS: u16 = 324;
pub const RPL_NOTOPIC: u16 = 331;
pub const RPL_TOPIC: u16 = 332;
pub const RPL_ISUPPORT: u16 = 5;
pub const ERR_NOSUCHNICK: u16 = 401;
pub const ERR_NOSUCHCHANNEL: u16 = 403;
pub const ERR_UNKNOWNCOMMAND: u16 = 421;
pub const ERR_ERRONEUSNICKNAME: u16 = 432;
pub const ERR_NICKCOLLISION: u16 = 436;
pub const ERR_NOTONCHANNEL: u16 = 442;
pub const ERR_NEEDMOREPARAMS: u16 = 461;
pub const ERR_CHANNELISFULL: u16 = 471;
pub const ERR_UNKNOWNMODE: u16 = 472;
pub const ERR_BANNEDFROMCHAN: u16 = 474;
pub const ERR_BADCHANNELKEY: u16 = 475;
pub const ERR_BANLISTFULL: u16 = 478;
pub const ERR_BADCHANMASK: u16 = 476;
pub const ERR_CHANOPRIVSNEEDED: u16 = 482;
pub const ERR_USERSDONTMATCH: u16 = 502;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientReply {
    /// A relayed event such as `MODE`, `JOIN` or `TOPIC`.
    Event {
        source: String,
        command: String,
        params: Vec<String>,
    },
    /// A numeric reply; the last parameter is the human-readable reason.
    Numeric { code: u16, params: Vec<String> },
    /// Current contents of a list mode.
    ModeList {
        target: String,
        mode: char,
        entries: Vec<ListEntry>,
    },
}

impl ClientReply {
    pub fn event(source: impl Into<String>, command: &str, params: Vec<String>) -> Self {
        Self::Event {
            source: source.into(),
            command: command.to_string(),
            params,
        }
    }

    pub fn numeric(code: u16, params: Vec<String>) -> Self {
        Self::Numeric { code, params }
    }

    /// Numeric code, if this is one.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Numeric { code, .. } => Some(*code),
            _ => None,
        }
    }
}
