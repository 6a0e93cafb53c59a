//! Parsed command records handed over by transport collaborators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed protocol line: command, ordered parameters, optional source
/// prefix and message tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Command name as received.
    pub command: String,
    /// Positional parameters.
    pub params: Vec<String>,
    /// Source identity prefix, if the line carried one.
    pub prefix: Option<String>,
    /// Message tags (`key` or `key=value`).
    pub tags: BTreeMap<String, Option<String>>,
}

impl CommandRecord {
    /// Build a record without prefix or tags.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            command: command.into(),
            params,
            prefix: None,
            tags: BTreeMap::new(),
        }
    }

    /// Upper-cased command name used for handler lookup.
    #[must_use]
    pub fn command_name(&self) -> String {
        self.command.to_ascii_uppercase()
    }
}
