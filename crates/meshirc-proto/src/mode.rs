//! Mode primitives shared by the mode engine and the link protocol.

use serde::{Deserialize, Serialize};

/// How a mode letter consumes parameters and stores its value.
///
/// The declaration order matches the `CHANMODES` ISUPPORT groups A-D,
/// followed by status modes which are rendered through `PREFIX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModeType {
    /// Multi-valued list (bans, exceptions). Always takes a parameter.
    List,
    /// Single value that needs the parameter on unset too (channel key).
    ParamOnUnset,
    /// Single value whose parameter is only given when setting (limit).
    Param,
    /// Boolean flag without parameter.
    NoParam,
    /// Ranked per-member status (op, voice). Channel modes only.
    Status,
}

impl ModeType {
    /// Whether a mode of this type consumes a parameter in the given direction.
    #[must_use]
    pub fn takes_param(self, adding: bool) -> bool {
        match self {
            Self::List | Self::ParamOnUnset | Self::Status => true,
            Self::Param => adding,
            Self::NoParam => false,
        }
    }
}

/// Check that a character may be used as a mode letter.
#[must_use]
pub fn is_valid_mode_letter(letter: char) -> bool {
    letter.is_ascii_alphabetic()
}

/// One applied mode change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChange {
    /// `true` for `+`, `false` for `-`.
    pub adding: bool,
    /// The mode letter.
    pub mode: char,
    /// The concrete parameter, if the mode took one.
    pub param: Option<String>,
}

impl ModeChange {
    /// Create a change record.
    pub fn new(adding: bool, mode: char, param: Option<String>) -> Self {
        Self {
            adding,
            mode,
            param,
        }
    }
}

/// Render applied changes as a mode string plus positional parameters.
///
/// Sign characters are only emitted when the direction changes, so
/// `[+o, +v, -b]` becomes `("+ov-b", [..])`.
pub fn format_changes(changes: &[ModeChange]) -> (String, Vec<String>) {
    let mut modes = String::with_capacity(changes.len() * 2);
    let mut params = Vec::new();
    let mut current: Option<bool> = None;
    for change in changes {
        if current != Some(change.adding) {
            modes.push(if change.adding { '+' } else { '-' });
            current = Some(change.adding);
        }
        modes.push(change.mode);
        if let Some(param) = &change.param {
            params.push(param.clone());
        }
    }
    (modes, params)
}
