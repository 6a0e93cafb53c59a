//! Mode engine limits configuration.

use serde::Deserialize;

/// Caps applied by the mode engine.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum entries per list mode (default: 100).
    #[serde(default = "default_list_capacity")]
    pub list_capacity: usize,
    /// Maximum length of a list-mode parameter (default: 250).
    #[serde(default = "default_list_param_length")]
    pub list_param_length: usize,
    /// Maximum changes recorded by a single mode call (default: 20).
    /// Keeps the relayed mode line within protocol line length.
    #[serde(default = "default_max_mode_changes")]
    pub max_mode_changes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            list_capacity: default_list_capacity(),
            list_param_length: default_list_param_length(),
            max_mode_changes: default_max_mode_changes(),
        }
    }
}

fn default_list_capacity() -> usize {
    100
}

fn default_list_param_length() -> usize {
    250
}

fn default_max_mode_changes() -> usize {
    20
}
