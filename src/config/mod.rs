//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, ModulesConfig, StorageConfig)
//! - [`limits`]: Mode engine limits (LimitsConfig)
//! - [`links`]: Server-to-server link configuration (LinkBlock)
//! - [`validation`]: Startup validation collecting every problem at once

mod limits;
mod links;
mod types;
pub mod validation;

pub use limits::LimitsConfig;
pub use links::LinkBlock;
pub use types::{Config, ConfigError, ModulesConfig, ServerConfig, StorageConfig};
pub use validation::{ValidationError, validate};
