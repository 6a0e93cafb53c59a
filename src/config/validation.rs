//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use meshirc_proto::{ServerId, ServerName};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is invalid: {0}")]
    InvalidServerName(meshirc_proto::NameError),
    #[error("server.sid is invalid: {0}")]
    InvalidSid(meshirc_proto::IdError),
    #[error("limits.{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("link block name is invalid: {0}")]
    InvalidLinkName(String),
    #[error("duplicate link block for {0}")]
    DuplicateLink(String),
    #[error("link block for {0} names this server")]
    SelfLink(String),
    #[error("storage.path parent directory does not exist: {0}")]
    StoragePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = ServerName::parse(&config.server.name) {
        errors.push(ValidationError::InvalidServerName(e));
    }
    if let Err(e) = ServerId::parse(&config.server.sid) {
        errors.push(ValidationError::InvalidSid(e));
    }

    let limits = &config.limits;
    if limits.list_capacity == 0 {
        errors.push(ValidationError::ZeroLimit("list_capacity"));
    }
    if limits.list_param_length == 0 {
        errors.push(ValidationError::ZeroLimit("list_param_length"));
    }
    if limits.max_mode_changes == 0 {
        errors.push(ValidationError::ZeroLimit("max_mode_changes"));
    }

    let mut seen = HashSet::new();
    for link in &config.links {
        if ServerName::parse(&link.name).is_err() {
            errors.push(ValidationError::InvalidLinkName(link.name.clone()));
        }
        if link.name == config.server.name {
            errors.push(ValidationError::SelfLink(link.name.clone()));
        }
        if !seen.insert(link.name.as_str()) {
            errors.push(ValidationError::DuplicateLink(link.name.clone()));
        }
    }

    if let Some(ref path) = config.storage.path {
        let path = Path::new(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::StoragePathInvalid(
                path.display().to_string(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, sid: &str) -> Config {
        Config::parse(&format!(
            "[server]\nname = \"{name}\"\nsid = \"{sid}\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn valid_minimal_config() {
        assert!(validate(&config("irc.example.net", "1AA")).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut cfg = config("localhost", "AAA");
        cfg.limits.max_mode_changes = 0;
        let errors = validate(&cfg).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::InvalidServerName(_)));
        assert!(matches!(errors[1], ValidationError::InvalidSid(_)));
        assert!(matches!(errors[2], ValidationError::ZeroLimit("max_mode_changes")));
    }

    #[test]
    fn rejects_duplicate_and_self_links() {
        let cfg = Config::parse(
            r#"
[server]
name = "irc.example.net"
sid = "1AA"

[[links]]
name = "hub.example.net"

[[links]]
name = "hub.example.net"

[[links]]
name = "irc.example.net"
"#,
        )
        .unwrap();
        let errors = validate(&cfg).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateLink(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::SelfLink(_))));
    }
}
