//! Server-to-server link configuration.

use serde::Deserialize;

/// Link block configuration for server-to-server connections.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// Remote server name (e.g., "hub.example.net").
    pub name: String,
    /// Expected source address of inbound connections. Unchecked when absent.
    pub address: Option<String>,
    /// Secret the remote must present when it introduces itself.
    #[serde(default)]
    pub incoming_password: String,
    /// Secret we present when we introduce ourselves.
    #[serde(default)]
    pub outgoing_password: String,
}
