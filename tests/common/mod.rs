//! Integration test common infrastructure.
//!
//! Builds whole servers in-process and wires their link channels together,
//! so tests can drive a small mesh without sockets.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{LINK_PASSWORD, TestNet, TestServer, config_for};
