//! meshircd - modular multi-server IRC daemon core.
//!
//! The [`state::Matrix`] owns every table; [`modules`] extend it through
//! action dispatch, [`modes`] applies mode strings under permission votes,
//! and [`sync`] keeps a spanning tree of linked servers consistent.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod modes;
pub mod modules;
pub mod state;
pub mod sync;
pub mod telemetry;
