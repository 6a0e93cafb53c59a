//! State management module.
//!
//! Contains the Matrix (the server context) and the entities it owns.

pub mod channel;
mod matrix;
pub mod metadata;
pub mod modes;
pub mod reply;
pub mod storage;
mod uid;
pub mod user;

pub use channel::{Channel, Topic};
pub use matrix::{Matrix, ServerInfo, now};
pub use metadata::{METADATA_NAMESPACES, Metadata};
pub use modes::{ListEntry, ModeStore};
pub use reply::ClientReply;
pub use storage::{JsonFileStorage, MemoryStorage, Storage};
pub use uid::UidGenerator;
pub use user::User;
