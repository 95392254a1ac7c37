//! Relational storage for users, sessions, messages and settings
//!
//! The chat-send flow consumes this module to read feature flags, persist
//! message/response pairs and keep session activity records current.

pub mod db;
pub mod models;

pub use db::ChatStore;
pub use models::{ChatHistory, ChatSession, StoredMessage, SystemSetting, User};
