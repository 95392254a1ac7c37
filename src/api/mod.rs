//! HTTP API handlers
//!
//! Route handlers for the chat-send flow and the health probes.

pub mod chat;
pub mod health;
