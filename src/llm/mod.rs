//! LLM dispatch subsystem
//!
//! Forwards user messages to the external LLM service over a persistent
//! WebSocket connection (`client`), normalizes the wire contract (`types`),
//! and synthesizes canned responses when the service is unreachable
//! (`fallback`).

pub mod client;
pub mod fallback;
pub mod types;

pub use client::{backoff_delay, LlmClient, LlmHealth};
pub use fallback::fallback_response;
pub use types::{DispatchRequest, DispatchResponse, GenerationSettings};
