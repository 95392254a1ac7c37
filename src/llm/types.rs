//! LLM wire contract
//!
//! Defines the payload sent to the LLM WebSocket service and the normalized
//! response returned to callers. The fallback generator produces the same
//! response type, so callers never distinguish a genuine completion from a
//! canned one.

use crate::config::LlmConfig;
use crate::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generation settings included with every dispatch payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Maximum tokens the service may generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Streaming is disabled; one request yields one response frame
    pub stream: bool,
}

/// Payload for one request/response exchange with the LLM service
///
/// Ephemeral: constructed per call, serialized to a single text frame,
/// never persisted.
#[derive(Debug, Serialize)]
pub struct DispatchRequest<'a> {
    /// User message text
    pub message: &'a str,
    /// Model identifier from configuration
    pub model: &'a str,
    /// ISO-8601 timestamp of the dispatch
    pub timestamp: String,
    /// Request context (session id, feature flags such as sql_mode)
    pub metadata: &'a Value,
    /// Generation settings
    pub settings: GenerationSettings,
}

impl<'a> DispatchRequest<'a> {
    /// Build a payload for `message` with the given request context
    pub fn new(message: &'a str, metadata: &'a Value, config: &'a LlmConfig) -> Self {
        Self {
            message,
            model: &config.model,
            timestamp: Utc::now().to_rfc3339(),
            metadata,
            settings: GenerationSettings {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                stream: false,
            },
        }
    }
}

/// Normalized response from a dispatch, genuine or fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    /// Response text
    pub content: String,
    /// Tokens consumed producing the response
    pub tokens_used: u32,
    /// Model that produced the response (`"fallback"` for canned responses)
    pub model: String,
    /// Why generation stopped (`"fallback_used"` marks a canned response)
    pub finish_reason: String,
    /// Provider-reported metadata
    pub metadata: Value,
}

impl DispatchResponse {
    /// Normalize a raw service response.
    ///
    /// An explicit `error` field raises a service error. Otherwise field
    /// lookup is best-effort: content is read from `response` or `content`,
    /// the token count from `tokens_used` or `usage.total_tokens`, and
    /// missing optional fields fall back to defaults rather than failing.
    pub fn from_wire(raw: &Value, default_model: &str) -> Result<Self, AppError> {
        if let Some(error) = raw.get("error") {
            let detail = match error.as_str() {
                Some(text) => text.to_string(),
                None => error.to_string(),
            };
            return Err(AppError::LlmService(detail));
        }

        let content = raw
            .get("response")
            .or_else(|| raw.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let tokens_used = raw
            .get("tokens_used")
            .or_else(|| raw.pointer("/usage/total_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;

        let model = raw
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(default_model)
            .to_string();

        let finish_reason = raw
            .get("finish_reason")
            .and_then(Value::as_str)
            .unwrap_or("completed")
            .to_string();

        let metadata = raw
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        Ok(Self {
            content,
            tokens_used,
            model,
            finish_reason,
            metadata,
        })
    }
}
