//! Fallback response generation
//!
//! Produces a canned `DispatchResponse` without network access when dispatch
//! to the LLM service fails or is bypassed. Callers receive the same response
//! shape as a genuine completion; the `finish_reason` and `model` fields mark
//! it as a fallback.

use crate::llm::DispatchResponse;
use rand::Rng;
use serde_json::{json, Value};

/// Token count reported by every fallback response
pub const FALLBACK_TOKENS: u32 = 50;

/// Finish reason marking a response as a fallback
pub const FALLBACK_FINISH_REASON: &str = "fallback_used";

/// Sentinel model identifier for fallback responses
pub const FALLBACK_MODEL: &str = "fallback";

/// Canned responses when `sql_mode` is active
pub const SQL_RESPONSES: [&str; 3] = [
    "I'm currently unable to connect to the advanced SQL analysis service. Please check your database connection.",
    "SQL mode is active, but I'm having trouble connecting to the database service. Please try again.",
    "I can help with SQL queries, but I'm experiencing connectivity issues right now.",
];

/// Canned responses for general chat
pub const GENERAL_RESPONSES: [&str; 3] = [
    "I'm currently experiencing connectivity issues with the AI service. Please try again in a moment.",
    "I'm temporarily unable to connect to my language model. Please check back soon.",
    "There seems to be a temporary issue with the AI service. Your message has been received.",
];

/// Generate a fallback response for `message`.
///
/// Selects uniformly at random from the SQL-specific canned set when the
/// metadata carries `sql_mode: true`, otherwise from the general set. The
/// message itself does not influence the choice.
pub fn fallback_response(_message: &str, metadata: &Value) -> DispatchResponse {
    let sql_mode = metadata
        .get("sql_mode")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let responses: &[&str] = if sql_mode {
        &SQL_RESPONSES
    } else {
        &GENERAL_RESPONSES
    };

    let mut rng = rand::rng();
    let content = responses[rng.random_range(0..responses.len())];

    DispatchResponse {
        content: content.to_string(),
        tokens_used: FALLBACK_TOKENS,
        model: FALLBACK_MODEL.to_string(),
        finish_reason: FALLBACK_FINISH_REASON.to_string(),
        metadata: json!({"fallback": true}),
    }
}
