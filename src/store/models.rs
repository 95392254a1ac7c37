//! Chat data models
//!
//! Defines structures for users, chat sessions, messages, the rolling
//! per-session history record, and system settings.

use chrono::Utc;
use serde_json::Value;
use sqlx::FromRow;

/// A chat user
#[derive(Debug, Clone, FromRow)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address (unique)
    pub email: String,
    /// Optional avatar URL
    pub avatar_url: Option<String>,
    /// Account status ("active" by default)
    pub status: String,
    /// User preferences as a JSON string
    pub preferences: String,
    /// When the user was created (Unix timestamp)
    pub created_at: i64,
    /// When the user was last updated (Unix timestamp)
    pub updated_at: i64,
}

/// A chat session grouping messages of one conversation thread
#[derive(Debug, Clone, FromRow)]
pub struct ChatSession {
    /// Unique identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Session title
    pub title: String,
    /// Session status ("active" by default)
    pub status: String,
    /// When the session was created (Unix timestamp)
    pub created_at: i64,
    /// When the session last saw activity (Unix timestamp)
    pub updated_at: i64,
}

/// A stored message/response pair
///
/// Immutable once persisted except for the response, token count and latency
/// fields, which are filled in after dispatch.
#[derive(Debug, Clone, FromRow)]
pub struct StoredMessage {
    /// Unique identifier
    pub id: i64,
    /// Session this message belongs to
    pub session_id: i64,
    /// User who sent the message
    pub user_id: i64,
    /// User message text
    pub message: String,
    /// Generated response, filled in after dispatch
    pub response: Option<String>,
    /// Message type ("text" by default)
    pub message_type: String,
    /// Request metadata as a JSON string
    pub metadata: String,
    /// Tokens consumed producing the response
    pub tokens_used: i64,
    /// Dispatch latency in seconds
    pub response_time: f64,
    /// When the message was created (Unix timestamp)
    pub created_at: i64,
}

impl StoredMessage {
    /// Metadata parsed back into a JSON value
    pub fn metadata_value(&self) -> Value {
        serde_json::from_str(&self.metadata).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

/// Rolling per-session history record: latest preview, last activity
/// and a running message count.
#[derive(Debug, Clone, FromRow)]
pub struct ChatHistory {
    /// Unique identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Session this record tracks
    pub session_id: i64,
    /// Preview of the most recent message
    pub message_preview: Option<String>,
    /// When the session last saw a message (Unix timestamp)
    pub last_activity: i64,
    /// Number of messages sent in the session
    pub message_count: i64,
}

/// A system configuration setting
#[derive(Debug, Clone, FromRow)]
pub struct SystemSetting {
    /// Unique identifier
    pub id: i64,
    /// Setting key (unique)
    pub key: String,
    /// Setting value, stored as text
    pub value: Option<String>,
    /// Human-readable description
    pub description: Option<String>,
    /// Setting category ("general" by default)
    pub category: String,
    /// When the setting was last updated (Unix timestamp)
    pub updated_at: i64,
}

impl SystemSetting {
    /// Interpret the value as a boolean flag (`"true"`, case-insensitive)
    pub fn as_bool(&self) -> bool {
        self.value
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// Current time as a Unix timestamp
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_as_bool() {
        let mut setting = SystemSetting {
            id: 1,
            key: "enable_advanced_ai".to_string(),
            value: Some("true".to_string()),
            description: None,
            category: "llm".to_string(),
            updated_at: 0,
        };
        assert!(setting.as_bool());

        setting.value = Some("TRUE".to_string());
        assert!(setting.as_bool());

        setting.value = Some("false".to_string());
        assert!(!setting.as_bool());

        setting.value = None;
        assert!(!setting.as_bool());
    }

    #[test]
    fn test_message_metadata_value() {
        let message = StoredMessage {
            id: 1,
            session_id: 1,
            user_id: 1,
            message: "hi".to_string(),
            response: None,
            message_type: "text".to_string(),
            metadata: r#"{"sql_mode":true}"#.to_string(),
            tokens_used: 0,
            response_time: 0.0,
            created_at: 0,
        };
        assert_eq!(message.metadata_value()["sql_mode"], true);

        let broken = StoredMessage {
            metadata: "not json".to_string(),
            ..message
        };
        assert!(broken.metadata_value().is_object());
    }
}
