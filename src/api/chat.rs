//! Chat API endpoints
//!
//! Handles the chat-send flow: persist the inbound message, dispatch it to
//! the LLM service, fall back to a canned response when dispatch fails, and
//! record the outcome. A dispatch failure is never surfaced to the caller —
//! the user always receives *some* response.

use crate::error::AppError;
use crate::llm::fallback_response;
use crate::state::AppState;
use crate::store::StoredMessage;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

/// Longest message prefix kept in the rolling history preview
const PREVIEW_CHARS: usize = 100;

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatSendRequest {
    /// Message content
    pub message: String,
    /// Sender email; a user record is created on first sight
    #[serde(default)]
    pub user_email: Option<String>,
    /// Sender display name, used when creating the user record
    #[serde(default)]
    pub user_name: Option<String>,
    /// Existing session to continue; a new session is created when absent
    /// or not owned by the sender
    #[serde(default)]
    pub session_id: Option<i64>,
    /// Title for a newly created session
    #[serde(default)]
    pub title: Option<String>,
    /// Message type (defaults to "text")
    #[serde(default)]
    pub message_type: Option<String>,
    /// Request context forwarded to dispatch (e.g. sql_mode)
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A stored message as returned by the API
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Message unique identifier
    pub id: i64,
    /// Session the message belongs to
    pub session_id: i64,
    /// User who sent the message
    pub user_id: i64,
    /// User message text
    pub message: String,
    /// Generated (or fallback) response text
    pub response: Option<String>,
    /// Message type
    pub message_type: String,
    /// Request metadata
    pub metadata: Value,
    /// Tokens consumed producing the response
    pub tokens_used: i64,
    /// Dispatch latency in seconds
    pub response_time: f64,
    /// Unix timestamp when the message was created
    pub created_at: i64,
}

impl From<StoredMessage> for MessageResponse {
    fn from(stored: StoredMessage) -> Self {
        let metadata = stored.metadata_value();
        Self {
            id: stored.id,
            session_id: stored.session_id,
            user_id: stored.user_id,
            message: stored.message,
            response: stored.response,
            message_type: stored.message_type,
            metadata,
            tokens_used: stored.tokens_used,
            response_time: stored.response_time,
            created_at: stored.created_at,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Serialize)]
pub struct ChatSendData {
    pub message: MessageResponse,
    pub session_id: i64,
    pub user_id: i64,
    pub advanced_ai_enabled: bool,
}

/// Chat-send response envelope
#[derive(Debug, Serialize)]
pub struct ChatSendResponse {
    /// Always true; errors use the `AppError` JSON shape
    pub success: bool,
    /// Result payload
    pub data: ChatSendData,
}

/// Truncate message content for the rolling history preview
fn message_preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let truncated: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

/// POST /api/chat/send - Send a message and receive a response
///
/// Flow:
/// 1. Validate the message and get-or-create the user and session.
/// 2. Persist the inbound message.
/// 3. Read the advanced-AI flag and compose the dispatch metadata.
/// 4. Dispatch to the LLM service; on any dispatch error take the local
///    fallback response instead.
/// 5. Fill in response/tokens/latency on the stored message and update the
///    session's activity records.
pub async fn send_chat_message(
    State(state): State<AppState>,
    Json(request): Json<ChatSendRequest>,
) -> Result<(StatusCode, Json<ChatSendResponse>), AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::InvalidRequest("Message is required".to_string()));
    }

    let user_email = request
        .user_email
        .unwrap_or_else(|| "default@example.com".to_string());
    let user_name = request
        .user_name
        .unwrap_or_else(|| "Anonymous User".to_string());
    let user = state.store.get_or_create_user(&user_email, &user_name).await?;

    // A provided session id must belong to the sender; otherwise start fresh
    let existing = match request.session_id {
        Some(id) => state.store.get_session(id, user.id).await?,
        None => None,
    };
    let session = match existing {
        Some(session) => session,
        None => {
            let title = request.title.as_deref().unwrap_or("New Chat");
            state.store.create_session(user.id, title).await?
        }
    };

    let start = Instant::now();

    let message_type = request.message_type.unwrap_or_else(|| "text".to_string());
    let request_metadata = match request.metadata {
        Some(value) if value.is_object() => value,
        _ => json!({}),
    };
    let message_id = state
        .store
        .insert_message(
            session.id,
            user.id,
            &request.message,
            &message_type,
            &request_metadata.to_string(),
        )
        .await?;

    let advanced_ai_enabled = state.store.bool_setting("enable_advanced_ai").await?;

    let mut dispatch_metadata = request_metadata;
    if let Some(map) = dispatch_metadata.as_object_mut() {
        map.insert("session_id".to_string(), json!(session.id));
        if advanced_ai_enabled {
            map.insert("advanced_mode".to_string(), json!(true));
        }
    }

    let response = match state.llm.dispatch(&request.message, &dispatch_metadata).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                session_id = session.id,
                error = %err,
                "Dispatch failed, using fallback response"
            );
            fallback_response(&request.message, &dispatch_metadata)
        }
    };
    let response_time = start.elapsed().as_secs_f64();

    state
        .store
        .complete_message(
            message_id,
            &response.content,
            response.tokens_used as i64,
            response_time,
        )
        .await?;
    state.store.touch_session(session.id).await?;
    state
        .store
        .record_history_activity(session.id, &message_preview(&request.message))
        .await?;

    let stored = state
        .store
        .get_message(message_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message not found: {}", message_id)))?;

    info!(
        session_id = session.id,
        user_id = user.id,
        tokens_used = response.tokens_used,
        model = %response.model,
        "Chat message processed"
    );

    Ok((
        StatusCode::CREATED,
        Json(ChatSendResponse {
            success: true,
            data: ChatSendData {
                message: stored.into(),
                session_id: session.id,
                user_id: user.id,
                advanced_ai_enabled,
            },
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm::fallback::{FALLBACK_TOKENS, GENERAL_RESPONSES, SQL_RESPONSES};
    use crate::llm::LlmClient;
    use crate::store::ChatStore;
    use tempfile::TempDir;

    /// State wired to a tempfile database and an unreachable LLM endpoint,
    /// so every dispatch takes the fallback path quickly.
    async fn create_test_state() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = ChatStore::new(db_path.to_str().unwrap())
            .await
            .expect("Failed to create test database");
        let llm = LlmClient::new(LlmConfig {
            url: "ws://127.0.0.1:1/chat".to_string(),
            api_key: String::new(),
            model: "custom-model".to_string(),
            timeout_secs: 1,
            max_retries: 0,
            max_tokens: 4000,
            temperature: 0.7,
        });
        (AppState::new(store, llm), temp_dir)
    }

    fn request(message: &str) -> ChatSendRequest {
        ChatSendRequest {
            message: message.to_string(),
            user_email: None,
            user_name: None,
            session_id: None,
            title: None,
            message_type: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let (state, _temp_dir) = create_test_state().await;
        let result = send_chat_message(State(state), Json(request("   "))).await;
        match result {
            Err(AppError::InvalidRequest(_)) => {}
            other => panic!("Expected InvalidRequest, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_send_falls_back_when_service_unreachable() {
        let (state, _temp_dir) = create_test_state().await;
        let result = send_chat_message(State(state.clone()), Json(request("hello there")))
            .await
            .unwrap();

        assert_eq!(result.0, StatusCode::CREATED);
        let data = result.1 .0.data;
        assert!(data.advanced_ai_enabled);

        let response_text = data.message.response.expect("response should be filled in");
        assert!(GENERAL_RESPONSES.contains(&response_text.as_str()));
        assert_eq!(data.message.tokens_used, i64::from(FALLBACK_TOKENS));
        assert_eq!(data.message.message, "hello there");

        // The pair is persisted
        let stored = state
            .store
            .get_message(data.message.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.response.as_deref(), Some(response_text.as_str()));
    }

    #[tokio::test]
    async fn test_sql_mode_selects_sql_fallback_set() {
        let (state, _temp_dir) = create_test_state().await;
        let mut req = request("SELECT * FROM users");
        req.metadata = Some(json!({"sql_mode": true}));

        let result = send_chat_message(State(state), Json(req)).await.unwrap();
        let response_text = result.1 .0.data.message.response.unwrap();
        assert!(
            SQL_RESPONSES.contains(&response_text.as_str()),
            "Unexpected fallback content: {}",
            response_text
        );
    }

    #[tokio::test]
    async fn test_session_reuse_and_history_tracking() {
        let (state, _temp_dir) = create_test_state().await;

        let first = send_chat_message(State(state.clone()), Json(request("first")))
            .await
            .unwrap();
        let session_id = first.1 .0.data.session_id;

        let mut followup = request("second");
        followup.session_id = Some(session_id);
        let second = send_chat_message(State(state.clone()), Json(followup))
            .await
            .unwrap();
        assert_eq!(second.1 .0.data.session_id, session_id);

        let history = state.store.get_history(session_id).await.unwrap().unwrap();
        assert_eq!(history.message_count, 2);
        assert_eq!(history.message_preview.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_unknown_session_id_starts_a_new_session() {
        let (state, _temp_dir) = create_test_state().await;
        let mut req = request("hello");
        req.session_id = Some(9999);

        let result = send_chat_message(State(state), Json(req)).await.unwrap();
        assert_ne!(result.1 .0.data.session_id, 9999);
    }

    #[test]
    fn test_message_preview_truncation() {
        let short = "hello";
        assert_eq!(message_preview(short), "hello");

        let long = "x".repeat(150);
        let preview = message_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
    }
}
