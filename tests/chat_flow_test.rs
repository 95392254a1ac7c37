//! End-to-end test of the chat-send flow against a healthy mock LLM server
//!
//! The fallback path is covered by the handler's unit tests; this exercises
//! the genuine path: dispatch succeeds and the provider's response is
//! persisted with its real token count.

use axum::extract::State;
use axum::Json;
use chatbot_backend::api::chat::{send_chat_message, ChatSendRequest};
use chatbot_backend::config::LlmConfig;
use chatbot_backend::llm::LlmClient;
use chatbot_backend::state::AppState;
use chatbot_backend::store::ChatStore;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Mock LLM server that echoes the message back with a fixed token count
async fn spawn_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let payload: Value = serde_json::from_str(&text).unwrap_or_default();
                    let message = payload
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let reply = json!({
                        "response": format!("You said: {}", message),
                        "tokens_used": 33,
                        "model": "mock-model",
                        "finish_reason": "stop",
                    });
                    if ws.send(Message::text(reply.to_string())).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    format!("ws://{}/chat", addr)
}

async fn create_state(llm_url: &str) -> (AppState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let store = ChatStore::new(db_path.to_str().unwrap())
        .await
        .expect("Failed to create test database");
    let llm = LlmClient::new(LlmConfig {
        url: llm_url.to_string(),
        api_key: String::new(),
        model: "custom-model".to_string(),
        timeout_secs: 5,
        max_retries: 0,
        max_tokens: 4000,
        temperature: 0.7,
    });
    (AppState::new(store, llm), temp_dir)
}

#[tokio::test]
async fn test_chat_send_genuine_path() {
    let url = spawn_echo_server().await;
    let (state, _temp_dir) = create_state(&url).await;

    let request = ChatSendRequest {
        message: "hello backend".to_string(),
        user_email: Some("e2e@example.com".to_string()),
        user_name: Some("E2E".to_string()),
        session_id: None,
        title: Some("E2E Chat".to_string()),
        message_type: None,
        metadata: None,
    };

    let (status, Json(body)) = send_chat_message(State(state.clone()), Json(request))
        .await
        .unwrap();

    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert!(body.success);
    assert_eq!(
        body.data.message.response.as_deref(),
        Some("You said: hello backend")
    );
    assert_eq!(body.data.message.tokens_used, 33);
    // A genuine response, not a fallback
    assert_ne!(body.data.message.response.as_deref(), Some("fallback"));

    // Latency was measured and persisted
    let stored = state
        .store
        .get_message(body.data.message.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.tokens_used, 33);
    assert!(stored.response_time >= 0.0);

    // Session and history were updated
    let history = state
        .store
        .get_history(body.data.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history.message_count, 1);
    assert_eq!(history.message_preview.as_deref(), Some("hello backend"));
}

#[tokio::test]
async fn test_multi_turn_conversation_reuses_connection_and_session() {
    let url = spawn_echo_server().await;
    let (state, _temp_dir) = create_state(&url).await;

    let first = ChatSendRequest {
        message: "turn one".to_string(),
        user_email: Some("multi@example.com".to_string()),
        user_name: None,
        session_id: None,
        title: None,
        message_type: None,
        metadata: None,
    };
    let (_, Json(first_body)) = send_chat_message(State(state.clone()), Json(first))
        .await
        .unwrap();
    let session_id = first_body.data.session_id;

    let second = ChatSendRequest {
        message: "turn two".to_string(),
        user_email: Some("multi@example.com".to_string()),
        user_name: None,
        session_id: Some(session_id),
        title: None,
        message_type: None,
        metadata: None,
    };
    let (_, Json(second_body)) = send_chat_message(State(state.clone()), Json(second))
        .await
        .unwrap();

    assert_eq!(second_body.data.session_id, session_id);
    assert_eq!(second_body.data.user_id, first_body.data.user_id);
    assert_eq!(
        second_body.data.message.response.as_deref(),
        Some("You said: turn two")
    );

    // The dispatcher kept its connection open across turns
    assert!(state.llm.is_connected().await);

    let history = state.store.get_history(session_id).await.unwrap().unwrap();
    assert_eq!(history.message_count, 2);
}
