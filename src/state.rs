//! Shared application state
//!
//! The store and the LLM client are constructed once in `main` and injected
//! into handlers through axum's `State` extractor. There is no process-wide
//! singleton; everything a handler needs travels through this struct.

use crate::llm::LlmClient;
use crate::store::ChatStore;
use std::sync::Arc;

/// State shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Relational store for users, sessions, messages and settings
    pub store: Arc<ChatStore>,
    /// Dispatcher for the external LLM service
    pub llm: Arc<LlmClient>,
}

impl AppState {
    /// Bundle the collaborators into a cloneable handler state
    pub fn new(store: ChatStore, llm: LlmClient) -> Self {
        Self {
            store: Arc::new(store),
            llm: Arc::new(llm),
        }
    }
}
