//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// LLM dispatch configuration
    pub llm: LlmConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite database URL or file path
    pub url: String,
}

/// Connection parameters for the external LLM WebSocket service
///
/// All values are fixed at process start; the dispatcher never re-reads the
/// environment.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// WebSocket endpoint of the LLM service
    pub url: String,
    /// Bearer credential; empty means no Authorization header is sent
    pub api_key: String,
    /// Model identifier sent with every payload
    pub model: String,
    /// Per-call budget for connecting and for awaiting a response (seconds)
    pub timeout_secs: u64,
    /// Number of retries after the initial attempt for transient failures
    pub max_retries: u32,
    /// Generation setting: maximum tokens per response
    pub max_tokens: u32,
    /// Generation setting: sampling temperature
    pub temperature: f32,
}

impl LlmConfig {
    /// Per-call timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(3001),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./chatbot.db".to_string()),
            },
            llm: LlmConfig {
                url: env::var("LLM_WEBSOCKET_URL")
                    .unwrap_or_else(|_| "ws://localhost:8080/chat".to_string()),
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                model: env::var("LLM_MODEL_NAME").unwrap_or_else(|_| "custom-model".to_string()),
                timeout_secs: env::var("LLM_TIMEOUT")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(30),
                max_retries: env::var("LLM_MAX_RETRIES")
                    .ok()
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(3),
                max_tokens: env::var("LLM_MAX_TOKENS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(4000),
                temperature: env::var("LLM_TEMPERATURE")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0.7),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
