//! LLM WebSocket client
//!
//! Manages a persistent WebSocket connection to the external LLM service.
//! One exchange is a single JSON text frame out and a single JSON text frame
//! back on the same connection. Transient failures (connection loss, timeout)
//! are retried with exponential backoff; an explicit service error or a
//! malformed frame propagates immediately.

use crate::config::LlmConfig;
use crate::error::AppError;
use crate::llm::types::{DispatchRequest, DispatchResponse};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Backoff delay before retry `attempt` (0-based): 2^attempt seconds
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Health probe result for the LLM service
///
/// Failures are reported here as a status payload, never escalated.
#[derive(Debug, Clone, Serialize)]
pub struct LlmHealth {
    /// `"healthy"` or `"unhealthy"`
    pub status: String,
    /// Whether the probe exchange succeeded
    pub connected: bool,
    /// Configured WebSocket endpoint
    pub url: String,
    /// Configured model identifier
    pub model: String,
    /// Failure detail when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client for the external LLM WebSocket service
///
/// Holds one long-lived connection, lazily established on first use and
/// reused across calls. The handle is guarded by a mutex held for the whole
/// request/response exchange, so concurrent dispatches serialize instead of
/// racing on the shared channel. Constructed explicitly and injected through
/// application state; there is no process-wide instance.
pub struct LlmClient {
    config: LlmConfig,
    conn: Mutex<Option<WsStream>>,
}

impl LlmClient {
    /// Create a client with connection parameters fixed for the process lifetime
    pub fn new(config: LlmConfig) -> Self {
        info!(url = %config.url, model = %config.model, "LLM WebSocket client initialized");
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Connection parameters this client was built with
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Deliver one message to the LLM service and return the normalized response.
    ///
    /// Ensures a live connection, sends the payload, and awaits a single
    /// response within the configured timeout. On timeout or connection loss
    /// the attempt is retried up to `max_retries` times, sleeping
    /// `2^attempt` seconds and re-establishing the connection between
    /// attempts; the final failure propagates to the caller. A service error
    /// or malformed response is never retried.
    ///
    /// This method never produces a fallback response; that decision belongs
    /// to the caller.
    pub async fn dispatch(
        &self,
        message: &str,
        metadata: &Value,
    ) -> Result<DispatchResponse, AppError> {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            match self.dispatch_once(message, metadata).await {
                Ok(response) => {
                    debug!(
                        tokens_used = response.tokens_used,
                        finish_reason = %response.finish_reason,
                        "Received response from LLM"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_transient_dispatch() && attempt < max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "Dispatch attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempts = attempt + 1, error = %err, "Dispatch failed");
                    return Err(err);
                }
            }
        }
    }

    /// Check whether the LLM service is reachable.
    ///
    /// Issues a lightweight dispatch of a fixed probe message tagged with a
    /// health-check flag. The connection is kept open afterwards. A failure
    /// is reported in the returned payload rather than escalated, and never
    /// triggers the fallback path.
    pub async fn check_health(&self) -> LlmHealth {
        match self.dispatch("ping", &json!({"health_check": true})).await {
            Ok(_) => LlmHealth {
                status: "healthy".to_string(),
                connected: true,
                url: self.config.url.clone(),
                model: self.config.model.clone(),
                error: None,
            },
            Err(err) => {
                warn!(error = %err, "LLM health check failed");
                LlmHealth {
                    status: "unhealthy".to_string(),
                    connected: false,
                    url: self.config.url.clone(),
                    model: self.config.model.clone(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Close the connection if one is open
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(mut stream) = conn.take() {
            if let Err(e) = stream.close(None).await {
                debug!("Error closing LLM WebSocket: {}", e);
            }
            info!("Disconnected from LLM WebSocket service");
        }
    }

    /// Whether a connection handle is currently held
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// One attempt: ensure a live connection, send, await the response.
    ///
    /// Holds the connection lock for the full exchange. On a transient
    /// failure the handle is dropped so the next attempt starts from a fresh
    /// connection.
    async fn dispatch_once(
        &self,
        message: &str,
        metadata: &Value,
    ) -> Result<DispatchResponse, AppError> {
        let mut conn = self.conn.lock().await;

        // A failed establish counts as a dispatch failure, not a separate
        // error class.
        if conn.is_none() {
            debug!(url = %self.config.url, "Establishing LLM WebSocket connection");
            *conn = Some(self.connect().await?);
            info!(url = %self.config.url, "Connected to LLM WebSocket service");
        }
        let Some(stream) = conn.as_mut() else {
            return Err(AppError::LlmConnection(
                "Connection handle unavailable".to_string(),
            ));
        };

        let request = DispatchRequest::new(message, metadata, &self.config);
        let payload = serde_json::to_string(&request)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize payload: {}", e)))?;

        match self.exchange(stream, payload).await {
            Ok(raw) => DispatchResponse::from_wire(&raw, &self.config.model),
            Err(err) => {
                if err.is_transient_dispatch() {
                    *conn = None;
                }
                Err(err)
            }
        }
    }

    /// Send one payload frame and await one JSON text frame in reply
    async fn exchange(&self, stream: &mut WsStream, payload: String) -> Result<Value, AppError> {
        stream
            .send(Message::text(payload))
            .await
            .map_err(|e| AppError::LlmConnection(format!("Failed to send payload: {}", e)))?;

        debug!("Sent message to LLM, awaiting response");

        let raw_text = tokio::time::timeout(self.config.timeout(), read_text_frame(stream))
            .await
            .map_err(|_| {
                AppError::LlmTimeout(format!(
                    "No response within {}s",
                    self.config.timeout_secs
                ))
            })??;

        serde_json::from_str(&raw_text)
            .map_err(|e| AppError::LlmProtocol(format!("Response is not valid JSON: {}", e)))
    }

    /// Open a new WebSocket connection to the configured endpoint
    async fn connect(&self) -> Result<WsStream, AppError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::LlmConnection(format!("Invalid LLM WebSocket URL: {}", e)))?;

        request.headers_mut().insert(
            header::USER_AGENT,
            HeaderValue::from_static("Chatbot-Client/1.0"),
        );
        // Only attach Authorization when a credential is configured
        if !self.config.api_key.trim().is_empty() {
            let bearer = format!("Bearer {}", self.config.api_key);
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| AppError::LlmConnection(format!("Invalid API key header: {}", e)))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (stream, _) = tokio::time::timeout(self.config.timeout(), connect_async(request))
            .await
            .map_err(|_| {
                AppError::LlmConnection(format!(
                    "Connect timed out after {}s",
                    self.config.timeout_secs
                ))
            })?
            .map_err(|e| {
                AppError::LlmConnection(format!("Failed to connect to LLM WebSocket: {}", e))
            })?;

        Ok(stream)
    }
}

/// Read frames until a text frame arrives, answering pings along the way.
///
/// A close frame or stream end counts as connection loss.
async fn read_text_frame(stream: &mut WsStream) -> Result<String, AppError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
            Some(Ok(Message::Ping(data))) => {
                let _ = stream.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) => {
                return Err(AppError::LlmConnection(
                    "Connection closed while awaiting response".to_string(),
                ));
            }
            Some(Ok(_)) => {
                // Binary and pong frames are not part of the exchange
            }
            Some(Err(e)) => {
                return Err(AppError::LlmConnection(format!(
                    "WebSocket read error: {}",
                    e
                )));
            }
            None => {
                return Err(AppError::LlmConnection(
                    "Connection lost while awaiting response".to_string(),
                ));
            }
        }
    }
}
