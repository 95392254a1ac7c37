//! Chat database operations
//!
//! Handles all database interactions for users, sessions, messages,
//! the rolling history records and system settings.

use crate::error::AppError;
use crate::store::models::{now_ts, ChatHistory, ChatSession, StoredMessage, SystemSetting, User};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

/// Default system settings seeded on first startup: (key, value, description, category)
const DEFAULT_SETTINGS: [(&str, &str, &str, &str); 6] = [
    ("max_tokens", "4000", "Maximum tokens per response", "llm"),
    ("temperature", "0.7", "LLM temperature setting", "llm"),
    ("max_history_items", "100", "Maximum chat history items", "chat"),
    ("enable_history", "true", "Enable chat history", "chat"),
    (
        "history_retention_days",
        "30",
        "Days to retain chat history",
        "chat",
    ),
    (
        "enable_advanced_ai",
        "true",
        "Enable advanced AI mode for all clients",
        "llm",
    ),
];

/// Database connection pool for chat operations
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Initialize the database connection pool, run migrations and seed defaults
    ///
    /// # Arguments
    /// * `db_url` - SQLite URL (`sqlite:...`) or plain file path
    pub async fn new(db_url: &str) -> Result<Self, AppError> {
        let path = db_url.trim_start_matches("sqlite:");

        // Ensure parent directory exists for file-backed databases
        if path != ":memory:" {
            if let Some(parent) = PathBuf::from(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Database(format!("Failed to create db directory: {}", e))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))
            .map_err(|e| AppError::Database(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        info!("Connected to SQLite database at: {}", path);

        let store = Self { pool };
        store.run_migrations().await?;
        store.seed_default_settings().await?;

        Ok(store)
    }

    /// Run the embedded schema migration statement by statement
    async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_chat_schema.sql");

        // Strip comment lines, then split on semicolons
        let cleaned: String = migration_sql
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");

        for statement in cleaned.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Insert default settings that are not present yet
    async fn seed_default_settings(&self) -> Result<(), AppError> {
        let now = now_ts();
        for (key, value, description, category) in DEFAULT_SETTINGS {
            sqlx::query(
                "INSERT OR IGNORE INTO system_settings (key, value, description, category, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(key)
            .bind(value)
            .bind(description)
            .bind(category)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to seed setting {}: {}", key, e)))?;
        }
        Ok(())
    }

    /// Look up a user by email, creating one if none exists
    pub async fn get_or_create_user(&self, email: &str, name: &str) -> Result<User, AppError> {
        if let Some(user) = self.get_user_by_email(email).await? {
            return Ok(user);
        }

        let now = now_ts();
        sqlx::query("INSERT INTO users (name, email, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(name)
            .bind(email)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create user: {}", e)))?;

        debug!(email = %email, "Created user");

        self.get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::Database(format!("User vanished after insert: {}", email)))
    }

    /// Get a user by email
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, avatar_url, status, preferences, created_at, updated_at \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch user: {}", e)))
    }

    /// Get a session by id, scoped to its owning user
    pub async fn get_session(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<ChatSession>, AppError> {
        sqlx::query_as::<_, ChatSession>(
            "SELECT id, user_id, title, status, created_at, updated_at \
             FROM chat_sessions WHERE id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch session: {}", e)))
    }

    /// Create a new session along with its rolling history record
    pub async fn create_session(&self, user_id: i64, title: &str) -> Result<ChatSession, AppError> {
        let now = now_ts();
        let result = sqlx::query(
            "INSERT INTO chat_sessions (user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create session: {}", e)))?;

        let session_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO chat_history (user_id, session_id, message_preview, last_activity, message_count) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(user_id)
        .bind(session_id)
        .bind("New chat started")
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create history record: {}", e)))?;

        debug!(session_id, user_id, "Created session");

        self.get_session(session_id, user_id)
            .await?
            .ok_or_else(|| AppError::Database(format!("Session vanished after insert: {}", session_id)))
    }

    /// Update a session's last-activity timestamp
    pub async fn touch_session(&self, session_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
            .bind(now_ts())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to touch session: {}", e)))?;
        Ok(())
    }

    /// Persist an inbound user message; the response fields are filled in later
    pub async fn insert_message(
        &self,
        session_id: i64,
        user_id: i64,
        message: &str,
        message_type: &str,
        metadata_json: &str,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO messages (session_id, user_id, message, message_type, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(message)
        .bind(message_type)
        .bind(metadata_json)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert message: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    /// Fill in the response, token count and latency on a stored message
    pub async fn complete_message(
        &self,
        message_id: i64,
        response: &str,
        tokens_used: i64,
        response_time: f64,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE messages SET response = ?, tokens_used = ?, response_time = ? WHERE id = ?",
        )
        .bind(response)
        .bind(tokens_used)
        .bind(response_time)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to complete message: {}", e)))?;
        Ok(())
    }

    /// Get a message by id
    pub async fn get_message(&self, message_id: i64) -> Result<Option<StoredMessage>, AppError> {
        sqlx::query_as::<_, StoredMessage>(
            "SELECT id, session_id, user_id, message, response, message_type, metadata, \
             tokens_used, response_time, created_at FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch message: {}", e)))
    }

    /// Update the session's rolling history record: preview of the latest
    /// message, last-activity time, message count incremented by one
    pub async fn record_history_activity(
        &self,
        session_id: i64,
        preview: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE chat_history SET message_preview = ?, last_activity = ?, \
             message_count = message_count + 1 WHERE session_id = ?",
        )
        .bind(preview)
        .bind(now_ts())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update chat history: {}", e)))?;
        Ok(())
    }

    /// Get the rolling history record for a session
    pub async fn get_history(&self, session_id: i64) -> Result<Option<ChatHistory>, AppError> {
        sqlx::query_as::<_, ChatHistory>(
            "SELECT id, user_id, session_id, message_preview, last_activity, message_count \
             FROM chat_history WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch chat history: {}", e)))
    }

    /// Get a system setting by key
    pub async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>, AppError> {
        sqlx::query_as::<_, SystemSetting>(
            "SELECT id, key, value, description, category, updated_at \
             FROM system_settings WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch setting: {}", e)))
    }

    /// Read a boolean feature flag; a missing setting reads as false
    pub async fn bool_setting(&self, key: &str) -> Result<bool, AppError> {
        Ok(self
            .get_setting(key)
            .await?
            .map(|s| s.as_bool())
            .unwrap_or(false))
    }

    /// Cheap connectivity probe for the health endpoint
    pub async fn healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Get the database pool (for advanced operations if needed)
    #[allow(dead_code)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (ChatStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = ChatStore::new(db_path.to_str().unwrap())
            .await
            .expect("Failed to create test database");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_get_or_create_user_is_idempotent() {
        let (store, _temp_dir) = create_test_store().await;

        let first = store
            .get_or_create_user("alice@example.com", "Alice")
            .await
            .unwrap();
        let second = store
            .get_or_create_user("alice@example.com", "Someone Else")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Alice");
    }

    #[tokio::test]
    async fn test_create_session_creates_history_record() {
        let (store, _temp_dir) = create_test_store().await;
        let user = store
            .get_or_create_user("bob@example.com", "Bob")
            .await
            .unwrap();

        let session = store.create_session(user.id, "New Chat").await.unwrap();
        assert_eq!(session.user_id, user.id);
        assert_eq!(session.title, "New Chat");

        let history = store.get_history(session.id).await.unwrap().unwrap();
        assert_eq!(history.message_count, 0);
        assert_eq!(history.message_preview.as_deref(), Some("New chat started"));
    }

    #[tokio::test]
    async fn test_session_is_scoped_to_user() {
        let (store, _temp_dir) = create_test_store().await;
        let owner = store
            .get_or_create_user("owner@example.com", "Owner")
            .await
            .unwrap();
        let other = store
            .get_or_create_user("other@example.com", "Other")
            .await
            .unwrap();

        let session = store.create_session(owner.id, "Private").await.unwrap();

        assert!(store.get_session(session.id, owner.id).await.unwrap().is_some());
        assert!(store.get_session(session.id, other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_message_lifecycle() {
        let (store, _temp_dir) = create_test_store().await;
        let user = store
            .get_or_create_user("carol@example.com", "Carol")
            .await
            .unwrap();
        let session = store.create_session(user.id, "Chat").await.unwrap();

        let message_id = store
            .insert_message(session.id, user.id, "hello", "text", r#"{"sql_mode":false}"#)
            .await
            .unwrap();

        let stored = store.get_message(message_id).await.unwrap().unwrap();
        assert_eq!(stored.message, "hello");
        assert!(stored.response.is_none());
        assert_eq!(stored.tokens_used, 0);

        store
            .complete_message(message_id, "hi there", 42, 0.25)
            .await
            .unwrap();

        let completed = store.get_message(message_id).await.unwrap().unwrap();
        assert_eq!(completed.response.as_deref(), Some("hi there"));
        assert_eq!(completed.tokens_used, 42);
        assert!(completed.response_time > 0.0);
        // The inbound text never changes
        assert_eq!(completed.message, "hello");
    }

    #[tokio::test]
    async fn test_record_history_activity_increments_count() {
        let (store, _temp_dir) = create_test_store().await;
        let user = store
            .get_or_create_user("dave@example.com", "Dave")
            .await
            .unwrap();
        let session = store.create_session(user.id, "Chat").await.unwrap();

        store
            .record_history_activity(session.id, "first message")
            .await
            .unwrap();
        store
            .record_history_activity(session.id, "second message")
            .await
            .unwrap();

        let history = store.get_history(session.id).await.unwrap().unwrap();
        assert_eq!(history.message_count, 2);
        assert_eq!(history.message_preview.as_deref(), Some("second message"));
    }

    #[tokio::test]
    async fn test_default_settings_are_seeded() {
        let (store, _temp_dir) = create_test_store().await;

        assert!(store.bool_setting("enable_advanced_ai").await.unwrap());
        assert!(store.bool_setting("enable_history").await.unwrap());
        // Missing flags read as false
        assert!(!store.bool_setting("no_such_flag").await.unwrap());

        let setting = store.get_setting("max_tokens").await.unwrap().unwrap();
        assert_eq!(setting.value.as_deref(), Some("4000"));
        assert_eq!(setting.category, "llm");
    }

    #[tokio::test]
    async fn test_healthy_probe() {
        let (store, _temp_dir) = create_test_store().await;
        assert!(store.healthy().await);
    }
}
