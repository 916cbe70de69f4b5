//! SQLite-backed result store.

use super::{ResultStore, UsageRecord};
use crate::error::Result;
use crate::provider::{ProcessingOutcome, ProviderKind};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    original_url TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_videos_user_id ON videos(user_id);

CREATE TABLE IF NOT EXISTS transcriptions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    video_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS summaries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    video_id TEXT NOT NULL,
    content TEXT NOT NULL,
    key_topics TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS usage_logs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    video_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    service_type TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    total_tokens INTEGER NOT NULL,
    cost_brl REAL NOT NULL,
    audio_duration_seconds REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    user_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    key_value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, provider)
);
"#;

/// SQLite-based result store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at a path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized result store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn save_processing_result(
        &self,
        user_id: &str,
        source_url: &str,
        outcome: &ProcessingOutcome,
        usage: &UsageRecord,
    ) -> Result<String> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let video_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO videos (id, user_id, original_url, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![video_id, user_id, source_url, now],
        )?;

        conn.execute(
            "INSERT INTO transcriptions (id, user_id, video_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                video_id,
                outcome.transcription,
                now
            ],
        )?;

        conn.execute(
            "INSERT INTO summaries (id, user_id, video_id, content, key_topics, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                video_id,
                outcome.summary,
                serde_json::to_string(&outcome.key_topics)?,
                now
            ],
        )?;

        conn.execute(
            "INSERT INTO usage_logs (id, user_id, video_id, provider, model, service_type,
                 input_tokens, output_tokens, total_tokens, cost_brl, audio_duration_seconds,
                 created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                video_id,
                usage.provider,
                usage.model,
                usage.service_type,
                usage.input_tokens,
                usage.output_tokens,
                usage.total_tokens,
                usage.cost_brl,
                usage.audio_duration_seconds,
                now
            ],
        )?;

        debug!("Saved processing result as video {}", video_id);
        Ok(video_id)
    }

    async fn get_api_key(&self, provider: ProviderKind, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let key = conn
            .query_row(
                "SELECT key_value FROM api_keys WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(key)
    }

    async fn save_api_key(&self, provider: ProviderKind, key: &str, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        conn.execute(
            "INSERT INTO api_keys (user_id, provider, key_value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                 key_value = excluded.key_value,
                 updated_at = excluded.updated_at",
            params![
                user_id,
                provider.to_string(),
                key,
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokenUsage;

    fn sample_outcome() -> ProcessingOutcome {
        ProcessingOutcome {
            transcription: "ola mundo".to_string(),
            summary: "resumo executivo".to_string(),
            key_topics: vec!["saudacao".to_string()],
            duration_seconds: 20.0,
            usage: TokenUsage::new(100, 50),
        }
    }

    fn sample_usage() -> UsageRecord {
        UsageRecord {
            provider: "openai".to_string(),
            model: "gpt-5-mini".to_string(),
            service_type: "transcription_and_summary".to_string(),
            input_tokens: 100,
            output_tokens: 50,
            total_tokens: 150,
            cost_brl: 0.05,
            audio_duration_seconds: 20.0,
        }
    }

    #[tokio::test]
    async fn test_save_result_creates_all_rows() {
        let store = SqliteStore::in_memory().unwrap();
        let video_id = store
            .save_processing_result("user-1", "https://youtu.be/dQw4w9WgXcQ", &sample_outcome(), &sample_usage())
            .await
            .unwrap();

        let conn = store.conn.lock().unwrap();
        for table in ["videos", "transcriptions", "summaries", "usage_logs"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 1, "expected one row in {}", table);
        }

        let stored_video: String = conn
            .query_row("SELECT video_id FROM usage_logs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored_video, video_id);
    }

    #[tokio::test]
    async fn test_api_key_roundtrip_and_upsert() {
        let store = SqliteStore::in_memory().unwrap();

        assert!(store
            .get_api_key(ProviderKind::Gemini, "user-1")
            .await
            .unwrap()
            .is_none());

        store
            .save_api_key(ProviderKind::Gemini, "first-key", "user-1")
            .await
            .unwrap();
        store
            .save_api_key(ProviderKind::Gemini, "second-key", "user-1")
            .await
            .unwrap();

        let key = store
            .get_api_key(ProviderKind::Gemini, "user-1")
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("second-key"));

        // Keys are scoped per provider and identity.
        assert!(store
            .get_api_key(ProviderKind::OpenAi, "user-1")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_api_key(ProviderKind::Gemini, "user-2")
            .await
            .unwrap()
            .is_none());
    }
}
