//! Persistence collaborator.
//!
//! Stores finished processing results and per-identity provider credentials.
//! The pipeline treats every operation here as fallible-but-absorbed: a store
//! failure never aborts an invocation that already produced a usable result.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::provider::{ProcessingOutcome, ProviderKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Usage accounting row derived from one processing run.
///
/// Built deterministically from the provider outcome and the cost calculator;
/// never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub service_type: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_brl: f64,
    pub audio_duration_seconds: f64,
}

/// Trait for result and credential storage.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a finished result for a caller identity.
    ///
    /// Returns the new video record id.
    async fn save_processing_result(
        &self,
        user_id: &str,
        source_url: &str,
        outcome: &ProcessingOutcome,
        usage: &UsageRecord,
    ) -> Result<String>;

    /// Look up the stored credential for (provider, identity).
    async fn get_api_key(&self, provider: ProviderKind, user_id: &str) -> Result<Option<String>>;

    /// Store or replace the credential for (provider, identity).
    async fn save_api_key(&self, provider: ProviderKind, key: &str, user_id: &str) -> Result<()>;
}
