//! Transcription provider abstraction.
//!
//! Two provider variants share one contract: turn a local audio file into
//! transcript text, an executive summary, key topics, usage counters and the
//! audio duration. Heterogeneous upstream response shapes are normalized into
//! [`ProcessingOutcome`] here.

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::config::Settings;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Supported provider variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Cloud multimodal model: one call with inline audio.
    Gemini,
    /// Speech model for the transcript, chat model for the summary.
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl ProviderKind {
    /// User-facing message when no credential is available for this provider.
    ///
    /// The application ships in Portuguese; these strings are shown verbatim
    /// in the settings UI.
    pub fn missing_credential_message(&self) -> String {
        match self {
            ProviderKind::Gemini => {
                "API Key do Gemini não encontrada. Por favor, configure nos ajustes.".to_string()
            }
            ProviderKind::OpenAi => {
                "API Key da OpenAI não encontrada. Por favor, configure nos ajustes.".to_string()
            }
        }
    }
}

/// Normalized token usage counters.
///
/// Upstream providers report usage under different field names; both variants
/// fold their counters into this shape. Invariant: `total_tokens` equals
/// `prompt_tokens + completion_tokens` whenever the individual counters are
/// known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(rename = "promptTokenCount")]
    pub prompt_tokens: u32,
    #[serde(rename = "candidatesTokenCount")]
    pub completion_tokens: u32,
    #[serde(rename = "totalTokenCount")]
    pub total_tokens: u32,
    #[serde(rename = "cachedTokenCount", skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
}

impl TokenUsage {
    /// Build from individual counters; the total is derived.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cached_tokens: None,
        }
    }

    /// Build from a total-only report.
    ///
    /// When only a total is available the derived counters default to a
    /// total/0 split so the total is preserved.
    pub fn from_total(total_tokens: u32) -> Self {
        Self {
            prompt_tokens: total_tokens,
            completion_tokens: 0,
            total_tokens,
            cached_tokens: None,
        }
    }

    /// Attach a cached-token counter.
    pub fn with_cached(mut self, cached: u32) -> Self {
        self.cached_tokens = Some(cached);
        self
    }

    /// Zero usage, for providers that report nothing.
    pub fn empty() -> Self {
        Self::new(0, 0)
    }
}

/// The result contract every provider variant normalizes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    /// Full transcript text.
    pub transcription: String,
    /// Executive summary.
    pub summary: String,
    /// Key topics, in the order the model produced them.
    #[serde(default)]
    pub key_topics: Vec<String>,
    /// Audio duration in seconds; 0 when the provider cannot report it.
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    /// Normalized token counters.
    pub usage: TokenUsage,
}

/// Trait for transcription/summarization providers.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe and summarize one audio file.
    async fn transcribe(&self, audio_path: &Path, api_key: &str) -> Result<ProcessingOutcome>;

    /// Which provider variant this is.
    fn kind(&self) -> ProviderKind;

    /// Model identifier used for usage accounting.
    fn billing_model(&self) -> &str;
}

/// Factory seam for selecting a provider per request.
///
/// The pipeline asks the selector for a provider by kind; tests substitute
/// their own selector to inject mocks.
pub trait ProviderSelector: Send + Sync {
    fn provider_for(&self, kind: ProviderKind) -> Arc<dyn TranscriptionProvider>;
}

/// Default selector building real providers from settings.
pub struct ConfiguredProviders {
    gemini: Arc<GeminiProvider>,
    openai: Arc<OpenAiProvider>,
}

impl ConfiguredProviders {
    pub fn new(settings: &Settings) -> Self {
        Self {
            gemini: Arc::new(GeminiProvider::new(&settings.providers.gemini_model)),
            openai: Arc::new(OpenAiProvider::new(
                &settings.providers.speech_model,
                &settings.providers.chat_model,
                settings.providers.transcript_char_budget,
            )),
        }
    }
}

impl ProviderSelector for ConfiguredProviders {
    fn provider_for(&self, kind: ProviderKind) -> Arc<dyn TranscriptionProvider> {
        match kind {
            ProviderKind::Gemini => self.gemini.clone(),
            ProviderKind::OpenAi => self.openai.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total_invariant() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(
            usage.prompt_tokens + usage.completion_tokens,
            usage.total_tokens
        );
    }

    #[test]
    fn test_total_only_split_preserves_total() {
        let usage = TokenUsage::from_total(1234);
        assert_eq!(usage.total_tokens, 1234);
        assert_eq!(usage.prompt_tokens + usage.completion_tokens, 1234);
        assert_eq!(usage.completion_tokens, 0);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_usage_wire_names_match_client_contract() {
        let value = serde_json::to_value(TokenUsage::new(10, 5).with_cached(2)).unwrap();
        assert_eq!(value["promptTokenCount"], 10);
        assert_eq!(value["candidatesTokenCount"], 5);
        assert_eq!(value["totalTokenCount"], 15);
        assert_eq!(value["cachedTokenCount"], 2);
    }
}
