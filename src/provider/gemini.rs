//! Gemini cloud-multimodal provider.
//!
//! Submits the whole audio file inline (base64) alongside a fixed instruction
//! prompt, asking the model for a strictly-typed JSON object.

use super::{ProcessingOutcome, ProviderKind, TokenUsage, TranscriptionProvider};
use crate::error::{ResumoError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Request timeout; inline audio uploads for long videos take a while.
const REQUEST_TIMEOUT_SECS: u64 = 300;

const PROMPT: &str = "\
You are an expert transcriber and summarizer.
1. Transcribe the following audio intelligently in Portuguese (PT-BR). Ignore filler words.
2. Provide a concise, structured executive summary of the key points IN PORTUGUESE.
3. Extract a list of key topics discussed.";

/// Gemini-based transcription provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    model: String,
    api_base: String,
}

/// The JSON object the model is required to return.
#[derive(Debug, Deserialize)]
struct GeminiPayload {
    transcription: String,
    summary: String,
    #[serde(default)]
    key_topics: Vec<String>,
}

impl GeminiProvider {
    pub fn new(model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            model: model.to_string(),
            api_base: API_BASE.to_string(),
        }
    }

    fn request_body(&self, audio_b64: String) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": PROMPT },
                    { "inline_data": { "mime_type": "audio/mp3", "data": audio_b64 } }
                ]
            }],
            "generationConfig": {
                "response_mime_type": "application/json",
                "response_schema": {
                    "type": "OBJECT",
                    "properties": {
                        "transcription": { "type": "STRING" },
                        "summary": { "type": "STRING" },
                        "key_topics": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["transcription", "summary"]
                }
            }
        })
    }
}

/// Fold a `usageMetadata` block into the shared counter shape.
fn normalize_usage(metadata: Option<&Value>) -> TokenUsage {
    let Some(meta) = metadata else {
        return TokenUsage::empty();
    };

    let prompt = meta["promptTokenCount"].as_u64();
    let candidates = meta["candidatesTokenCount"].as_u64();
    let total = meta["totalTokenCount"].as_u64();

    let usage = match (prompt, candidates) {
        (Some(p), Some(c)) => TokenUsage::new(p as u32, c as u32),
        _ => match total {
            Some(t) => TokenUsage::from_total(t as u32),
            None => TokenUsage::empty(),
        },
    };

    match meta["cachedContentTokenCount"].as_u64() {
        Some(cached) => usage.with_cached(cached as u32),
        None => usage,
    }
}

/// Parse a generateContent response into the shared result contract.
fn parse_response(body: &Value) -> Result<ProcessingOutcome> {
    let text = body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| {
            ResumoError::MalformedResponse("response contains no candidate text".to_string())
        })?;

    let payload: GeminiPayload = serde_json::from_str(text).map_err(|e| {
        ResumoError::MalformedResponse(format!("candidate text is not the expected JSON: {}", e))
    })?;

    Ok(ProcessingOutcome {
        transcription: payload.transcription,
        summary: payload.summary,
        key_topics: payload.key_topics,
        // Gemini does not report audio duration for inline media.
        duration_seconds: 0.0,
        usage: normalize_usage(body.get("usageMetadata")),
    })
}

#[async_trait]
impl TranscriptionProvider for GeminiProvider {
    #[instrument(skip(self, api_key), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path, api_key: &str) -> Result<ProcessingOutcome> {
        if api_key.is_empty() {
            return Err(ResumoError::MissingCredential(
                self.kind().missing_credential_message(),
            ));
        }

        let audio_bytes = tokio::fs::read(audio_path).await?;
        let audio_b64 = base64::engine::general_purpose::STANDARD.encode(audio_bytes);
        debug!("Submitting inline audio to {}", self.model);

        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&self.request_body(audio_b64))
            .send()
            .await?;

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return Err(ResumoError::MalformedResponse(format!(
                    "non-JSON response from Gemini: {}",
                    e
                )))
            }
        };

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown upstream error")
                .to_string();
            return Err(ResumoError::UpstreamRejected(format!(
                "Gemini API error ({}): {}",
                status, message
            )));
        }

        parse_response(&body)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn billing_model(&self) -> &str {
        &self.model
    }
}
