//! OpenAI speech-plus-chat provider.
//!
//! Two-step variant: Whisper produces the transcript and audio duration, then
//! a chat model turns the transcript into a structured summary. The final
//! transcription is always Whisper's output, never a model paraphrase, since
//! regeneration reduces fidelity.

use super::{ProcessingOutcome, ProviderKind, TokenUsage, TranscriptionProvider};
use crate::error::{ResumoError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    AudioResponseFormat, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    CreateTranscriptionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// Request timeout for API calls (5 minutes).
const REQUEST_TIMEOUT_SECS: u64 = 300;

const ANALYST_INSTRUCTION: &str =
    "You are an expert content analyst. Analyze the provided transcription.";

/// OpenAI-based transcription provider.
pub struct OpenAiProvider {
    speech_model: String,
    chat_model: String,
    transcript_char_budget: usize,
}

/// Structured object the chat model must return.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    summary: String,
    #[serde(default)]
    key_topics: Vec<String>,
}

impl OpenAiProvider {
    pub fn new(speech_model: &str, chat_model: &str, transcript_char_budget: usize) -> Self {
        Self {
            speech_model: speech_model.to_string(),
            chat_model: chat_model.to_string(),
            transcript_char_budget,
        }
    }

    fn client(&self, api_key: &str) -> Client<OpenAIConfig> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Client::with_config(OpenAIConfig::new().with_api_key(api_key))
            .with_http_client(http_client)
    }

    fn analysis_schema() -> ResponseFormat {
        ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: "analysis_response".to_string(),
                schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "summary": {
                            "type": "string",
                            "description": "A professional executive summary in Portuguese"
                        },
                        "key_topics": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Main topics discussed"
                        }
                    },
                    "required": ["summary", "key_topics"],
                    "additionalProperties": false
                })),
                strict: Some(true),
            },
        }
    }
}

/// Truncate a transcript to a character budget, respecting char boundaries.
fn truncate_transcript(transcript: &str, budget: usize) -> &str {
    match transcript.char_indices().nth(budget) {
        Some((idx, _)) => &transcript[..idx],
        None => transcript,
    }
}

/// Parse the chat model's structured content.
fn parse_analysis(content: &str) -> Result<AnalysisPayload> {
    serde_json::from_str(content).map_err(|e| {
        ResumoError::MalformedResponse(format!("analysis response is not the expected JSON: {}", e))
    })
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    #[instrument(skip(self, api_key), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path, api_key: &str) -> Result<ProcessingOutcome> {
        if api_key.is_empty() {
            return Err(ResumoError::MissingCredential(
                self.kind().missing_credential_message(),
            ));
        }

        let client = self.client(api_key);

        // Step 1: speech-to-text with verbose response for the duration.
        debug!("Transcribing with {}", self.speech_model);
        let file_bytes = tokio::fs::read(audio_path).await?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.speech_model)
            .language("pt")
            .response_format(AudioResponseFormat::VerboseJson)
            .build()
            .map_err(|e| ResumoError::UpstreamRejected(format!("Failed to build request: {}", e)))?;

        let speech = client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| ResumoError::UpstreamRejected(format!("Whisper API error: {}", e)))?;

        let transcription = speech.text;
        let duration_seconds = speech.duration as f64;

        // Step 2: structured summary from the chat model.
        debug!("Summarizing with {}", self.chat_model);
        let excerpt = truncate_transcript(&transcription, self.transcript_char_budget);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(ANALYST_INSTRUCTION)
                .build()
                .map_err(|e| ResumoError::UpstreamRejected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("Transcription:\n{}", excerpt))
                .build()
                .map_err(|e| ResumoError::UpstreamRejected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .response_format(Self::analysis_schema())
            .build()
            .map_err(|e| ResumoError::UpstreamRejected(format!("Failed to build request: {}", e)))?;

        let completion = client
            .chat()
            .create(request)
            .await
            .map_err(|e| ResumoError::UpstreamRejected(format!("Chat API error: {}", e)))?;

        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| {
                ResumoError::MalformedResponse("chat response carried no content".to_string())
            })?;

        let analysis = parse_analysis(content)?;

        let usage = completion
            .usage
            .map(|u| {
                let cached = u
                    .prompt_tokens_details
                    .as_ref()
                    .and_then(|d| d.cached_tokens);
                let counters = TokenUsage::new(u.prompt_tokens, u.completion_tokens);
                match cached {
                    Some(c) => counters.with_cached(c),
                    None => counters,
                }
            })
            .unwrap_or_else(TokenUsage::empty);

        Ok(ProcessingOutcome {
            transcription,
            summary: analysis.summary,
            key_topics: analysis.key_topics,
            duration_seconds,
            usage,
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn billing_model(&self) -> &str {
        &self.chat_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_respects_budget() {
        let text = "abcdef";
        assert_eq!(truncate_transcript(text, 3), "abc");
        assert_eq!(truncate_transcript(text, 100), "abcdef");
    }

    #[test]
    fn test_truncation_multibyte_boundary() {
        let text = "ação de graças";
        let truncated = truncate_transcript(text, 4);
        assert_eq!(truncated.chars().count(), 4);
        assert_eq!(truncated, "ação");
    }

    #[test]
    fn test_parse_analysis_valid() {
        let payload =
            parse_analysis(r#"{"summary": "resumo", "key_topics": ["tema"]}"#).unwrap();
        assert_eq!(payload.summary, "resumo");
        assert_eq!(payload.key_topics, vec!["tema"]);
    }

    #[test]
    fn test_parse_analysis_malformed() {
        let err = parse_analysis("<not json>").unwrap_err();
        assert!(matches!(err, ResumoError::MalformedResponse(_)));
    }
}
