//! Resumo - Video Transcription and Summarization
//!
//! Extracts audio from videos, transcribes and summarizes it with an AI
//! provider, and tracks per-run usage costs in BRL.
//!
//! # Overview
//!
//! Resumo allows you to:
//! - Pull audio out of video URLs with a configurable extraction strategy
//! - Transcribe and summarize audio with Gemini or OpenAI
//! - Follow long-running runs over an SSE progress stream
//! - Persist results and usage accounting per user identity
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `extract` - Audio extraction strategies (Cobalt, native client, yt-dlp)
//! - `provider` - Transcription/summarization providers
//! - `cost` - Usage cost calculation
//! - `progress` - Progress event protocol
//! - `pipeline` - Pipeline coordination
//! - `store` - Result and credential persistence
//! - `server` - HTTP API (buffered and SSE transports)
//!
//! # Example
//!
//! ```rust,no_run
//! use resumo::config::Settings;
//! use resumo::pipeline::{Orchestrator, PipelineRequest, PipelineSource};
//! use resumo::progress::ProgressSender;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let request = PipelineRequest {
//!         source: Some(PipelineSource::Url("https://youtu.be/dQw4w9WgXcQ".into())),
//!         provider: None,
//!         api_key: Some("sk-...".into()),
//!         user_id: None,
//!     };
//!
//!     let progress = ProgressSender::discard();
//!     let outcome = orchestrator.process(request, &progress).await?;
//!     println!("{}", outcome.summary);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod server;
pub mod store;

pub use error::{Result, ResumoError};
