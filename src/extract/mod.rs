//! Audio extraction strategies.
//!
//! Resolves a video URL into a local audio artifact. Three interchangeable
//! strategies share one contract and differ in transport: a remote conversion
//! service ([`CobaltStrategy`]), an in-process platform client
//! ([`NativeStrategy`]) and an external subprocess ([`YtdlpStrategy`]). No
//! single approach survives anti-automation measures reliably, so deployments
//! pick one by configuration; the contract stays strategy-agnostic.

mod cobalt;
mod native;
mod ytdlp;

pub use cobalt::CobaltStrategy;
pub use native::{NativeClient, NativeStrategy, VideoIdMatcher};
pub use ytdlp::YtdlpStrategy;

use crate::error::{ResumoError, Result};
use crate::progress::ProgressSender;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

/// A local audio file produced by one extraction.
///
/// Owned exclusively by the pipeline invocation that created it and deleted
/// unconditionally when that invocation ends.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl AudioArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            created_at: Utc::now(),
        }
    }
}

/// Trait for audio extraction strategies.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Resolve a video URL into a local audio artifact.
    ///
    /// Single attempt; failures surface as [`ResumoError::Extraction`] with a
    /// human-readable cause and are never retried here.
    async fn extract(
        &self,
        source_url: &str,
        output_dir: &Path,
        progress: &ProgressSender,
    ) -> Result<AudioArtifact>;

    /// Strategy name for logs and status messages.
    fn name(&self) -> &'static str;
}

/// Validate that a source URL parses as a retrievable media reference.
pub fn validate_source_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|_| ResumoError::Validation(format!("Invalid URL format: {}", url)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ResumoError::Validation(
            "URL must use HTTP or HTTPS protocol".to_string(),
        ));
    }

    Ok(parsed)
}

/// Ensure the output directory exists before extraction starts.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Timestamp-based artifact stem, unique enough for one invocation per ms.
pub(crate) fn artifact_stem() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Decode operator-supplied cookie material.
///
/// The blob arrives raw (Netscape cookie text) or base64-encoded. Raw cookie
/// files always carry the platform domain, so that marker decides the
/// encoding before any decode is attempted.
pub(crate) fn decode_cookie_blob(blob: &str) -> Result<String> {
    if blob.contains("youtube.com") {
        return Ok(blob.to_string());
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(blob.trim())
        .map_err(|e| ResumoError::Config(format!("Cookie blob is not valid base64: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|e| ResumoError::Config(format!("Decoded cookie blob is not UTF-8: {}", e)))
}

/// Stream an HTTP response body to a file, writing chunks in arrival order.
///
/// Returns the number of bytes written; the file handle is flushed and synced
/// before returning so callers only resolve on completed writes.
pub(crate) async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ResumoError::Extraction(format!("download stream failed: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_source_url() {
        assert!(validate_source_url("https://youtu.be/dQw4w9WgXcQ").is_ok());
        assert!(validate_source_url("http://example.com/video").is_ok());
        assert!(validate_source_url("ftp://example.com/video").is_err());
        assert!(validate_source_url("not a url").is_err());
    }

    #[test]
    fn test_cookie_blob_plaintext_passthrough() {
        let raw = ".youtube.com\tTRUE\t/\tTRUE\t0\tSID\tabc";
        assert_eq!(decode_cookie_blob(raw).unwrap(), raw);
    }

    #[test]
    fn test_cookie_blob_base64_decode() {
        let raw = ".youtube.com\tTRUE\t/\tTRUE\t0\tSID\tabc";
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        assert_eq!(decode_cookie_blob(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_cookie_blob_invalid_base64() {
        assert!(decode_cookie_blob("!!! not base64 !!!").is_err());
    }
}
