//! Remote-conversion-service strategy.
//!
//! Submits the video URL to a Cobalt conversion endpoint, receives a
//! temporary download link and streams that link's body to disk. One attempt
//! only; the deployment decides whether another strategy should be configured
//! instead.

use super::{artifact_stem, stream_to_file, AudioArtifact, ExtractionStrategy};
use crate::error::{ResumoError, Result};
use crate::progress::ProgressSender;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Conversion requests can queue server-side for a while.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Cobalt-based extraction strategy.
pub struct CobaltStrategy {
    client: reqwest::Client,
    api_url: String,
}

impl CobaltStrategy {
    pub fn new(api_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: api_url.to_string(),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for CobaltStrategy {
    #[instrument(skip(self, progress), fields(url = %source_url))]
    async fn extract(
        &self,
        source_url: &str,
        output_dir: &Path,
        progress: &ProgressSender,
    ) -> Result<AudioArtifact> {
        progress.status("Requesting audio conversion...");
        debug!("Submitting URL to conversion service at {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .header("Accept", "application/json")
            .json(&json!({
                "url": source_url,
                "vCodec": "h264",
                "vQuality": "720",
                "aFormat": "mp3",
                "isAudioOnly": true
            }))
            .send()
            .await
            .map_err(|e| ResumoError::Extraction(format!("conversion request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|_| ResumoError::Extraction("invalid upstream response".to_string()))?;

        let download_url = match body["url"].as_str() {
            Some(url) => url.to_string(),
            None => {
                // The service reports failures in its own `text` field.
                let message = body["text"]
                    .as_str()
                    .unwrap_or("Failed to get download URL from conversion API")
                    .to_string();
                return Err(ResumoError::Extraction(message));
            }
        };

        progress.status("Downloading converted audio...");

        let file_response = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(|e| ResumoError::Extraction(format!("file download failed: {}", e)))?;

        if !file_response.status().is_success() {
            return Err(ResumoError::Extraction(format!(
                "failed to download file: HTTP {}",
                file_response.status()
            )));
        }

        let output_path = output_dir.join(format!("{}.mp3", artifact_stem()));
        let written = stream_to_file(file_response, &output_path).await?;

        if written == 0 {
            let _ = std::fs::remove_file(&output_path);
            return Err(ResumoError::Extraction("response body is empty".to_string()));
        }

        info!("Audio saved to {} ({} bytes)", output_path.display(), written);
        Ok(AudioArtifact::new(output_path))
    }

    fn name(&self) -> &'static str {
        "cobalt"
    }
}
