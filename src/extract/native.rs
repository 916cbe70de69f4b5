//! Native-platform-client strategy.
//!
//! Talks to the platform's player API directly from this process instead of
//! shelling out or relying on a third-party conversion service. The client is
//! initialized at most once per process and reused read-only across
//! invocations; the pipeline owns the single-initialization guard and injects
//! the handle here.

use super::{artifact_stem, decode_cookie_blob, stream_to_file, AudioArtifact, ExtractionStrategy};
use crate::error::{ResumoError, Result};
use crate::progress::ProgressSender;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const PLAYER_API_URL: &str = "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";

/// Client identity presented to the player API. The Android client receives
/// unthrottled direct stream URLs.
const CLIENT_NAME: &str = "ANDROID";
const CLIENT_VERSION: &str = "19.09.37";
const ANDROID_SDK_VERSION: u32 = 30;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Ordered matchers for the canonical 11-character video identifier.
///
/// First matching pattern wins: short-link form, path-embedded forms, then a
/// bare identifier.
pub struct VideoIdMatcher {
    patterns: Vec<Regex>,
}

impl VideoIdMatcher {
    pub fn new() -> Self {
        let patterns = vec![
            Regex::new(r"youtu\.be/([A-Za-z0-9_-]{11})").expect("invalid short-link pattern"),
            Regex::new(r"(?:watch\?v=|embed/|shorts/|/v/)([A-Za-z0-9_-]{11})")
                .expect("invalid path pattern"),
            Regex::new(r"^([A-Za-z0-9_-]{11})$").expect("invalid bare-id pattern"),
        ];
        Self { patterns }
    }

    /// Extract the video identifier from an arbitrary URL shape.
    pub fn extract(&self, input: &str) -> Option<String> {
        let input = input.trim();
        self.patterns
            .iter()
            .find_map(|p| p.captures(input))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for VideoIdMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide platform client.
///
/// Created once (guarded by the orchestrator's `OnceCell`), then shared
/// read-only. Holds the HTTP client and the optional operator cookie header.
pub struct NativeClient {
    http: reqwest::Client,
    cookie_header: Option<String>,
}

impl NativeClient {
    /// Build the client, decoding the operator cookie blob if supplied.
    pub fn initialize(cookie_blob: Option<&str>) -> Result<Self> {
        let cookie_header = match cookie_blob {
            Some(blob) => {
                let decoded = decode_cookie_blob(blob)?;
                Some(cookie_header_from_netscape(&decoded))
            }
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ResumoError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            cookie_header,
        })
    }

    /// Fetch the player response for a video.
    async fn player_response(&self, video_id: &str) -> Result<Value> {
        let body = json!({
            "videoId": video_id,
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "androidSdkVersion": ANDROID_SDK_VERSION,
                    "hl": "en"
                }
            }
        });

        let mut request = self.http.post(PLAYER_API_URL).json(&body);
        if let Some(cookies) = &self.cookie_header {
            request = request.header("Cookie", cookies.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResumoError::Extraction(format!("player API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ResumoError::Extraction(format!(
                "player API returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|_| ResumoError::Extraction("invalid upstream response".to_string()))
    }
}

/// Reduce Netscape cookie lines to a Cookie header value.
///
/// Non-Netscape input (no tab-separated fields) is used as-is, assumed to
/// already be header material.
fn cookie_header_from_netscape(text: &str) -> String {
    let pairs: Vec<String> = text
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() >= 7 {
                Some(format!("{}={}", fields[5], fields[6]))
            } else {
                None
            }
        })
        .collect();

    if pairs.is_empty() {
        text.trim().to_string()
    } else {
        pairs.join("; ")
    }
}

/// Pick the best audio-only stream from a player response.
///
/// Returns (url, file extension).
fn select_audio_format(player: &Value) -> Result<(String, &'static str)> {
    let status = player["playabilityStatus"]["status"].as_str().unwrap_or("");
    if status != "OK" {
        let reason = player["playabilityStatus"]["reason"]
            .as_str()
            .unwrap_or("video is not playable");
        return Err(ResumoError::Extraction(reason.to_string()));
    }

    let formats = player["streamingData"]["adaptiveFormats"]
        .as_array()
        .ok_or_else(|| ResumoError::Extraction("no streaming formats available".to_string()))?;

    let best = formats
        .iter()
        .filter(|f| {
            f["mimeType"]
                .as_str()
                .map(|m| m.starts_with("audio/"))
                .unwrap_or(false)
        })
        .max_by_key(|f| f["bitrate"].as_u64().unwrap_or(0))
        .ok_or_else(|| ResumoError::Extraction("no audio-only format available".to_string()))?;

    let url = best["url"]
        .as_str()
        .ok_or_else(|| {
            ResumoError::Extraction("audio format carries no direct URL".to_string())
        })?
        .to_string();

    let ext = match best["mimeType"].as_str() {
        Some(m) if m.starts_with("audio/webm") => "webm",
        _ => "m4a",
    };

    Ok((url, ext))
}

/// Extraction strategy backed by the in-process platform client.
pub struct NativeStrategy {
    client: Arc<NativeClient>,
    matcher: VideoIdMatcher,
}

impl NativeStrategy {
    pub fn new(client: Arc<NativeClient>) -> Self {
        Self {
            client,
            matcher: VideoIdMatcher::new(),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for NativeStrategy {
    #[instrument(skip(self, progress), fields(url = %source_url))]
    async fn extract(
        &self,
        source_url: &str,
        output_dir: &Path,
        progress: &ProgressSender,
    ) -> Result<AudioArtifact> {
        let video_id = self.matcher.extract(source_url).ok_or_else(|| {
            ResumoError::Extraction(format!("could not recognize video URL: {}", source_url))
        })?;

        progress.status("Resolving audio stream...");
        debug!("Fetching player response for {}", video_id);

        let player = self.client.player_response(&video_id).await?;
        let (stream_url, ext) = select_audio_format(&player)?;

        progress.status("Downloading audio stream...");

        let response = self
            .client
            .http
            .get(&stream_url)
            .send()
            .await
            .map_err(|e| ResumoError::Extraction(format!("stream download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ResumoError::Extraction(format!(
                "stream download returned HTTP {}",
                response.status()
            )));
        }

        let output_path = output_dir.join(format!("{}.{}", artifact_stem(), ext));
        let written = stream_to_file(response, &output_path).await?;

        if written == 0 {
            let _ = std::fs::remove_file(&output_path);
            return Err(ResumoError::Extraction("response body is empty".to_string()));
        }

        info!("Audio saved to {} ({} bytes)", output_path.display(), written);
        Ok(AudioArtifact::new(output_path))
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_url_shapes_yield_same_id() {
        let matcher = VideoIdMatcher::new();
        let shapes = [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
        ];
        for shape in shapes {
            assert_eq!(
                matcher.extract(shape).as_deref(),
                Some("dQw4w9WgXcQ"),
                "failed for shape: {}",
                shape
            );
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let matcher = VideoIdMatcher::new();
        assert_eq!(matcher.extract("not-a-video-id"), None);
        assert_eq!(matcher.extract(""), None);
        assert_eq!(matcher.extract("https://example.com/watch?v=short"), None);
    }

    #[test]
    fn test_netscape_cookie_header() {
        let text = "# Netscape HTTP Cookie File\n\
                    .youtube.com\tTRUE\t/\tTRUE\t0\tSID\tabc123\n\
                    .youtube.com\tTRUE\t/\tTRUE\t0\tHSID\tdef456\n";
        assert_eq!(
            cookie_header_from_netscape(text),
            "SID=abc123; HSID=def456"
        );
    }

    #[test]
    fn test_raw_header_passthrough() {
        assert_eq!(
            cookie_header_from_netscape("SID=abc123; HSID=def456"),
            "SID=abc123; HSID=def456"
        );
    }

    #[test]
    fn test_select_best_audio_format() {
        let player = json!({
            "playabilityStatus": { "status": "OK" },
            "streamingData": {
                "adaptiveFormats": [
                    { "mimeType": "video/mp4", "bitrate": 2_000_000, "url": "https://v/1" },
                    { "mimeType": "audio/webm; codecs=\"opus\"", "bitrate": 64_000, "url": "https://a/1" },
                    { "mimeType": "audio/mp4; codecs=\"mp4a\"", "bitrate": 128_000, "url": "https://a/2" }
                ]
            }
        });
        let (url, ext) = select_audio_format(&player).unwrap();
        assert_eq!(url, "https://a/2");
        assert_eq!(ext, "m4a");
    }

    #[test]
    fn test_unplayable_video_surfaces_reason() {
        let player = json!({
            "playabilityStatus": { "status": "LOGIN_REQUIRED", "reason": "Sign in to confirm" }
        });
        let err = select_audio_format(&player).unwrap_err();
        assert!(err.to_string().contains("Sign in to confirm"));
    }
}
