//! External-subprocess-tool strategy.
//!
//! Shells out to yt-dlp for audio-only extraction. Stdout is scanned for
//! download percentages and forwarded to the progress sink; stderr is
//! buffered and surfaced verbatim on failure. Cookie material, when
//! configured, lives in a temp file only for the duration of the call.

use super::{artifact_stem, decode_cookie_blob, AudioArtifact, ExtractionStrategy};
use crate::error::{ResumoError, Result};
use crate::progress::ProgressSender;
use async_trait::async_trait;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Browser identity presented to the platform; the stock yt-dlp identifier
/// trips bot detection more often.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Install locations probed before assuming the tool is on PATH.
const KNOWN_LOCATIONS: [&str; 4] = [
    "./yt-dlp",
    "./bin/yt-dlp",
    "/usr/local/bin/yt-dlp",
    "~/.local/bin/yt-dlp",
];

/// yt-dlp subprocess extraction strategy.
pub struct YtdlpStrategy {
    executable: PathBuf,
    cookies: Option<String>,
    percent_pattern: Regex,
}

impl YtdlpStrategy {
    pub fn new(explicit_path: Option<&str>, cookies: Option<&str>) -> Self {
        Self {
            executable: locate_executable(explicit_path),
            cookies: cookies.map(|c| c.to_string()),
            percent_pattern: Regex::new(r"(\d+(?:\.\d+)?)%").expect("invalid percent pattern"),
        }
    }
}

/// Find the yt-dlp executable: explicit config, known install locations,
/// then PATH.
fn locate_executable(explicit_path: Option<&str>) -> PathBuf {
    if let Some(path) = explicit_path {
        return crate::config::Settings::expand_path(path);
    }

    for candidate in KNOWN_LOCATIONS {
        let path = crate::config::Settings::expand_path(candidate);
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("yt-dlp")
}

#[async_trait]
impl ExtractionStrategy for YtdlpStrategy {
    #[instrument(skip(self, progress), fields(url = %source_url))]
    async fn extract(
        &self,
        source_url: &str,
        output_dir: &Path,
        progress: &ProgressSender,
    ) -> Result<AudioArtifact> {
        let stem = artifact_stem();
        let template = output_dir.join(format!("{}.%(ext)s", stem));
        let expected_path = output_dir.join(format!("{}.mp3", stem));

        // Dropped on every exit path, deleting the cookie file with it.
        let cookie_file = match &self.cookies {
            Some(blob) => {
                let decoded = decode_cookie_blob(blob)?;
                let mut file = tempfile::NamedTempFile::new()?;
                file.write_all(decoded.as_bytes())?;
                file.flush()?;
                Some(file)
            }
            None => None,
        };

        let mut command = Command::new(&self.executable);
        command
            .arg("--output")
            .arg(&template)
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--user-agent")
            .arg(USER_AGENT);

        if let Some(file) = &cookie_file {
            command.arg("--cookies").arg(file.path());
        }

        command
            .arg(source_url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Spawning {} for {}", self.executable.display(), source_url);
        progress.status("Starting audio download...");

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResumoError::ToolNotFound("yt-dlp".to_string())
            } else {
                ResumoError::Extraction(format!("failed to spawn yt-dlp: {}", e))
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ResumoError::Extraction("could not capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ResumoError::Extraction("could not capture stderr".to_string()))?;

        // Forward percentage markers as they arrive while buffering stderr.
        let percent_pattern = self.percent_pattern.clone();
        let progress_clone = progress.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut last_reported = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(caps) = percent_pattern.captures(&line) {
                    let pct = caps[1].to_string();
                    if pct != last_reported {
                        progress_clone.status(format!("Downloading: {}%", pct));
                        last_reported = pct;
                    }
                }
            }
        });

        let mut stderr_buf = String::new();
        let _ = stderr.read_to_string(&mut stderr_buf).await;

        let status = child
            .wait()
            .await
            .map_err(|e| ResumoError::Extraction(format!("yt-dlp did not exit cleanly: {}", e)))?;
        let _ = stdout_task.await;

        if !status.success() {
            return Err(ResumoError::Extraction(format!(
                "yt-dlp failed: {}",
                stderr_buf.trim()
            )));
        }

        if !expected_path.exists() {
            return Err(ResumoError::Extraction(
                "output missing despite success exit".to_string(),
            ));
        }

        info!("Audio saved to {}", expected_path.display());
        Ok(AudioArtifact::new(expected_path))
    }

    fn name(&self) -> &'static str {
        "ytdlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_pattern() {
        let strategy = YtdlpStrategy::new(None, None);
        let caps = strategy
            .percent_pattern
            .captures("[download]  42.3% of 3.50MiB at 1.2MiB/s")
            .unwrap();
        assert_eq!(&caps[1], "42.3");
        assert!(strategy
            .percent_pattern
            .captures("[info] extracting audio")
            .is_none());
    }

    #[test]
    fn test_explicit_path_wins() {
        let strategy = YtdlpStrategy::new(Some("/opt/tools/yt-dlp"), None);
        assert_eq!(strategy.executable, PathBuf::from("/opt/tools/yt-dlp"));
    }

    #[test]
    fn test_path_fallback() {
        // With no explicit path and no known location present, fall back to
        // the bare executable name resolved via PATH.
        let located = locate_executable(None);
        assert!(located == PathBuf::from("yt-dlp") || located.exists());
    }
}
