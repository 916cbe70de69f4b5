//! Configuration settings for Resumo.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub extraction: ExtractionSettings,
    pub providers: ProviderSettings,
    pub server: ServerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data (results database).
    pub data_dir: String,
    /// Directory for temporary audio artifacts.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.resumo".to_string(),
            temp_dir: "/tmp/resumo".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Which audio extraction strategy a deployment uses.
///
/// Strategy selection is a deployment-time choice; there is no runtime
/// fallback chain between strategies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategyKind {
    /// Remote conversion service (Cobalt API).
    Cobalt,
    /// In-process platform client over the player API.
    Native,
    /// External yt-dlp subprocess.
    #[default]
    Ytdlp,
}

impl std::str::FromStr for ExtractionStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cobalt" => Ok(ExtractionStrategyKind::Cobalt),
            "native" => Ok(ExtractionStrategyKind::Native),
            "ytdlp" | "yt-dlp" => Ok(ExtractionStrategyKind::Ytdlp),
            _ => Err(format!("Unknown extraction strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for ExtractionStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStrategyKind::Cobalt => write!(f, "cobalt"),
            ExtractionStrategyKind::Native => write!(f, "native"),
            ExtractionStrategyKind::Ytdlp => write!(f, "ytdlp"),
        }
    }
}

/// Audio extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Extraction strategy (cobalt, native, ytdlp).
    pub strategy: ExtractionStrategyKind,
    /// Cobalt conversion API endpoint.
    pub cobalt_api_url: String,
    /// Cookie material for the native client and yt-dlp, raw Netscape
    /// format or base64-encoded. Encoding is auto-detected.
    pub cookies: Option<String>,
    /// Explicit path to the yt-dlp executable. When unset, known install
    /// locations are probed before falling back to PATH.
    pub yt_dlp_path: Option<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            strategy: ExtractionStrategyKind::default(),
            cobalt_api_url: "https://api.cobalt.tools/api/json".to_string(),
            cookies: None,
            yt_dlp_path: None,
        }
    }
}

/// Transcription provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Default provider when a request does not name one (gemini, openai).
    pub default: String,
    /// Gemini multimodal model.
    pub gemini_model: String,
    /// OpenAI speech-to-text model.
    pub speech_model: String,
    /// OpenAI chat model for summarization.
    pub chat_model: String,
    /// Character budget for the transcript handed to the chat model.
    pub transcript_char_budget: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            default: "gemini".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            speech_model: "whisper-1".to_string(),
            chat_model: "gpt-5-mini".to_string(),
            transcript_char_budget: 100_000,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ResumoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resumo")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded results database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir().join("results.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.extraction.strategy, ExtractionStrategyKind::Ytdlp);
        assert_eq!(settings.providers.default, "gemini");
        assert_eq!(settings.providers.transcript_char_budget, 100_000);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "cobalt".parse::<ExtractionStrategyKind>().unwrap(),
            ExtractionStrategyKind::Cobalt
        );
        assert_eq!(
            "yt-dlp".parse::<ExtractionStrategyKind>().unwrap(),
            ExtractionStrategyKind::Ytdlp
        );
        assert!("ffmpeg".parse::<ExtractionStrategyKind>().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings =
            toml::from_str("[extraction]\nstrategy = \"native\"\n").unwrap();
        assert_eq!(settings.extraction.strategy, ExtractionStrategyKind::Native);
        assert_eq!(settings.server.port, 3000);
    }
}
