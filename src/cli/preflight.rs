//! Pre-flight checks before expensive operations.
//!
//! Validates that the configured extraction strategy can actually run before
//! starting an operation that would otherwise fail midway.

use crate::config::{ExtractionStrategyKind, Settings};
use crate::error::{ResumoError, Result};
use std::process::Command;

/// Verify the configured extraction strategy is usable.
///
/// Only the subprocess strategy has an external requirement; the other
/// strategies are self-contained.
pub fn check_extraction(settings: &Settings) -> Result<()> {
    if settings.extraction.strategy == ExtractionStrategyKind::Ytdlp {
        let tool = settings
            .extraction
            .yt_dlp_path
            .as_deref()
            .unwrap_or("yt-dlp");
        check_tool(tool)?;
    }
    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    let path = Settings::expand_path(name);
    match Command::new(&path).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(ResumoError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ResumoError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(ResumoError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_subprocess_strategies_have_no_requirements() {
        let mut settings = Settings::default();
        settings.extraction.strategy = ExtractionStrategyKind::Cobalt;
        assert!(check_extraction(&settings).is_ok());

        settings.extraction.strategy = ExtractionStrategyKind::Native;
        assert!(check_extraction(&settings).is_ok());
    }

    #[test]
    fn test_missing_tool_reported() {
        let err = check_tool("/nonexistent/path/to/yt-dlp").unwrap_err();
        assert!(matches!(err, ResumoError::ToolNotFound(_)));
    }
}
