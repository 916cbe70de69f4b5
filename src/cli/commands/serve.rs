//! Serve command implementation.

use crate::cli::{preflight, Output};
use crate::config::Settings;
use anyhow::Result;

/// Run the HTTP API server.
pub async fn run_serve(host: Option<&str>, port: Option<u16>, settings: Settings) -> Result<()> {
    // A broken extraction setup should surface at startup, not on the first
    // request.
    if let Err(e) = preflight::check_extraction(&settings) {
        Output::warning(&format!("{}", e));
        Output::warning("URL processing will fail until this is fixed.");
    }

    let host = host
        .map(|h| h.to_string())
        .unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    crate::server::run_serve(&host, port, settings).await
}
