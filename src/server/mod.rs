//! HTTP API server.
//!
//! Exposes the processing pipeline over two transports: buffered JSON
//! (request in, final result out) and Server-Sent Events (status events as
//! they happen, then exactly one terminal event). Uploaded files take the
//! same pipeline minus the extraction step.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::ResumoError;
use crate::pipeline::{Orchestrator, PipelineRequest, PipelineSource};
use crate::progress::{PipelineEvent, ProgressSender};
use crate::provider::ProviderKind;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared application state.
struct AppState {
    orchestrator: Arc<Orchestrator>,
    settings: Settings,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::new(settings.clone())?);

    let state = Arc::new(AppState {
        orchestrator,
        settings,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/process-video", post(process_video))
        .route("/api/process-video/stream", post(process_video_stream))
        .route("/api/process-file", post(process_file))
        .route("/api/settings/keys", post(save_key))
        .route("/api/settings/keys/{provider}", get(key_status))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Resumo API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Process URL", "POST /api/process-video");
    Output::kv("Process URL (SSE)", "POST /api/process-video/stream");
    Output::kv("Process Upload", "POST /api/process-file");
    Output::kv("Save API Key", "POST /api/settings/keys");
    Output::kv("Key Status", "GET  /api/settings/keys/:provider");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Debug, Deserialize)]
struct ProcessVideoRequest {
    url: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default, rename = "apiKey")]
    api_key: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveKeyRequest {
    provider: String,
    key: String,
    #[serde(rename = "userId")]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct KeyStatusQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct KeyStatusResponse {
    configured: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Map a pipeline error to the HTTP status the buffered transport reports.
fn status_for(error: &ResumoError) -> StatusCode {
    match error {
        ResumoError::Validation(_) => StatusCode::BAD_REQUEST,
        ResumoError::MissingCredential(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_provider(raw: Option<&str>) -> Result<Option<ProviderKind>, String> {
    match raw {
        Some(value) if !value.is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Buffered transport: run the whole pipeline, answer with the final result.
async fn process_video(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessVideoRequest>,
) -> impl IntoResponse {
    let url = match &req.url {
        Some(url) if !url.is_empty() => url.clone(),
        _ => return error_response(StatusCode::BAD_REQUEST, "URL is required"),
    };

    let provider = match parse_provider(req.provider.as_deref()) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    info!("Processing URL: {}", url);

    let request = PipelineRequest {
        source: Some(PipelineSource::Url(url)),
        provider,
        api_key: req.api_key,
        user_id: req.user_id,
    };

    let progress = ProgressSender::discard();
    match state.orchestrator.process(request, &progress).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            error!("Error processing video: {}", e);
            error_response(status_for(&e), e.to_string())
        }
    }
}

/// Streaming transport: each pipeline event becomes one SSE `data:` line.
///
/// The invocation runs on its own task; disconnecting the stream closes the
/// channel and remaining sends become no-ops while the pipeline finishes and
/// cleans up on its own.
async fn process_video_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessVideoRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let provider = parse_provider(req.provider.as_deref());

    let (tx, rx) = ProgressSender::channel();

    match (req.url.filter(|u| !u.is_empty()), provider) {
        (Some(url), Ok(provider)) => {
            let request = PipelineRequest {
                source: Some(PipelineSource::Url(url)),
                provider,
                api_key: req.api_key,
                user_id: req.user_id,
            };
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.run(request, tx).await;
            });
        }
        (None, _) => tx.finish_err("URL is required"),
        (_, Err(e)) => tx.finish_err(e),
    }

    let stream = UnboundedReceiverStream::new(rx).map(|event: PipelineEvent| {
        let json = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"error":"serialization failure"}"#.to_string());
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload transport: the audio arrives in the request body, so the pipeline
/// starts at transcription. The temp file is owned by the invocation and
/// deleted with the other artifacts.
async fn process_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut audio_path = None;
    let mut provider_raw = None;
    let mut api_key = None;
    let mut user_id = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read multipart: {}", e),
                )
            }
        };

        match field.name() {
            Some("audio") => {
                // Speech APIs key the container format off the filename
                // extension, so keep the uploaded one.
                let ext = field
                    .file_name()
                    .and_then(|n| std::path::Path::new(n).extension())
                    .and_then(|e| e.to_str())
                    .unwrap_or("mp3")
                    .to_string();
                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(e) => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            format!("Failed to read upload: {}", e),
                        )
                    }
                };

                let path = state
                    .settings
                    .temp_dir()
                    .join(format!("upload-{}.{}", uuid::Uuid::new_v4(), ext));
                if let Err(e) = prepare_upload(&path, &data) {
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                }
                audio_path = Some(path);
            }
            Some("provider") => provider_raw = field.text().await.ok(),
            Some("apiKey") => api_key = field.text().await.ok(),
            Some("userId") => user_id = field.text().await.ok(),
            _ => {}
        }
    }

    let audio_path = match audio_path {
        Some(path) => path,
        None => return error_response(StatusCode::BAD_REQUEST, "No file uploaded"),
    };

    let provider = match parse_provider(provider_raw.as_deref()) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    info!("Processing uploaded file: {}", audio_path.display());

    let request = PipelineRequest {
        source: Some(PipelineSource::File(audio_path)),
        provider,
        api_key: api_key.filter(|k| !k.is_empty()),
        user_id: user_id.filter(|u| !u.is_empty()),
    };

    let progress = ProgressSender::discard();
    match state.orchestrator.process(request, &progress).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            error!("Error processing file: {}", e);
            error_response(status_for(&e), e.to_string())
        }
    }
}

fn prepare_upload(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)
}

async fn save_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveKeyRequest>,
) -> impl IntoResponse {
    if req.provider.is_empty() || req.key.is_empty() || req.user_id.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Provider, key and userId are required",
        );
    }

    let provider: ProviderKind = match req.provider.parse() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state
        .orchestrator
        .store()
        .save_api_key(provider, &req.key, &req.user_id)
        .await
    {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn key_status(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<KeyStatusQuery>,
) -> impl IntoResponse {
    let user_id = match query.user_id {
        Some(user_id) if !user_id.is_empty() => user_id,
        // Without an identity there is no stored key to report.
        _ => return Json(KeyStatusResponse { configured: false }).into_response(),
    };

    let provider: ProviderKind = match provider.parse() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state.orchestrator.store().get_api_key(provider, &user_id).await {
        Ok(key) => Json(KeyStatusResponse {
            configured: key.is_some(),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_field_names() {
        let req: ProcessVideoRequest = serde_json::from_str(
            r#"{"url": "https://youtu.be/dQw4w9WgXcQ", "provider": "openai",
                "apiKey": "sk-test", "userId": "user-1"}"#,
        )
        .unwrap();
        assert_eq!(req.url.as_deref(), Some("https://youtu.be/dQw4w9WgXcQ"));
        assert_eq!(req.provider.as_deref(), Some("openai"));
        assert_eq!(req.api_key.as_deref(), Some("sk-test"));
        assert_eq!(req.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_optional_fields_default_to_none() {
        let req: ProcessVideoRequest =
            serde_json::from_str(r#"{"url": "https://example.com/v"}"#).unwrap();
        assert!(req.provider.is_none());
        assert!(req.api_key.is_none());
        assert!(req.user_id.is_none());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(parse_provider(Some("anthropic")).is_err());
        assert_eq!(parse_provider(Some("gemini")), Ok(Some(ProviderKind::Gemini)));
        assert_eq!(parse_provider(None), Ok(None));
        assert_eq!(parse_provider(Some("")), Ok(None));
    }

    #[test]
    fn test_validation_errors_map_to_bad_request() {
        assert_eq!(
            status_for(&ResumoError::Validation("URL is required".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ResumoError::MissingCredential("sem chave".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ResumoError::Extraction("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
