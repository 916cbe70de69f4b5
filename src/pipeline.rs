//! Pipeline orchestrator.
//!
//! Sequences extraction, provider dispatch, cost computation, persistence and
//! cleanup, forwarding progress events along the way. Each invocation runs as
//! one task and produces exactly one terminal event. Failures after a usable
//! transcription result exists (persistence, cleanup) are logged and
//! absorbed; failures before it are the invocation's terminal error.

use crate::config::{ExtractionStrategyKind, Settings};
use crate::cost::cost_brl;
use crate::error::{ResumoError, Result};
use crate::extract::{
    prepare_output_dir, validate_source_url, AudioArtifact, CobaltStrategy, ExtractionStrategy,
    NativeClient, NativeStrategy, YtdlpStrategy,
};
use crate::progress::ProgressSender;
use crate::provider::{ConfiguredProviders, ProcessingOutcome, ProviderKind, ProviderSelector};
use crate::store::{ResultStore, SqliteStore, UsageRecord};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

/// What to process: a remote video URL or an already-local audio file.
///
/// Local files (uploads) skip extraction entirely; both variants yield an
/// artifact owned and deleted by this invocation.
#[derive(Debug, Clone)]
pub enum PipelineSource {
    Url(String),
    File(PathBuf),
}

/// One pipeline invocation request.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub source: Option<PipelineSource>,
    pub provider: Option<ProviderKind>,
    /// Inline credential; takes precedence over the stored one.
    pub api_key: Option<String>,
    /// Caller identity for credential lookup and persistence.
    pub user_id: Option<String>,
}

/// The main pipeline orchestrator.
///
/// One orchestrator serves the whole process; invocations run concurrently
/// and share only the native client's single-initialization guard.
pub struct Orchestrator {
    settings: Settings,
    store: Arc<dyn ResultStore>,
    providers: Arc<dyn ProviderSelector>,
    strategy_override: Option<Arc<dyn ExtractionStrategy>>,
    native_client: OnceCell<Arc<NativeClient>>,
    temp_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator with real components from settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(&settings.sqlite_path())?);
        let providers = Arc::new(ConfiguredProviders::new(&settings));
        Self::with_components(settings, store, providers, None)
    }

    /// Create an orchestrator with injected components (tests use this).
    pub fn with_components(
        settings: Settings,
        store: Arc<dyn ResultStore>,
        providers: Arc<dyn ProviderSelector>,
        strategy_override: Option<Arc<dyn ExtractionStrategy>>,
    ) -> Result<Self> {
        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        Ok(Self {
            settings,
            store,
            providers,
            strategy_override,
            native_client: OnceCell::new(),
            temp_dir,
        })
    }

    /// Get a reference to the result store.
    pub fn store(&self) -> Arc<dyn ResultStore> {
        self.store.clone()
    }

    /// Run the pipeline and emit the terminal event on `progress`.
    ///
    /// Exactly one terminal event (`result` or `error`) follows the status
    /// events; the sender is dropped afterwards so streams close.
    pub async fn run(&self, request: PipelineRequest, progress: ProgressSender) {
        match self.process(request, &progress).await {
            Ok(outcome) => progress.finish_ok(outcome),
            Err(e) => progress.finish_err(e.to_string()),
        }
    }

    /// Run the pipeline, returning the final outcome.
    ///
    /// Status events go to `progress`; the terminal outcome is the return
    /// value (the buffered transport uses it directly).
    #[instrument(skip(self, request, progress))]
    pub async fn process(
        &self,
        request: PipelineRequest,
        progress: &ProgressSender,
    ) -> Result<ProcessingOutcome> {
        let source = request
            .source
            .clone()
            .ok_or_else(|| ResumoError::Validation("URL is required".to_string()))?;

        let provider_kind = match request.provider {
            Some(kind) => kind,
            None => self
                .settings
                .providers
                .default
                .parse()
                .map_err(ResumoError::Validation)?,
        };

        let (artifact, source_url) = match &source {
            PipelineSource::Url(url) => {
                validate_source_url(url)?;
                prepare_output_dir(&self.temp_dir)?;

                let strategy = self.extraction_strategy().await?;
                info!("Extracting audio via {} strategy", strategy.name());
                progress.status("Extracting audio...");

                let artifact = strategy.extract(url, &self.temp_dir, progress).await?;
                progress.status("Audio extraction complete");
                (artifact, url.clone())
            }
            PipelineSource::File(path) => {
                if !path.exists() {
                    return Err(ResumoError::Validation(format!(
                        "Uploaded file not found: {}",
                        path.display()
                    )));
                }
                progress.status("Processing uploaded audio...");
                (AudioArtifact::new(path.clone()), String::new())
            }
        };

        // From here on the artifact must be cleaned up on every path.
        let result = self
            .transcribe_and_persist(&request, provider_kind, &artifact, &source_url, progress)
            .await;

        self.cleanup(&artifact);

        result
    }

    async fn transcribe_and_persist(
        &self,
        request: &PipelineRequest,
        provider_kind: ProviderKind,
        artifact: &AudioArtifact,
        source_url: &str,
        progress: &ProgressSender,
    ) -> Result<ProcessingOutcome> {
        let api_key = self.resolve_credential(request, provider_kind).await?;

        let provider = self.providers.provider_for(provider_kind);
        progress.status(format!("Transcribing with {}...", provider_kind));

        let outcome = provider.transcribe(&artifact.path, &api_key).await?;
        info!("Transcription complete ({} tokens)", outcome.usage.total_tokens);

        match &request.user_id {
            Some(user_id) => {
                progress.status("Saving results...");
                let usage = build_usage_record(provider_kind, provider.billing_model(), &outcome);

                if let Err(e) = self
                    .store
                    .save_processing_result(user_id, source_url, &outcome, &usage)
                    .await
                {
                    // The transcription already succeeded; persistence
                    // failures must not take the result down with them.
                    warn!("Failed to persist result: {}", e);
                }
            }
            None => {
                warn!("No user identity provided, skipping persistence");
                progress.status("No user identity provided; results will not be saved");
            }
        }

        Ok(outcome)
    }

    /// Resolve the provider credential: inline value first, then the stored
    /// per-identity key. Neither present is a terminal configuration error.
    async fn resolve_credential(
        &self,
        request: &PipelineRequest,
        provider_kind: ProviderKind,
    ) -> Result<String> {
        if let Some(key) = request.api_key.as_deref() {
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }

        if let Some(user_id) = &request.user_id {
            match self.store.get_api_key(provider_kind, user_id).await {
                Ok(Some(key)) => return Ok(key),
                Ok(None) => {}
                Err(e) => warn!("Credential lookup failed: {}", e),
            }
        }

        Err(ResumoError::MissingCredential(
            provider_kind.missing_credential_message(),
        ))
    }

    /// Delete the invocation's audio artifact. Failures are logged only; the
    /// returned result is already correct with or without the file.
    fn cleanup(&self, artifact: &AudioArtifact) {
        if artifact.path.exists() {
            if let Err(e) = std::fs::remove_file(&artifact.path) {
                warn!("Failed to clean up {}: {}", artifact.path.display(), e);
            }
        }
    }

    /// Build the configured extraction strategy.
    ///
    /// The native client behind the `native` strategy is created at most once
    /// per process, even under concurrent first use.
    async fn extraction_strategy(&self) -> Result<Arc<dyn ExtractionStrategy>> {
        if let Some(strategy) = &self.strategy_override {
            return Ok(strategy.clone());
        }

        let extraction = &self.settings.extraction;
        match extraction.strategy {
            ExtractionStrategyKind::Cobalt => {
                Ok(Arc::new(CobaltStrategy::new(&extraction.cobalt_api_url)))
            }
            ExtractionStrategyKind::Ytdlp => Ok(Arc::new(YtdlpStrategy::new(
                extraction.yt_dlp_path.as_deref(),
                extraction.cookies.as_deref(),
            ))),
            ExtractionStrategyKind::Native => {
                let client = self
                    .native_client
                    .get_or_try_init(|| async {
                        NativeClient::initialize(extraction.cookies.as_deref()).map(Arc::new)
                    })
                    .await?;
                Ok(Arc::new(NativeStrategy::new(client.clone())))
            }
        }
    }
}

/// Derive the immutable usage accounting row for one outcome.
fn build_usage_record(
    provider_kind: ProviderKind,
    model: &str,
    outcome: &ProcessingOutcome,
) -> UsageRecord {
    let usage = &outcome.usage;
    UsageRecord {
        provider: provider_kind.to_string(),
        model: model.to_string(),
        service_type: "transcription_and_summary".to_string(),
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        cost_brl: cost_brl(
            model,
            usage.prompt_tokens,
            usage.completion_tokens,
            outcome.duration_seconds,
        ),
        audio_duration_seconds: outcome.duration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::PipelineEvent;
    use crate::provider::{TokenUsage, TranscriptionProvider};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockStrategy {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockStrategy {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ExtractionStrategy for MockStrategy {
        async fn extract(
            &self,
            _source_url: &str,
            output_dir: &Path,
            progress: &ProgressSender,
        ) -> Result<AudioArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResumoError::Extraction("bot detection triggered".to_string()));
            }
            progress.status("Downloading: 100%");
            let path = output_dir.join("mock.mp3");
            std::fs::write(&path, b"fake audio")?;
            Ok(AudioArtifact::new(path))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    struct MockProvider {
        outcome: Result<ProcessingOutcome>,
        seen_key: Mutex<Option<String>>,
    }

    impl MockProvider {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(ProcessingOutcome {
                    transcription: "ola mundo".to_string(),
                    summary: "resumo executivo".to_string(),
                    key_topics: vec!["saudacao".to_string()],
                    duration_seconds: 20.0,
                    usage: TokenUsage::new(100, 50),
                }),
                seen_key: Mutex::new(None),
            })
        }

        fn malformed() -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(ResumoError::MalformedResponse(
                    "candidate text is not the expected JSON".to_string(),
                )),
                seen_key: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TranscriptionProvider for MockProvider {
        async fn transcribe(&self, _audio_path: &Path, api_key: &str) -> Result<ProcessingOutcome> {
            *self.seen_key.lock().unwrap() = Some(api_key.to_string());
            match &self.outcome {
                Ok(outcome) => Ok(outcome.clone()),
                Err(e) => Err(ResumoError::MalformedResponse(e.to_string())),
            }
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn billing_model(&self) -> &str {
            "gpt-5-mini"
        }
    }

    struct MockSelector(Arc<MockProvider>);

    impl ProviderSelector for MockSelector {
        fn provider_for(&self, _kind: ProviderKind) -> Arc<dyn TranscriptionProvider> {
            self.0.clone()
        }
    }

    struct MockStore {
        stored_key: Option<String>,
        saved: Mutex<Vec<UsageRecord>>,
    }

    impl MockStore {
        fn new(stored_key: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                stored_key: stored_key.map(|k| k.to_string()),
                saved: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ResultStore for MockStore {
        async fn save_processing_result(
            &self,
            _user_id: &str,
            _source_url: &str,
            _outcome: &ProcessingOutcome,
            usage: &UsageRecord,
        ) -> Result<String> {
            self.saved.lock().unwrap().push(usage.clone());
            Ok("record-1".to_string())
        }

        async fn get_api_key(
            &self,
            _provider: ProviderKind,
            _user_id: &str,
        ) -> Result<Option<String>> {
            Ok(self.stored_key.clone())
        }

        async fn save_api_key(
            &self,
            _provider: ProviderKind,
            _key: &str,
            _user_id: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn test_settings() -> (Settings, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.temp_dir = dir.path().to_string_lossy().to_string();
        (settings, dir)
    }

    fn orchestrator(
        strategy: Arc<MockStrategy>,
        provider: Arc<MockProvider>,
        store: Arc<MockStore>,
    ) -> (Orchestrator, tempfile::TempDir) {
        let (settings, dir) = test_settings();
        let orchestrator = Orchestrator::with_components(
            settings,
            store,
            Arc::new(MockSelector(provider)),
            Some(strategy),
        )
        .unwrap();
        (orchestrator, dir)
    }

    fn url_request() -> PipelineRequest {
        PipelineRequest {
            source: Some(PipelineSource::Url(
                "https://youtu.be/dQw4w9WgXcQ".to_string(),
            )),
            provider: Some(ProviderKind::OpenAi),
            api_key: Some("sk-test".to_string()),
            user_id: Some("user-1".to_string()),
        }
    }

    async fn collect_events(
        orchestrator: Orchestrator,
        request: PipelineRequest,
    ) -> Vec<PipelineEvent> {
        let (tx, mut rx) = ProgressSender::channel();
        orchestrator.run(request, tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_extraction() {
        let strategy = MockStrategy::new(false);
        let (orchestrator, _dir) = orchestrator(
            strategy.clone(),
            MockProvider::succeeding(),
            MockStore::new(None),
        );

        let events = collect_events(orchestrator, PipelineRequest::default()).await;

        let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], PipelineEvent::Error { .. }));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_streams_status_then_one_error() {
        let (orchestrator, _dir) = orchestrator(
            MockStrategy::new(true),
            MockProvider::succeeding(),
            MockStore::new(None),
        );

        let events = collect_events(orchestrator, url_request()).await;

        let status_count = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Status { .. }))
            .count();
        assert!(status_count >= 1);

        let (last, rest) = events.split_last().unwrap();
        match last {
            PipelineEvent::Error { error } => assert!(error.contains("bot detection")),
            other => panic!("expected terminal error, got {:?}", other),
        }
        assert!(rest.iter().all(|e| !e.is_terminal()));
    }

    #[tokio::test]
    async fn test_missing_identity_skips_persistence_but_succeeds() {
        let store = MockStore::new(None);
        let (orchestrator, _dir) = orchestrator(
            MockStrategy::new(false),
            MockProvider::succeeding(),
            store.clone(),
        );

        let mut request = url_request();
        request.user_id = None;

        let (tx, _rx) = ProgressSender::channel();
        let outcome = orchestrator.process(request, &tx).await.unwrap();

        assert_eq!(outcome.transcription, "ola mundo");
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_usage_and_cost() {
        let store = MockStore::new(None);
        let (orchestrator, _dir) = orchestrator(
            MockStrategy::new(false),
            MockProvider::succeeding(),
            store.clone(),
        );

        let events = collect_events(orchestrator, url_request()).await;

        let result = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::Result { result } => Some(result),
                _ => None,
            })
            .expect("expected terminal result");

        assert!(!result.summary.is_empty());
        assert_eq!(result.usage.total_tokens, 150);
        assert_eq!(result.duration_seconds, 20.0);

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].total_tokens, 150);
        // 20 seconds of audio alone guarantees a non-zero speech charge.
        assert!(saved[0].cost_brl > 0.0);
    }

    #[tokio::test]
    async fn test_malformed_provider_response_becomes_terminal_error() {
        let (orchestrator, _dir) = orchestrator(
            MockStrategy::new(false),
            MockProvider::malformed(),
            MockStore::new(None),
        );

        let events = collect_events(orchestrator, url_request()).await;

        let (last, _) = events.split_last().unwrap();
        match last {
            PipelineEvent::Error { error } => {
                assert!(error.contains("Malformed provider response"))
            }
            other => panic!("expected terminal error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inline_credential_beats_stored() {
        let provider = MockProvider::succeeding();
        let (orchestrator, _dir) = orchestrator(
            MockStrategy::new(false),
            provider.clone(),
            MockStore::new(Some("stored-key")),
        );

        let (tx, _rx) = ProgressSender::channel();
        orchestrator.process(url_request(), &tx).await.unwrap();

        assert_eq!(provider.seen_key.lock().unwrap().as_deref(), Some("sk-test"));
    }

    #[tokio::test]
    async fn test_stored_credential_used_when_inline_absent() {
        let provider = MockProvider::succeeding();
        let (orchestrator, _dir) = orchestrator(
            MockStrategy::new(false),
            provider.clone(),
            MockStore::new(Some("stored-key")),
        );

        let mut request = url_request();
        request.api_key = None;

        let (tx, _rx) = ProgressSender::channel();
        orchestrator.process(request, &tx).await.unwrap();

        assert_eq!(
            provider.seen_key.lock().unwrap().as_deref(),
            Some("stored-key")
        );
    }

    #[tokio::test]
    async fn test_no_credential_anywhere_is_terminal_config_error() {
        let (orchestrator, _dir) = orchestrator(
            MockStrategy::new(false),
            MockProvider::succeeding(),
            MockStore::new(None),
        );

        let mut request = url_request();
        request.api_key = None;

        let (tx, _rx) = ProgressSender::channel();
        let err = orchestrator.process(request, &tx).await.unwrap_err();

        assert!(matches!(err, ResumoError::MissingCredential(_)));
        assert!(err.to_string().contains("configure nos ajustes"));
    }

    #[tokio::test]
    async fn test_artifact_deleted_after_success() {
        let (orchestrator, dir) = orchestrator(
            MockStrategy::new(false),
            MockProvider::succeeding(),
            MockStore::new(None),
        );

        let (tx, _rx) = ProgressSender::channel();
        orchestrator.process(url_request(), &tx).await.unwrap();

        assert!(!dir.path().join("mock.mp3").exists());
    }
}
