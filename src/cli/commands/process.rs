//! Process command implementation.

use crate::cli::output::{content_preview, format_duration};
use crate::cli::{preflight, Output};
use crate::config::Settings;
use crate::cost::cost_brl;
use crate::pipeline::{Orchestrator, PipelineRequest, PipelineSource};
use crate::progress::{PipelineEvent, ProgressSender};
use crate::provider::ProviderKind;
use anyhow::Result;
use std::path::Path;

/// Run the process command.
pub async fn run_process(
    input: &str,
    provider: Option<String>,
    api_key: Option<String>,
    user: Option<String>,
    full: bool,
    settings: Settings,
) -> Result<()> {
    // The pipeline owns and deletes its artifact, so a local input file is
    // copied into the temp dir instead of being handed over directly.
    let source = if Path::new(input).exists() {
        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;
        let file_name = Path::new(input)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3");
        let dest = temp_dir.join(format!("local-{}-{}", uuid::Uuid::new_v4(), file_name));
        std::fs::copy(input, &dest)?;
        PipelineSource::File(dest)
    } else {
        PipelineSource::Url(input.to_string())
    };

    if matches!(source, PipelineSource::Url(_)) {
        if let Err(e) = preflight::check_extraction(&settings) {
            Output::error(&format!("{}", e));
            return Err(e.into());
        }
    }

    let provider = match provider.as_deref() {
        Some(raw) => Some(raw.parse::<ProviderKind>().map_err(anyhow::Error::msg)?),
        None => None,
    };

    Output::info(&format!("Processing: {}", input));

    let default_provider: ProviderKind = settings
        .providers
        .default
        .parse()
        .map_err(anyhow::Error::msg)?;
    let billing_model = match provider.unwrap_or(default_provider) {
        ProviderKind::Gemini => settings.providers.gemini_model.clone(),
        ProviderKind::OpenAi => settings.providers.chat_model.clone(),
    };
    let orchestrator = Orchestrator::new(settings)?;

    let request = PipelineRequest {
        source: Some(source),
        provider,
        api_key,
        user_id: user,
    };

    // Mirror status events onto the spinner as the pipeline emits them.
    let (tx, mut rx) = ProgressSender::channel();
    let spinner = Output::spinner("Starting...");
    let spinner_clone = spinner.clone();
    let status_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::Status { status } = event {
                spinner_clone.set_message(status);
            }
        }
    });

    let result = orchestrator.process(request, &tx).await;
    drop(tx);
    let _ = status_task.await;
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            Output::success("Processing complete");

            Output::header("Summary");
            println!("{}", outcome.summary);

            if !outcome.key_topics.is_empty() {
                Output::header("Key Topics");
                for topic in &outcome.key_topics {
                    Output::list_item(topic);
                }
            }

            Output::header("Transcription");
            if full {
                println!("{}", outcome.transcription);
            } else {
                println!("{}", content_preview(&outcome.transcription, 500));
            }

            Output::header("Usage");
            if outcome.duration_seconds > 0.0 {
                Output::kv("Duration", &format_duration(outcome.duration_seconds));
            }
            Output::kv("Input tokens", &outcome.usage.prompt_tokens.to_string());
            Output::kv("Output tokens", &outcome.usage.completion_tokens.to_string());

            let cost = cost_brl(
                &billing_model,
                outcome.usage.prompt_tokens,
                outcome.usage.completion_tokens,
                outcome.duration_seconds,
            );
            Output::kv("Estimated cost", &format!("R$ {:.4}", cost));

            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Failed to process: {}", e));
            Err(e.into())
        }
    }
}
