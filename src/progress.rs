//! Progress event protocol for long-running pipeline invocations.
//!
//! Pipeline steps push human-readable status strings into a [`ProgressSender`]
//! without knowing how they reach the caller. Each invocation produces zero or
//! more status events followed by exactly one terminal event (result or
//! error), delivered in emission order. When the consumer disconnects the
//! channel closes and further sends become no-ops; in-flight work runs to
//! completion and cleans up normally.

use crate::provider::ProcessingOutcome;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A single event in the progress stream.
///
/// Serializes to the wire shapes `{"status": ...}`, `{"result": ...}` and
/// `{"error": ...}` used by the SSE transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineEvent {
    /// Non-terminal, human-readable milestone.
    Status { status: String },
    /// Terminal success payload.
    Result { result: ProcessingOutcome },
    /// Terminal failure.
    Error { error: String },
}

impl PipelineEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Status { .. })
    }
}

/// Sink for progress events, decoupling pipeline steps from the transport.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ProgressSender {
    /// Create a connected sender/receiver pair for one invocation.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a sender whose events are discarded.
    ///
    /// Used by the buffered transport, which only cares about the final
    /// outcome returned from the pipeline call itself.
    pub fn discard() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Push a non-terminal status event. A closed channel makes this a no-op.
    pub fn status(&self, message: impl Into<String>) {
        let _ = self.tx.send(PipelineEvent::Status {
            status: message.into(),
        });
    }

    /// Push the terminal success event.
    pub fn finish_ok(&self, result: ProcessingOutcome) {
        let _ = self.tx.send(PipelineEvent::Result { result });
    }

    /// Push the terminal failure event.
    pub fn finish_err(&self, error: impl Into<String>) {
        let _ = self.tx.send(PipelineEvent::Error {
            error: error.into(),
        });
    }
}
