//! Optional progress reporting (spec §6.2).
//!
//! Distinct from the user chunk callback: progress events are a
//! diagnostic side channel set once at Semantic Chunker construction.
//! An error returned from the progress callback is always logged and
//! discarded — it never aborts the run (spec.md §9's "progress-callback
//! error handling is inconsistent in the source" is resolved here by
//! declaring it always non-fatal).

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::ChunkError;

/// Which stage of the pipeline a [`ProgressEvent`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStep {
    /// A structured window chunk was produced (C4 inside C9's step 1).
    StructuredChunk,
    /// The LLM segmentation driver is working on a window (C8).
    SemanticAnalysis,
    /// A streamed LLM response delivered an intermediate byte chunk.
    LlmResponse,
    /// A semantic leaf chunk was emitted (C9 step 5).
    SemanticChunk,
    /// A parent chunk was built at the given depth (C9 step 6).
    LevelChunk(u32),
}

/// How a [`ProgressEvent`]'s stage is currently going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Work started.
    Processing,
    /// Work finished successfully.
    Completed,
    /// Work finished, but via a degraded/fallback path.
    Warning,
    /// An intermediate result is available (used with [`ProgressStep::LlmResponse`]).
    Streaming,
    /// A chunk was produced and handed to the user callback.
    Output,
}

/// A single progress notification.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Id of the chunk (or window) the event concerns.
    pub chunk_id: String,
    /// Current state of that stage.
    pub state: ProgressState,
    /// Which stage produced the event.
    pub step: ProgressStep,
    /// Optional payload, e.g. the current best-effort position list for
    /// [`ProgressStep::LlmResponse`].
    pub data: Option<Value>,
}

/// Invoked for diagnostic progress notifications. Returning an error is
/// logged via `tracing::warn!` and otherwise ignored.
pub type ProgressCallback =
    Arc<dyn Fn(ProgressEvent) -> BoxFuture<'static, Result<(), ChunkError>> + Send + Sync>;

/// Fires `progress` (if set) with `event`, swallowing and logging any
/// error it returns.
pub async fn notify(progress: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = progress
        && let Err(e) = cb(event).await
    {
        tracing::warn!(error = %e, "progress callback failed; continuing");
    }
}
