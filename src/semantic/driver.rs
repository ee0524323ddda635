//! LLM Segmentation Driver (C8).
//!
//! Drives a single structured window through a streaming chat
//! completion call: builds the request, feeds streamed bytes to the
//! Semantic Stream Parser (C7), validates the resulting positions
//! against the window, and retries with linear backoff before giving
//! up with [`ChunkError::LlmExhausted`].

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::prompt::{chars_listing, default_prompt, segment_tool_choice, segment_tool_schema};
use super::stream_parser::{ParserMode, SemanticStreamParser};
use crate::connector::{Connector, StreamingTransport};
use crate::error::ChunkError;
use crate::model::{Position, SemanticOptions};
use crate::progress::{ProgressCallback, ProgressEvent, ProgressState, ProgressStep, notify};

/// Result of successfully segmenting one window.
pub struct SegmentationResult {
    /// The positions decoded from the LLM's response, validated against
    /// the window's text length.
    pub positions: Vec<Position>,
}

/// Segments `window_text` by driving `connector` through `transport`,
/// retrying up to `opts.max_retry + 1` total attempts with linear
/// backoff (`attempt * 1s`) between them.
///
/// # Errors
///
/// Returns [`ChunkError::Cancelled`] if `cancel` fires before or during
/// an attempt, or [`ChunkError::LlmExhausted`] once every attempt has
/// failed to produce a valid, non-empty position list.
pub async fn segment_window(
    window_id: &str,
    window_text: &str,
    opts: &SemanticOptions,
    connector: &dyn Connector,
    transport: &dyn StreamingTransport,
    progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
) -> Result<SegmentationResult, ChunkError> {
    let body = build_request_body(window_text, opts, connector);
    let total_attempts = opts.max_retry + 1;
    let mut last_error = String::new();

    for attempt in 0..total_attempts {
        if cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }

        notify(
            progress,
            ProgressEvent {
                chunk_id: window_id.to_string(),
                state: ProgressState::Processing,
                step: ProgressStep::SemanticAnalysis,
                data: None,
            },
        )
        .await;

        match run_attempt(window_id, window_text, &body, opts, connector, transport, progress, cancel)
            .await
        {
            Ok(positions) if !positions.is_empty() => {
                notify(
                    progress,
                    ProgressEvent {
                        chunk_id: window_id.to_string(),
                        state: ProgressState::Completed,
                        step: ProgressStep::SemanticAnalysis,
                        data: None,
                    },
                )
                .await;
                return Ok(SegmentationResult { positions });
            }
            Ok(_) => last_error = "LLM returned no segments".to_string(),
            Err(ChunkError::Cancelled) => return Err(ChunkError::Cancelled),
            Err(e) => last_error = e.to_string(),
        }

        if attempt + 1 < total_attempts {
            let backoff = std::time::Duration::from_secs(u64::from(attempt + 1));
            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                () = cancel.cancelled() => return Err(ChunkError::Cancelled),
            }
        }
    }

    notify(
        progress,
        ProgressEvent {
            chunk_id: window_id.to_string(),
            state: ProgressState::Warning,
            step: ProgressStep::SemanticAnalysis,
            data: None,
        },
    )
    .await;

    Err(ChunkError::LlmExhausted { attempts: total_attempts, message: last_error })
}

#[allow(clippy::too_many_arguments)]
async fn run_attempt(
    window_id: &str,
    window_text: &str,
    body: &Value,
    opts: &SemanticOptions,
    connector: &dyn Connector,
    transport: &dyn StreamingTransport,
    progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
) -> Result<Vec<Position>, ChunkError> {
    let mode = if opts.toolcall { ParserMode::Toolcall } else { ParserMode::Regular };
    let mut parser = SemanticStreamParser::new(mode);
    let mut stream = transport.stream_chat(connector, body.clone()).await?;
    let len = window_text.len();

    loop {
        let next = tokio::select! {
            item = stream.next() => item,
            () = cancel.cancelled() => return Err(ChunkError::Cancelled),
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;
        if let Some(positions) = parser.feed(&chunk)
            && Position::validate_list(&positions, len).is_ok()
        {
            notify(
                progress,
                ProgressEvent {
                    chunk_id: window_id.to_string(),
                    state: ProgressState::Streaming,
                    step: ProgressStep::LlmResponse,
                    data: serde_json::to_value(&positions).ok(),
                },
            )
            .await;
        }
    }

    let positions = parser.finish()?;
    Position::validate_list(&positions, len)?;
    Ok(positions)
}

/// Builds the request body per spec.md §4.8 and §6.3: system + user
/// messages, temperature 0, the `segment_text` tool in toolcall mode,
/// and `opts.options` merged in without overwriting the core fields.
fn build_request_body(window_text: &str, opts: &SemanticOptions, connector: &dyn Connector) -> Value {
    let settings = connector.settings();
    let prompt = opts.prompt.clone().unwrap_or_else(|| default_prompt(window_text.len()));
    let listing = chars_listing(window_text);

    let mut body = json!({
        "model": settings.model_or_default(),
        "temperature": 0,
        "messages": [
            { "role": "system", "content": prompt },
            { "role": "user", "content": listing },
        ],
    });

    if opts.toolcall {
        body["tools"] = json!([segment_tool_schema()]);
        body["tool_choice"] = segment_tool_choice();
    }

    if let Some(extra) = opts.options.as_object() {
        let Value::Object(map) = &mut body else { unreachable!("body literal is always an object") };
        for (key, value) in extra {
            if matches!(key.as_str(), "model" | "messages" | "temperature" | "tools" | "tool_choice") {
                continue;
            }
            map.insert(key.clone(), value.clone());
        }
    }

    body
}

/// Convenience wrapper used by the Semantic Chunker (C9): resolves the
/// connector by id before delegating to [`segment_window`].
pub async fn segment_window_via_registry(
    window_id: &str,
    window_text: &str,
    opts: &SemanticOptions,
    connectors: &crate::connector::ConnectorRegistry,
    transport: Arc<dyn StreamingTransport>,
    progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
) -> Result<SegmentationResult, ChunkError> {
    let connector = connectors.resolve(&opts.connector)?;
    segment_window(window_id, window_text, opts, connector.as_ref(), transport.as_ref(), progress, cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::connector::{BoxByteStream, ConnectorSettings, StaticConnector};

    struct ScriptedTransport {
        calls: AtomicUsize,
        fail_until: usize,
        final_body: &'static [u8],
    }

    #[async_trait]
    impl StreamingTransport for ScriptedTransport {
        async fn stream_chat(
            &self,
            _connector: &dyn Connector,
            _body: Value,
        ) -> Result<BoxByteStream, ChunkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_until {
                let s = futures_util::stream::once(async { Ok(b"data: {\"choices\":[]}\n".to_vec()) });
                return Ok(Box::pin(s));
            }
            let body = self.final_body.to_vec();
            let s = futures_util::stream::once(async move { Ok(body) });
            Ok(Box::pin(s))
        }
    }

    fn connector() -> StaticConnector {
        StaticConnector::new("test".to_string(), ConnectorSettings::default())
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let transport = ScriptedTransport {
            calls: AtomicUsize::new(0),
            fail_until: 0,
            final_body: br#"data: {"choices":[{"delta":{"content":"[{\"start_pos\":0,\"end_pos\":5}]"}}]}"#,
        };
        let opts = SemanticOptions::new("test");
        let connector = connector();
        let result = segment_window(
            "w1",
            "hello world",
            &opts,
            &connector,
            &transport,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_or_else(|e| panic!("expected success: {e}"));
        assert_eq!(result.positions, vec![Position::new(0, 5)]);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let transport = ScriptedTransport {
            calls: AtomicUsize::new(0),
            fail_until: 2,
            final_body: br#"data: {"choices":[{"delta":{"content":"[{\"start_pos\":0,\"end_pos\":5}]"}}]}"#,
        };
        let mut opts = SemanticOptions::new("test");
        opts.max_retry = 5;
        let connector = connector();
        let result = segment_window(
            "w1",
            "hello world",
            &opts,
            &connector,
            &transport,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_or_else(|e| panic!("expected eventual success: {e}"));
        assert_eq!(result.positions, vec![Position::new(0, 5)]);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_fails() {
        let transport = ScriptedTransport {
            calls: AtomicUsize::new(0),
            fail_until: 100,
            final_body: b"",
        };
        let mut opts = SemanticOptions::new("test");
        opts.max_retry = 1;
        let connector = connector();
        let result = segment_window(
            "w1",
            "hello world",
            &opts,
            &connector,
            &transport,
            None,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(ChunkError::LlmExhausted { attempts: 2, .. })));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn build_request_body_sets_toolcall_fields() {
        let mut opts = SemanticOptions::new("test");
        opts.toolcall = true;
        let connector = connector();
        let body = build_request_body("hi", &opts, &connector);
        assert!(body["tools"].is_array());
        assert_eq!(body["tool_choice"]["function"]["name"], "segment_text");
    }

    #[test]
    fn build_request_body_merges_extra_options_without_overwrite() {
        let mut opts = SemanticOptions::new("test");
        opts.options = json!({ "model": "should-not-win", "top_p": 0.5 });
        let connector = connector();
        let body = build_request_body("hi", &opts, &connector);
        assert_eq!(body["model"], crate::connector::DEFAULT_MODEL);
        assert_eq!(body["top_p"], 0.5);
    }
}
