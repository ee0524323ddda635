//! Semantic Stream Parser (C7).
//!
//! Incrementally assembles an LLM's streamed response into either a
//! free-form `content` accumulator or a function-call `arguments`
//! accumulator, and opportunistically decodes a best-effort
//! [`Position`] list out of whichever one the caller configured this
//! parser to track — the wire format cannot be known in advance, so
//! the caller picks a [`ParserMode`] at construction time instead of
//! the source's double-accumulator approach (see spec.md §9).

use serde::Deserialize;

use crate::error::ChunkError;
use crate::model::{FlexibleNumber, Position};
use crate::util::tolerant_json;

/// Which accumulator a [`SemanticStreamParser`] tracks, chosen by the
/// caller based on [`crate::model::SemanticOptions::toolcall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    /// Segments arrive under `choices[].delta.tool_calls[0].function.arguments`.
    Toolcall,
    /// Segments arrive as free-form JSON in `choices[].delta.content`.
    Regular,
}

#[derive(Debug, Deserialize, Default)]
struct StreamEnvelope {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCall>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamToolCall {
    #[serde(default)]
    function: StreamFunctionCall,
}

#[derive(Debug, Deserialize, Default)]
struct StreamFunctionCall {
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SegmentPositions {
    start_pos: FlexibleNumber,
    end_pos: FlexibleNumber,
}

#[derive(Debug, Deserialize)]
struct ToolcallBody {
    segments: Vec<SegmentPositions>,
}

/// Incrementally assembles a streamed LLM response and opportunistically
/// decodes a best-effort [`Position`] list out of it.
pub struct SemanticStreamParser {
    mode: ParserMode,
    content: String,
    arguments: String,
}

impl SemanticStreamParser {
    /// Creates a parser tracking `mode`'s accumulator.
    #[must_use]
    pub const fn new(mode: ParserMode) -> Self {
        Self { mode, content: String::new(), arguments: String::new() }
    }

    /// The content accumulator so far (free-form mode).
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The tool-call arguments accumulator so far (toolcall mode).
    #[must_use]
    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    /// Feeds one raw byte chunk from the stream. Strips SSE framing
    /// (`data: ` prefixes, blank lines, the `[DONE]` sentinel),
    /// decodes each remaining line as a [`StreamEnvelope`] and appends
    /// any `content`/`arguments` deltas found, then attempts a
    /// best-effort tolerant decode of the tracked accumulator.
    ///
    /// Returns `Ok(Some(positions))` the first time the accumulator
    /// tolerantly parses into the expected shape (the list may still
    /// grow on a later call as more segments stream in); returns
    /// `Ok(None)` otherwise. A malformed envelope line is skipped
    /// rather than treated as fatal — only [`Self::finish`] is
    /// authoritative.
    pub fn feed(&mut self, raw_chunk: &[u8]) -> Option<Vec<Position>> {
        let text = String::from_utf8_lossy(raw_chunk);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let payload = line.strip_prefix("data:").map_or(line, str::trim_start);
            if payload.trim() == "[DONE]" {
                continue;
            }
            let Some(envelope) = tolerant_json::tolerant_parse_value(payload) else {
                continue;
            };
            let Ok(envelope) = serde_json::from_value::<StreamEnvelope>(envelope) else {
                continue;
            };
            let Some(choice) = envelope.choices.into_iter().next() else {
                continue;
            };
            if let Some(content) = choice.delta.content {
                self.content.push_str(&content);
            }
            if let Some(call) = choice.delta.tool_calls.into_iter().next()
                && let Some(args) = call.function.arguments
            {
                self.arguments.push_str(&args);
            }
        }

        self.try_decode_current()
    }

    fn try_decode_current(&self) -> Option<Vec<Position>> {
        match self.mode {
            ParserMode::Toolcall => decode_toolcall(&self.arguments).ok(),
            ParserMode::Regular => decode_regular(&self.content).ok(),
        }
    }

    /// Final-pass decode called once the stream has closed.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::JsonRepair`] if the accumulated text
    /// (even after tolerant repair) does not decode into a position
    /// list, or [`ChunkError::InvalidPositions`] if a position value
    /// could not be coerced to a non-negative integer.
    pub fn finish(&self) -> Result<Vec<Position>, ChunkError> {
        match self.mode {
            ParserMode::Toolcall => decode_toolcall(&self.arguments),
            ParserMode::Regular => decode_regular(&self.content),
        }
    }
}

/// Final-pass decoder for toolcall mode: `{"segments":[{start_pos,end_pos}, …]}`.
fn decode_toolcall(raw: &str) -> Result<Vec<Position>, ChunkError> {
    let body: ToolcallBody = tolerant_json::tolerant_parse(raw)?;
    segments_to_positions(body.segments)
}

/// Final-pass decoder for regular mode: `[{start_pos,end_pos}, …]`.
fn decode_regular(raw: &str) -> Result<Vec<Position>, ChunkError> {
    let segments: Vec<SegmentPositions> = tolerant_json::tolerant_parse(raw)?;
    segments_to_positions(segments)
}

fn segments_to_positions(segments: Vec<SegmentPositions>) -> Result<Vec<Position>, ChunkError> {
    segments
        .into_iter()
        .map(|s| {
            let start = s.start_pos.coerce()?;
            let end = s.end_pos.coerce()?;
            Ok(Position::new(start, end))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feeds_sse_framed_content_deltas() {
        let mut parser = SemanticStreamParser::new(ParserMode::Regular);
        parser.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"[{\\\"start_pos\\\":0\"}}]}\n");
        parser.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\",\\\"end_pos\\\":5}]\"}}]}\n");
        parser.feed(b"data: [DONE]\n");
        let positions = parser.finish().unwrap_or_else(|e| panic!("expected decode: {e}"));
        assert_eq!(positions, vec![Position::new(0, 5)]);
    }

    #[test]
    fn feeds_toolcall_argument_deltas() {
        let mut parser = SemanticStreamParser::new(ParserMode::Toolcall);
        let chunk1 = br#"data: {"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"{\"segments\":[{\"start_pos\":0,"}}]}}}]}"#;
        let chunk2 = br#"data: {"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"\"end_pos\":10}]}"}}]}}]}"#;
        parser.feed(chunk1);
        let mid = parser.feed(chunk2);
        assert!(mid.is_some());
        let positions = parser.finish().unwrap_or_else(|e| panic!("expected decode: {e}"));
        assert_eq!(positions, vec![Position::new(0, 10)]);
    }

    #[test]
    fn coerces_string_and_float_positions() {
        let mut parser = SemanticStreamParser::new(ParserMode::Regular);
        parser.feed(br#"data: {"choices":[{"delta":{"content":"[{\"start_pos\":\"0\",\"end_pos\":5.9}]"}}]}"#);
        let positions = parser.finish().unwrap_or_else(|e| panic!("expected decode: {e}"));
        assert_eq!(positions, vec![Position::new(0, 5)]);
    }

    #[test]
    fn ignores_malformed_envelope_lines() {
        let mut parser = SemanticStreamParser::new(ParserMode::Regular);
        let result = parser.feed(b"data: not an envelope\n");
        assert!(result.is_none());
        assert!(parser.content().is_empty());
    }

    #[test]
    fn unfinished_stream_fails_to_finish() {
        let mut parser = SemanticStreamParser::new(ParserMode::Regular);
        parser.feed(br#"data: {"choices":[{"delta":{"content":"[{\"start_pos\":0"}}]}"#);
        assert!(parser.finish().is_err());
    }
}
