//! The LLM-driven semantic pipeline (C6-C9): parses streamed model
//! output into positions, prompts the model, drives the retry loop per
//! window, and assembles the resulting leaves into a full hierarchy.

pub mod chunker;
pub mod driver;
pub mod prompt;
pub mod stream_parser;

pub use chunker::SemanticChunker;
pub use driver::{SegmentationResult, segment_window, segment_window_via_registry};
pub use stream_parser::{ParserMode, SemanticStreamParser};
