//! A hierarchical chunking engine for retrieval-augmented generation.
//!
//! Two chunkers share one data model and one callback contract:
//!
//! - The Structured Chunker (C1-C5) splits a byte stream into a
//!   multi-level tree of fixed, size-scaled chunks with controlled
//!   overlap, purely mechanically.
//! - The Semantic Chunker (C6-C9) drives an LLM over structured windows
//!   to find natural segment boundaries, then assembles the resulting
//!   leaves upward into the same kind of tree.
//!
//! [`chunk`], [`chunk_file`], and [`chunk_stream`] (C10) are the public
//! entry points; each dispatches to the semantic chunker when
//! [`model::ChunkingOptions::semantic`] is set, and to the structured
//! chunker otherwise.

pub mod callback;
pub mod concurrency;
pub mod connector;
pub mod error;
pub mod manager;
pub mod model;
pub mod progress;
pub mod structured;
pub mod semantic;
pub mod util;

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use callback::ChunkCallback;
pub use connector::{ConnectorRegistry, ReqwestTransport, StreamingTransport};
pub use error::{ChunkError, Result};
pub use manager::ChunkManager;
pub use model::{Chunk, ChunkStatus, ChunkType, ChunkingOptions, Position, SemanticOptions, TextPos};
pub use progress::{ProgressCallback, ProgressEvent, ProgressState, ProgressStep};
pub use semantic::SemanticChunker;
pub use structured::ChunkSource;

/// Chunks in-memory `text` per `opts`, dispatching to the semantic
/// chunker when `opts.semantic` is set.
///
/// # Errors
///
/// See [`chunk_stream`].
pub async fn chunk(
    text: &str,
    opts: &ChunkingOptions,
    connectors: &ConnectorRegistry,
    transport: Arc<dyn StreamingTransport>,
    callback: ChunkCallback,
    cancel: CancellationToken,
) -> Result<()> {
    let cursor = Cursor::new(text.as_bytes().to_vec());
    chunk_stream(cursor, opts, connectors, transport, callback, cancel).await
}

/// Chunks the file at `path` per `opts`. If `opts.kind` is unset, the
/// content kind is detected from the file's leading bytes and, failing
/// that, its extension (spec §4.10).
///
/// # Errors
///
/// Returns [`ChunkError::Io`] if the file cannot be opened or read, or
/// any error documented on [`chunk_stream`].
pub async fn chunk_file(
    path: &Path,
    opts: &ChunkingOptions,
    connectors: &ConnectorRegistry,
    transport: Arc<dyn StreamingTransport>,
    callback: ChunkCallback,
    cancel: CancellationToken,
) -> Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    let mut file = std::fs::File::open(path)?;
    let mut opts = opts.clone();
    if opts.kind.is_none() {
        let mut leading = vec![0u8; util::sniff::SNIFF_WINDOW];
        let n = file.read(&mut leading)?;
        leading.truncate(n);
        file.seek(SeekFrom::Start(0))?;
        opts.kind = Some(util::sniff::detect_chunk_type(path, &leading));
    }

    chunk_stream(file, &opts, connectors, transport, callback, cancel).await
}

/// Chunks an arbitrary seekable byte source per `opts`, dispatching to
/// the semantic chunker when `opts.semantic` is set and to the
/// structured chunker otherwise.
///
/// # Errors
///
/// Returns [`ChunkError::Validation`] for malformed options,
/// [`ChunkError::Io`] on a stream failure, [`ChunkError::Cancelled`] if
/// `cancel` fires, or the first error raised by `callback`.
pub async fn chunk_stream<S: ChunkSource>(
    stream: S,
    opts: &ChunkingOptions,
    connectors: &ConnectorRegistry,
    transport: Arc<dyn StreamingTransport>,
    callback: ChunkCallback,
    cancel: CancellationToken,
) -> Result<()> {
    if opts.semantic.is_some() {
        let chunker = SemanticChunker::new(connectors.clone(), transport);
        chunker.chunk_stream(stream, opts, callback, cancel).await
    } else {
        let manager = Arc::new(ChunkManager::new());
        structured::chunk_stream(stream, opts, manager, callback, cancel).await
    }
}
