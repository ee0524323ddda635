//! Structured Chunker (C4).
//!
//! Slices a seekable byte source into a tree of fixed-size, size-scaled
//! chunks with controlled overlap. Depth 1 is cut directly from the
//! stream; every deeper level is cut from the already-materialized
//! `Text` of its non-leaf parent, which keeps the stream itself
//! untouched once the first pass over it completes.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::callback::ChunkCallback;
use crate::concurrency::process_level;
use crate::error::ChunkError;
use crate::manager::ChunkManager;
use crate::model::{Chunk, ChunkStatus, ChunkType, ChunkingOptions, TextPos};
use crate::util::{lines, utf8};

/// A seekable, readable byte source the structured chunker can slice.
/// Blanket-implemented for anything that already satisfies the bounds.
pub trait ChunkSource: Read + Seek + Send {}
impl<T: Read + Seek + Send> ChunkSource for T {}

/// Per-call, per-depth index counters. Never a module-global static:
/// each top-level `chunk`/`chunk_file`/`chunk_stream` invocation owns
/// one of these for the duration of the call.
struct DepthCounters {
    counters: Vec<AtomicUsize>,
}

impl DepthCounters {
    fn new(max_depth: u32) -> Self {
        Self { counters: (0..max_depth).map(|_| AtomicUsize::new(0)).collect() }
    }

    fn next_index(&self, depth: u32) -> usize {
        self.counters[(depth - 1) as usize].fetch_add(1, Ordering::SeqCst)
    }
}

/// Splits `stream` into a chunk hierarchy per `opts`, invoking `callback`
/// once per emitted chunk. `manager` records every chunk for status
/// propagation; callers typically construct a fresh [`ChunkManager`] per
/// call.
///
/// # Errors
///
/// Returns [`ChunkError::Io`] on a stream read/seek failure,
/// [`ChunkError::Cancelled`] if `cancel` fires, or the first error raised
/// by `callback` (callback errors short-circuit the remainder of the
/// run).
pub async fn chunk_stream<S: ChunkSource>(
    mut stream: S,
    opts: &ChunkingOptions,
    manager: Arc<ChunkManager>,
    callback: ChunkCallback,
    cancel: CancellationToken,
) -> Result<(), ChunkError> {
    let opts = Arc::new(opts.clone().normalized());
    let kind = opts.kind.clone().unwrap_or(ChunkType::Text);
    let total_size = determine_size(&mut stream)?;
    let counters = Arc::new(DepthCounters::new(opts.max_depth));

    let level1 = build_level1(&mut stream, total_size, &opts, &counters, &kind)?;

    process_node(level1, 1, opts, manager, callback, cancel, counters, kind).await
}

/// Seeks to the end of `stream` to learn its total byte length, then
/// restores the read position to the start.
fn determine_size<S: Read + Seek>(stream: &mut S) -> Result<u64, ChunkError> {
    let size = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(size)
}

/// `levelSize = Size * max(1, (MaxDepth - depth) * SizeMultiplier)`, and
/// likewise for overlap.
fn level_size_overlap(opts: &ChunkingOptions, depth: u32) -> (usize, usize) {
    let factor = ((opts.max_depth.saturating_sub(depth)) as usize * opts.size_multiplier as usize).max(1);
    (opts.size.saturating_mul(factor), opts.overlap.saturating_mul(factor))
}

fn is_leaf(depth: u32, max_depth: u32, text_len: usize, opts: &ChunkingOptions) -> bool {
    if depth >= max_depth {
        return true;
    }
    let (next_size, _) = level_size_overlap(opts, depth + 1);
    text_len <= next_size
}

/// Reads `len` bytes starting at `start` from `stream`, stopping early at
/// EOF. Restores nothing: callers that need the original position saved
/// must do so themselves (depth-1 building only ever seeks forward).
fn read_range<S: Read + Seek>(stream: &mut S, start: u64, len: u64) -> std::io::Result<Vec<u8>> {
    stream.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; len as usize];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Builds the depth-1 chunks directly from `stream`, covering
/// `[0, total_size)`.
fn build_level1<S: ChunkSource>(
    stream: &mut S,
    total_size: u64,
    opts: &ChunkingOptions,
    counters: &DepthCounters,
    kind: &ChunkType,
) -> Result<Vec<Chunk>, ChunkError> {
    let (level_size, level_overlap) = level_size_overlap(opts, 1);
    let step = level_size.saturating_sub(level_overlap).max(1) as u64;
    let level_size = level_size as u64;

    let mut out = Vec::new();
    let mut cursor = 0u64;
    while cursor < total_size {
        let end = (cursor + level_size).min(total_size);
        let raw = read_range(stream, cursor, end - cursor)?;
        let (leading_trim, text) = utf8::repair_utf8_edges_with_offset(&raw);
        if text.is_empty() {
            cursor += step;
            continue;
        }
        let start_index = cursor + leading_trim as u64;
        let end_index = start_index + text.len() as u64;
        let (start_line, end_line) = lines::lines_at(stream, start_index, end_index - start_index);
        let leaf = is_leaf(1, opts.max_depth, text.len(), opts);

        out.push(Chunk {
            id: Chunk::new_id(),
            text,
            kind: kind.clone(),
            depth: 1,
            leaf,
            root: true,
            parent_id: None,
            parents: Vec::new(),
            index: counters.next_index(1),
            status: if leaf { ChunkStatus::Completed } else { ChunkStatus::Pending },
            text_pos: TextPos {
                start_index: start_index as usize,
                end_index: end_index as usize,
                start_line,
                end_line,
            },
        });

        if end >= total_size {
            break;
        }
        cursor += step;
    }
    Ok(out)
}

/// Builds `parent`'s children at `depth` by subdividing `parent.text` in
/// memory, translating local offsets back into absolute source offsets
/// via `parent.text_pos.start_index`.
fn build_text_level(
    parent: &Chunk,
    depth: u32,
    opts: &ChunkingOptions,
    counters: &DepthCounters,
    kind: &ChunkType,
) -> Vec<Chunk> {
    let (level_size, level_overlap) = level_size_overlap(opts, depth);
    let step = level_size.saturating_sub(level_overlap).max(1);
    let bytes = parent.text.as_bytes();
    let len = bytes.len();

    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < len {
        let end = (cursor + level_size).min(len);
        let (leading_trim, text) = utf8::repair_utf8_edges_with_offset(&bytes[cursor..end]);
        if text.is_empty() {
            cursor += step;
            continue;
        }
        let local_start = cursor + leading_trim;
        let text_len = text.len();
        let (start_line, end_line) =
            lines::lines_in_text(&parent.text, local_start, text_len, parent.text_pos.start_line);
        let leaf = is_leaf(depth, opts.max_depth, text_len, opts);

        out.push(Chunk {
            id: Chunk::new_id(),
            text,
            kind: kind.clone(),
            depth,
            leaf,
            root: false,
            parent_id: Some(parent.id.clone()),
            parents: Vec::new(),
            index: counters.next_index(depth),
            status: if leaf { ChunkStatus::Completed } else { ChunkStatus::Pending },
            text_pos: TextPos {
                start_index: parent.text_pos.start_index + local_start,
                end_index: parent.text_pos.start_index + local_start + text_len,
                start_line,
                end_line,
            },
        });

        if end >= len {
            break;
        }
        cursor += step;
    }
    out
}

/// Recursively fans out one level's chunks to `callback` through the
/// Concurrency Gate, then recurses into text-level subdivision for every
/// non-leaf chunk. Boxed because the recursion crosses `.await` points.
#[allow(clippy::too_many_arguments)]
fn process_node(
    chunks: Vec<Chunk>,
    depth: u32,
    opts: Arc<ChunkingOptions>,
    manager: Arc<ChunkManager>,
    callback: ChunkCallback,
    cancel: CancellationToken,
    counters: Arc<DepthCounters>,
    kind: ChunkType,
) -> BoxFuture<'static, Result<(), ChunkError>> {
    Box::pin(async move {
        for chunk in &chunks {
            manager.add(chunk.clone());
        }

        let manager_for_worker = Arc::clone(&manager);
        let max_concurrent = opts.max_concurrent;
        let callback_for_level = Arc::clone(&callback);
        process_level(chunks.clone(), max_concurrent, cancel.clone(), move |chunk| {
            let callback = Arc::clone(&callback_for_level);
            let manager = Arc::clone(&manager_for_worker);
            async move {
                let id = chunk.id.clone();
                let leaf = chunk.leaf;
                match callback(chunk).await {
                    Ok(()) => {
                        if leaf {
                            manager.update_status(&id, ChunkStatus::Completed);
                        }
                        Ok(())
                    }
                    Err(e) => {
                        manager.update_status(&id, ChunkStatus::Failed);
                        Err(e)
                    }
                }
            }
        })
        .await?;

        if depth >= opts.max_depth {
            return Ok(());
        }

        for parent in chunks.into_iter().filter(|c| !c.leaf) {
            let children = build_text_level(&parent, depth + 1, &opts, &counters, &kind);
            if children.is_empty() {
                continue;
            }
            process_node(
                children,
                depth + 1,
                Arc::clone(&opts),
                Arc::clone(&manager),
                Arc::clone(&callback),
                cancel.clone(),
                Arc::clone(&counters),
                kind.clone(),
            )
            .await?;
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn opts(size: usize, overlap: usize, max_depth: u32) -> ChunkingOptions {
        ChunkingOptions {
            kind: Some(ChunkType::Text),
            size,
            overlap,
            max_depth,
            size_multiplier: 3,
            max_concurrent: 4,
            semantic: None,
        }
        .normalized()
    }

    #[tokio::test]
    async fn single_depth_splits_whole_stream() {
        let text = "a".repeat(250);
        let stream = Cursor::new(text.clone().into_bytes());
        let manager = Arc::new(ChunkManager::new());
        let seen: Arc<Mutex<Vec<Chunk>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback = crate::callback::boxed(move |chunk| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(chunk);
                Ok(())
            }
        });

        let result = chunk_stream(
            stream,
            &opts(100, 10, 1),
            manager,
            callback,
            CancellationToken::new(),
        )
        .await;
        assert!(result.is_ok());
        let chunks = seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(!chunks.is_empty());
        for c in chunks.iter() {
            assert!(c.text_pos.start_index < c.text_pos.end_index);
        }
    }

    #[tokio::test]
    async fn callback_error_short_circuits() {
        let text = "x".repeat(500);
        let stream = Cursor::new(text.into_bytes());
        let manager = Arc::new(ChunkManager::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let callback = crate::callback::boxed(move |_chunk| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async move { Err(ChunkError::Callback { message: "nope".to_string() }) }
        });

        let result =
            chunk_stream(stream, &opts(50, 5, 2), manager, callback, CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
