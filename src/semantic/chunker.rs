//! Semantic Chunker (C9).
//!
//! Builds a full chunk hierarchy from LLM-identified segment boundaries
//! instead of fixed byte windows. Windows are first cut by the
//! Structured Chunker (C4) at depth 1 with `Size = ContextSize`; each
//! window is then segmented independently via the LLM Segmentation
//! Driver (C8), and the resulting leaves are assembled upward into
//! `MaxDepth` levels by grouping and concatenation.
//!
//! Unlike C4, which constructs a chunk's parent before its children and
//! so always knows a child's `ParentID` at emission time, C9 discovers
//! a leaf's parent only after every leaf has already been produced.
//! Leaves are therefore emitted with `ParentID` unset; the mapping is
//! recorded in the [`ChunkManager`] once each parent level is built, via
//! [`ChunkManager::set_parent`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio_util::sync::CancellationToken;

use crate::callback::{self, ChunkCallback};
use crate::concurrency::process_level;
use crate::connector::{ConnectorRegistry, StreamingTransport};
use crate::error::ChunkError;
use crate::manager::ChunkManager;
use crate::model::{Chunk, ChunkStatus, ChunkingOptions, Position, TextPos};
use crate::progress::{ProgressCallback, ProgressEvent, ProgressState, ProgressStep, notify};
use crate::structured::{self, ChunkSource};
use crate::util::{lines, utf8};

use super::driver;

/// Orchestrates the semantic chunking pipeline: window acquisition,
/// concurrent LLM segmentation, leaf assembly, and upward tree
/// construction.
pub struct SemanticChunker {
    connectors: ConnectorRegistry,
    transport: Arc<dyn StreamingTransport>,
    progress: Option<ProgressCallback>,
}

impl SemanticChunker {
    /// Creates a chunker resolving connectors from `connectors` and
    /// issuing streaming requests through `transport`.
    #[must_use]
    pub fn new(connectors: ConnectorRegistry, transport: Arc<dyn StreamingTransport>) -> Self {
        Self { connectors, transport, progress: None }
    }

    /// Attaches a diagnostic progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the semantic chunking pipeline over `stream`.
    ///
    /// `opts.semantic` must be `Some`; `opts.max_depth` controls how
    /// many levels are built upward from the LLM-identified leaves.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::Validation`] if `opts.semantic` is unset,
    /// [`ChunkError::UnknownConnector`] if the connector id does not
    /// resolve, [`ChunkError::Cancelled`] if `cancel` fires, or the
    /// first error raised by `callback`.
    pub async fn chunk_stream<S: ChunkSource>(
        &self,
        stream: S,
        opts: &ChunkingOptions,
        callback: ChunkCallback,
        cancel: CancellationToken,
    ) -> Result<(), ChunkError> {
        let opts = opts.clone().normalized();
        let Some(sem_opts) = opts.semantic.clone() else {
            return Err(ChunkError::Validation {
                message: "semantic chunking requires ChunkingOptions.semantic".to_string(),
            });
        };
        let connector = self.connectors.resolve(&sem_opts.connector)?;

        // Step 1: acquire windows via the structured chunker at depth 1.
        let window_opts = ChunkingOptions {
            kind: opts.kind.clone(),
            size: sem_opts.context_size,
            overlap: opts.overlap,
            max_depth: 1,
            size_multiplier: opts.size_multiplier,
            max_concurrent: opts.max_concurrent,
            semantic: None,
        }
        .normalized();

        let windows: Arc<StdMutex<Vec<Chunk>>> = Arc::new(StdMutex::new(Vec::new()));
        let collected = Arc::clone(&windows);
        let collector = callback::boxed(move |chunk| {
            let collected = Arc::clone(&collected);
            async move {
                collected.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(chunk);
                Ok(())
            }
        });
        let window_manager = Arc::new(ChunkManager::new());
        structured::chunk_stream(stream, &window_opts, window_manager, collector, cancel.clone())
            .await?;

        let mut windows =
            Arc::try_unwrap(windows).map_or_else(|a| a.lock().map_or_else(|_| Vec::new(), |g| g.clone()), |m| {
                m.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner)
            });
        windows.sort_by_key(|c| c.index);

        for window in &windows {
            notify(
                self.progress.as_ref(),
                ProgressEvent {
                    chunk_id: window.id.clone(),
                    state: ProgressState::Output,
                    step: ProgressStep::StructuredChunk,
                    data: None,
                },
            )
            .await;
        }

        // Step 2: segment every window concurrently, keyed by its
        // window index so ordering survives the gate's scheduling.
        let max_depth = opts.max_depth;
        let root_leaf = max_depth == 1;
        let results: Arc<StdMutex<HashMap<usize, Vec<Chunk>>>> = Arc::new(StdMutex::new(HashMap::new()));

        let connector = Arc::clone(&connector);
        let transport = Arc::clone(&self.transport);
        let sem_opts_for_workers = sem_opts.clone();
        let progress_for_workers = self.progress.clone();
        let results_for_workers = Arc::clone(&results);
        let cancel_for_workers = cancel.clone();

        process_level(windows, sem_opts.max_concurrent, cancel.clone(), move |window| {
            let connector = Arc::clone(&connector);
            let transport = Arc::clone(&transport);
            let sem_opts = sem_opts_for_workers.clone();
            let progress = progress_for_workers.clone();
            let results = Arc::clone(&results_for_workers);
            let cancel = cancel_for_workers.clone();
            async move {
                let leaves = match driver::segment_window(
                    &window.id,
                    &window.text,
                    &sem_opts,
                    connector.as_ref(),
                    transport.as_ref(),
                    progress.as_ref(),
                    &cancel,
                )
                .await
                {
                    Ok(result) => split_window_into_leaves(&window, &result.positions, max_depth, root_leaf),
                    Err(ChunkError::Cancelled) => return Err(ChunkError::Cancelled),
                    Err(_) => {
                        notify(
                            progress.as_ref(),
                            ProgressEvent {
                                chunk_id: window.id.clone(),
                                state: ProgressState::Warning,
                                step: ProgressStep::SemanticAnalysis,
                                data: None,
                            },
                        )
                        .await;
                        vec![fallback_leaf(&window, max_depth, root_leaf)]
                    }
                };
                results.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(window.index, leaves);
                Ok(())
            }
        })
        .await?;

        // Step 3/4: reassemble in ascending window order, renumber.
        let mut results_map =
            Arc::try_unwrap(results).map_or_else(|a| a.lock().map_or_else(|_| HashMap::new(), |g| g.clone()), |m| {
                m.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner)
            });
        let mut window_indices: Vec<usize> = results_map.keys().copied().collect();
        window_indices.sort_unstable();
        let mut all_leaves: Vec<Chunk> = Vec::new();
        for idx in window_indices {
            if let Some(leaves) = results_map.remove(&idx) {
                all_leaves.extend(leaves);
            }
        }
        for (i, leaf) in all_leaves.iter_mut().enumerate() {
            leaf.index = i;
        }

        // Step 5: emit leaves.
        let manager = Arc::new(ChunkManager::new());
        for leaf in &all_leaves {
            manager.add(leaf.clone());
        }
        emit_level(&manager, &all_leaves, &opts, &callback, self.progress.clone(), &cancel, None).await?;

        if max_depth == 1 {
            return Ok(());
        }

        // Step 6: build upward from MaxDepth - 1 down to 1.
        let mut current_level = all_leaves;
        for depth in (1..max_depth).rev() {
            let group_size = usize::try_from(max_depth - depth + 1).unwrap_or(2).max(2);
            let level_size_bound = opts.size.saturating_mul((max_depth - depth + 2) as usize);
            let groups = group_indices(&current_level, group_size, level_size_bound);

            let mut parents: Vec<Chunk> = groups
                .iter()
                .map(|group| build_parent(&current_level, group, depth, depth == 1))
                .collect();
            for (i, parent) in parents.iter_mut().enumerate() {
                parent.index = i;
            }

            assign_parents_by_containment(&mut current_level, &parents);
            for child in &current_level {
                if let Some(parent_id) = &child.parent_id {
                    manager.set_parent(&child.id, parent_id);
                }
            }

            for parent in &parents {
                manager.add(parent.clone());
            }
            emit_level(&manager, &parents, &opts, &callback, self.progress.clone(), &cancel, Some(depth)).await?;

            current_level = parents;
        }

        Ok(())
    }
}

/// Fans `chunks` out to `callback` through the Concurrency Gate,
/// marking any callback failure `Failed` in `manager`. `depth` selects
/// the progress step: `None` means leaves (C9 step 5), `Some(d)` means
/// the level-`d` parent build (C9 step 6).
async fn emit_level(
    manager: &Arc<ChunkManager>,
    chunks: &[Chunk],
    opts: &ChunkingOptions,
    callback: &ChunkCallback,
    progress: Option<ProgressCallback>,
    cancel: &CancellationToken,
    depth: Option<u32>,
) -> Result<(), ChunkError> {
    let manager = Arc::clone(manager);
    let callback = Arc::clone(callback);
    let step = depth.map_or(ProgressStep::SemanticChunk, ProgressStep::LevelChunk);

    process_level(chunks.to_vec(), opts.max_concurrent, cancel.clone(), move |chunk| {
        let manager = Arc::clone(&manager);
        let callback = Arc::clone(&callback);
        let progress = progress.clone();
        async move {
            let id = chunk.id.clone();
            notify(
                progress.as_ref(),
                ProgressEvent { chunk_id: id.clone(), state: ProgressState::Output, step, data: None },
            )
            .await;
            match callback(chunk).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    manager.update_status(&id, ChunkStatus::Failed);
                    Err(e)
                }
            }
        }
    })
    .await
}

/// Splits `window.text` into leaf chunks at `positions`, trimming each
/// slice to a valid UTF-8 boundary and translating local offsets back
/// into the original source's coordinates.
fn split_window_into_leaves(window: &Chunk, positions: &[Position], depth: u32, root: bool) -> Vec<Chunk> {
    let bytes = window.text.as_bytes();
    positions
        .iter()
        .filter_map(|p| {
            let slice = bytes.get(p.start..p.end)?;
            let (leading_trim, text) = utf8::repair_utf8_edges_with_offset(slice);
            if text.is_empty() {
                return None;
            }
            let local_start = p.start + leading_trim;
            let text_len = text.len();
            let (start_line, end_line) =
                lines::lines_in_text(&window.text, local_start, text_len, window.text_pos.start_line);
            Some(Chunk {
                id: Chunk::new_id(),
                text,
                kind: window.kind.clone(),
                depth,
                leaf: true,
                root,
                parent_id: None,
                parents: Vec::new(),
                index: 0,
                status: ChunkStatus::Completed,
                text_pos: TextPos {
                    start_index: window.text_pos.start_index + local_start,
                    end_index: window.text_pos.start_index + local_start + text_len,
                    start_line,
                    end_line,
                },
            })
        })
        .collect()
}

/// Builds the single fallback leaf covering a whole window whose
/// segmentation failed after exhausting every retry.
fn fallback_leaf(window: &Chunk, depth: u32, root: bool) -> Chunk {
    Chunk {
        id: format!("{}_fallback", window.id),
        text: window.text.clone(),
        kind: window.kind.clone(),
        depth,
        leaf: true,
        root,
        parent_id: None,
        parents: Vec::new(),
        index: 0,
        status: ChunkStatus::Completed,
        text_pos: window.text_pos,
    }
}

/// Partitions `children` into contiguous groups of `group_size`,
/// merging a trailing singleton group into the previous one when doing
/// so would not exceed `2 * level_size_bound` bytes of combined text.
fn group_indices(children: &[Chunk], group_size: usize, level_size_bound: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut i = 0;
    while i < children.len() {
        let end = (i + group_size).min(children.len());
        groups.push((i..end).collect());
        i = end;
    }

    if groups.len() >= 2 && groups.last().is_some_and(|g| g.len() == 1) {
        let single_idx = groups.last().and_then(|g| g.first().copied());
        if let Some(single_idx) = single_idx {
            let single_len = children[single_idx].text.len();
            let prev_group = &groups[groups.len() - 2];
            let prev_len: usize =
                prev_group.iter().map(|&idx| children[idx].text.len()).sum::<usize>() + prev_group.len() - 1;
            if prev_len + 1 + single_len <= 2 * level_size_bound.max(1) {
                if let Some(last) = groups.pop()
                    && let Some(prev) = groups.last_mut()
                {
                    prev.extend(last);
                }
            }
        }
    }

    groups
}

/// Builds the parent chunk for one group: text is the group's children
/// joined with `"\n"`, spanning their combined `TextPos`.
fn build_parent(children: &[Chunk], group: &[usize], depth: u32, root: bool) -> Chunk {
    let text = group.iter().map(|&i| children[i].text.as_str()).collect::<Vec<_>>().join("\n");
    let first = &children[group[0]];
    let last = &children[group[group.len() - 1]];

    Chunk {
        id: Chunk::new_id(),
        text,
        kind: first.kind.clone(),
        depth,
        leaf: false,
        root,
        parent_id: None,
        parents: Vec::new(),
        index: 0,
        status: ChunkStatus::Completed,
        text_pos: TextPos {
            start_index: first.text_pos.start_index,
            end_index: last.text_pos.end_index,
            start_line: first.text_pos.start_line,
            end_line: last.text_pos.end_line,
        },
    }
}

/// Assigns each child in `children` to the earliest parent in `parents`
/// (walked left to right, in lockstep with `children`) whose text
/// contains the child's text; falls back to a proportional split across
/// `parents` by position when containment cannot be established (spec
/// §4.9 step 6 and §9's flagged reconciliation heuristic).
///
/// Because [`build_parent`] always constructs a parent as the literal
/// `"\n"`-join of its own group, containment holds trivially here; the
/// fallback exists for completeness and is exercised directly by this
/// module's tests.
fn assign_parents_by_containment(children: &mut [Chunk], parents: &[Chunk]) {
    if parents.is_empty() {
        return;
    }
    let mut parent_idx = 0usize;
    let total = children.len().max(1);
    for (i, child) in children.iter_mut().enumerate() {
        while parent_idx + 1 < parents.len() && !parents[parent_idx].text.contains(child.text.as_str()) {
            parent_idx += 1;
        }
        let target = if parents[parent_idx].text.contains(child.text.as_str()) {
            parent_idx
        } else {
            ((i * parents.len()) / total).min(parents.len() - 1)
        };
        child.parent_id = Some(parents[target].id.clone());
        child.root = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkType;

    fn leaf(id: &str, text: &str, index: usize) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            kind: ChunkType::Text,
            depth: 2,
            leaf: true,
            root: false,
            parent_id: None,
            parents: Vec::new(),
            index,
            status: ChunkStatus::Completed,
            text_pos: TextPos { start_index: 0, end_index: text.len(), start_line: 1, end_line: 1 },
        }
    }

    #[test]
    fn group_indices_splits_into_fixed_size_groups() {
        let children: Vec<Chunk> = (0..6).map(|i| leaf(&i.to_string(), "x", i)).collect();
        let groups = group_indices(&children, 2, 1000);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    }

    #[test]
    fn group_indices_merges_trailing_singleton_within_bound() {
        let children: Vec<Chunk> = (0..5).map(|i| leaf(&i.to_string(), "x", i)).collect();
        let groups = group_indices(&children, 2, 1000);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3, 4]]);
    }

    #[test]
    fn group_indices_keeps_trailing_singleton_when_it_would_exceed_bound() {
        let mut children: Vec<Chunk> = (0..5).map(|i| leaf(&i.to_string(), "x", i)).collect();
        children[4].text = "y".repeat(500);
        let groups = group_indices(&children, 2, 10);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn build_parent_joins_children_with_newline() {
        let children = vec![leaf("a", "hello", 0), leaf("b", "world", 1)];
        let parent = build_parent(&children, &[0, 1], 1, true);
        assert_eq!(parent.text, "hello\nworld");
        assert!(parent.root);
        assert!(!parent.leaf);
        assert_eq!(parent.text_pos.start_index, 0);
    }

    #[test]
    fn assign_parents_by_containment_links_children_to_their_joining_parent() {
        let mut children = vec![leaf("a", "hello", 0), leaf("b", "world", 1), leaf("c", "third", 2)];
        let parents = vec![build_parent(&children, &[0, 1], 1, false), build_parent(&children, &[2], 1, false)];
        assign_parents_by_containment(&mut children, &parents);
        assert_eq!(children[0].parent_id, Some(parents[0].id.clone()));
        assert_eq!(children[1].parent_id, Some(parents[0].id.clone()));
        assert_eq!(children[2].parent_id, Some(parents[1].id.clone()));
        assert!(!children[0].root);
    }

    #[test]
    fn assign_parents_by_containment_falls_back_proportionally_on_mismatch() {
        let mut children = vec![leaf("a", "alpha", 0), leaf("b", "beta", 1)];
        let parents = vec![leaf("p0", "unrelated text", 0)];
        assign_parents_by_containment(&mut children, &parents);
        assert_eq!(children[0].parent_id, Some("p0".to_string()));
        assert_eq!(children[1].parent_id, Some("p0".to_string()));
    }

    #[test]
    fn split_window_into_leaves_translates_local_offsets() {
        let window = Chunk {
            id: "w1".to_string(),
            text: "hello world".to_string(),
            kind: ChunkType::Text,
            depth: 1,
            leaf: true,
            root: true,
            parent_id: None,
            parents: Vec::new(),
            index: 3,
            status: ChunkStatus::Completed,
            text_pos: TextPos { start_index: 100, end_index: 111, start_line: 5, end_line: 5 },
        };
        let positions = vec![Position::new(0, 5), Position::new(6, 11)];
        let leaves = split_window_into_leaves(&window, &positions, 2, false);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].text, "hello");
        assert_eq!(leaves[0].text_pos.start_index, 100);
        assert_eq!(leaves[1].text, "world");
        assert_eq!(leaves[1].text_pos.start_index, 106);
        assert!(leaves.iter().all(|l| l.leaf && !l.root));
    }

    #[test]
    fn fallback_leaf_covers_whole_window_with_suffixed_id() {
        let window = Chunk {
            id: "w7".to_string(),
            text: "whole window text".to_string(),
            kind: ChunkType::Text,
            depth: 1,
            leaf: true,
            root: true,
            parent_id: None,
            parents: Vec::new(),
            index: 0,
            status: ChunkStatus::Completed,
            text_pos: TextPos { start_index: 0, end_index: 18, start_line: 1, end_line: 1 },
        };
        let fallback = fallback_leaf(&window, 1, true);
        assert_eq!(fallback.id, "w7_fallback");
        assert_eq!(fallback.text, window.text);
    }
}
