//! Chunk Manager (C3).
//!
//! Tracks chunks by id and by parent, and propagates `completed` status
//! upward once every child of a parent has completed. Chunks are
//! retained only for the duration of a top-level call; callers drop
//! the manager once the call returns.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{Chunk, ChunkStatus};

/// Owns chunks by id for the lifetime of a single chunking call, plus
/// a parent→children index used to propagate completion status
/// upward.
///
/// All operations take `&self` and serialize through a single mutex;
/// contention is low in practice because fan-out is per depth level,
/// not per manager call.
#[derive(Default)]
pub struct ChunkManager {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    chunks: HashMap<String, Chunk>,
    children: HashMap<String, Vec<String>>,
}

impl ChunkManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `chunk`, appending its id to its parent's child list
    /// if it has one.
    pub fn add(&self, chunk: Chunk) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(parent_id) = chunk.parent_id.clone() {
            inner.children.entry(parent_id).or_default().push(chunk.id.clone());
        }
        inner.chunks.insert(chunk.id.clone(), chunk);
    }

    /// Sets `id`'s status. If the new status is `Completed` and the
    /// chunk is a leaf with a parent, recursively marks ancestors
    /// `Completed` whose entire child set has completed. If the new
    /// status is `Failed`, recursively marks ancestors `Failed` too,
    /// since spec invariant 6 requires a parent with any failed
    /// descendant to never read as `Completed`.
    pub fn update_status(&self, id: &str, status: ChunkStatus) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (is_leaf, parent_id) = match inner.chunks.get_mut(id) {
            Some(chunk) => {
                chunk.status = status;
                (chunk.leaf, chunk.parent_id.clone())
            }
            None => return,
        };

        match status {
            ChunkStatus::Completed if is_leaf => {
                if let Some(parent_id) = parent_id {
                    Self::check_parent(&mut inner, &parent_id);
                }
            }
            ChunkStatus::Failed => {
                if let Some(parent_id) = parent_id {
                    Self::propagate_failure(&mut inner, &parent_id);
                }
            }
            _ => {}
        }
    }

    /// Marks `parent_id` `Completed` if every one of its children is
    /// `Completed`, then recurses to its own parent.
    fn check_parent(inner: &mut Inner, parent_id: &str) {
        let children = inner.children.get(parent_id).cloned().unwrap_or_default();
        if children.is_empty() {
            return;
        }
        let all_completed = children
            .iter()
            .all(|id| inner.chunks.get(id).is_some_and(|c| c.status == ChunkStatus::Completed));
        if !all_completed {
            return;
        }
        let grandparent = match inner.chunks.get_mut(parent_id) {
            Some(chunk) => {
                chunk.status = ChunkStatus::Completed;
                chunk.parent_id.clone()
            }
            None => return,
        };
        if let Some(grandparent) = grandparent {
            Self::check_parent(inner, &grandparent);
        }
    }

    /// Marks `parent_id` `Failed` and recurses upward; a single failed
    /// descendant permanently excludes every ancestor from `Completed`.
    fn propagate_failure(inner: &mut Inner, parent_id: &str) {
        let grandparent = match inner.chunks.get_mut(parent_id) {
            Some(chunk) => {
                chunk.status = ChunkStatus::Failed;
                chunk.parent_id.clone()
            }
            None => return,
        };
        if let Some(grandparent) = grandparent {
            Self::propagate_failure(inner, &grandparent);
        }
    }

    /// Walks `chunk`'s `parent_id` chain to the root, returning ids
    /// root-first. Returns an empty list for a root chunk.
    #[must_use]
    pub fn parents_of(&self, chunk: &Chunk) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut ids = Vec::new();
        let mut current = chunk.parent_id.clone();
        while let Some(id) = current {
            current = inner.chunks.get(&id).and_then(|c| c.parent_id.clone());
            ids.push(id);
        }
        ids.reverse();
        ids
    }

    /// Returns a clone of the chunk registered under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Chunk> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.chunks.get(id).cloned()
    }

    /// Returns the child ids registered under `parent_id`, in the order
    /// added.
    #[must_use]
    pub fn children_of(&self, parent_id: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.children.get(parent_id).cloned().unwrap_or_default()
    }

    /// Rewrites `id`'s parent link to `parent_id`, clearing `root` on
    /// the child and registering it under the parent's child list.
    ///
    /// Used by the Semantic Chunker (C9), which discovers a leaf's
    /// parent only after the parent is built — later than the leaf's
    /// own registration — unlike the Structured Chunker's top-down
    /// construction where the parent always exists first.
    pub fn set_parent(&self, id: &str, parent_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(chunk) = inner.chunks.get_mut(id) {
            chunk.parent_id = Some(parent_id.to_string());
            chunk.root = false;
        }
        inner.children.entry(parent_id.to_string()).or_default().push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkType, TextPos};

    fn make_chunk(id: &str, parent_id: Option<&str>, leaf: bool) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: "x".to_string(),
            kind: ChunkType::Text,
            depth: 1,
            leaf,
            root: parent_id.is_none(),
            parent_id: parent_id.map(str::to_string),
            parents: Vec::new(),
            index: 0,
            status: ChunkStatus::Pending,
            text_pos: TextPos { start_index: 0, end_index: 1, start_line: 1, end_line: 1 },
        }
    }

    #[test]
    fn completing_all_leaves_completes_parent() {
        let manager = ChunkManager::new();
        manager.add(make_chunk("parent", None, false));
        manager.add(make_chunk("leaf1", Some("parent"), true));
        manager.add(make_chunk("leaf2", Some("parent"), true));

        manager.update_status("leaf1", ChunkStatus::Completed);
        assert_eq!(manager.get("parent").unwrap_or_else(|| unreachable!()).status, ChunkStatus::Pending);

        manager.update_status("leaf2", ChunkStatus::Completed);
        assert_eq!(manager.get("parent").unwrap_or_else(|| unreachable!()).status, ChunkStatus::Completed);
    }

    #[test]
    fn a_single_failed_leaf_prevents_parent_completion() {
        let manager = ChunkManager::new();
        manager.add(make_chunk("parent", None, false));
        manager.add(make_chunk("leaf1", Some("parent"), true));
        manager.add(make_chunk("leaf2", Some("parent"), true));

        manager.update_status("leaf1", ChunkStatus::Failed);
        manager.update_status("leaf2", ChunkStatus::Completed);

        assert_eq!(manager.get("parent").unwrap_or_else(|| unreachable!()).status, ChunkStatus::Failed);
    }

    #[test]
    fn propagates_through_multiple_levels() {
        let manager = ChunkManager::new();
        manager.add(make_chunk("root", None, false));
        manager.add(make_chunk("mid", Some("root"), false));
        manager.add(make_chunk("leaf", Some("mid"), true));

        manager.update_status("leaf", ChunkStatus::Completed);
        assert_eq!(manager.get("mid").unwrap_or_else(|| unreachable!()).status, ChunkStatus::Completed);
        assert_eq!(manager.get("root").unwrap_or_else(|| unreachable!()).status, ChunkStatus::Completed);
    }

    #[test]
    fn parents_of_returns_root_first() {
        let manager = ChunkManager::new();
        manager.add(make_chunk("root", None, false));
        manager.add(make_chunk("mid", Some("root"), false));
        let leaf = make_chunk("leaf", Some("mid"), true);
        manager.add(leaf.clone());

        assert_eq!(manager.parents_of(&leaf), vec!["root".to_string(), "mid".to_string()]);
    }
}
