//! Configuration records for a chunking run.

use super::chunk::ChunkType;

/// Default bytes of overlap between sibling chunks, used whenever
/// `overlap` is unset or invalid.
pub const DEFAULT_OVERLAP: usize = 50;
/// Default growth factor between adjacent hierarchy levels.
pub const DEFAULT_SIZE_MULTIPLIER: u32 = 3;
/// Default cap on concurrent structured-chunker callback workers.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;
/// Default cap on concurrent LLM calls in the semantic chunker.
pub const DEFAULT_SEMANTIC_MAX_CONCURRENT: usize = 4;
/// Default number of retries per semantic window before falling back.
pub const DEFAULT_MAX_RETRY: u32 = 9;
/// Lowest permitted hierarchy depth.
pub const MIN_DEPTH: u32 = 1;
/// Highest permitted hierarchy depth.
pub const MAX_DEPTH_CAP: u32 = 5;

/// Options controlling a structured (and, when [`SemanticOptions`] is
/// present, semantic) chunking run.
///
/// Invalid fields are silently clamped/defaulted on construction via
/// [`ChunkingOptions::normalize`]; the engine never fails a run merely
/// because a caller passed `overlap: 0`.
#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    /// Content kind; auto-detected by the public API entry points when
    /// left as the default.
    pub kind: Option<ChunkType>,
    /// Target byte size of a leaf chunk.
    pub size: usize,
    /// Bytes of overlap between sibling chunks at the same depth.
    pub overlap: usize,
    /// Number of hierarchy levels, clamped to `[1, 5]`.
    pub max_depth: u32,
    /// Growth factor between adjacent levels.
    pub size_multiplier: u32,
    /// Max concurrent callback workers for structured fan-out.
    pub max_concurrent: usize,
    /// Present iff this run uses the semantic (LLM-driven) chunker.
    pub semantic: Option<SemanticOptions>,
}

impl ChunkingOptions {
    /// Creates options with the given target leaf size and otherwise
    /// spec-default values, then normalizes them.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            kind: None,
            size,
            overlap: DEFAULT_OVERLAP,
            max_depth: 1,
            size_multiplier: DEFAULT_SIZE_MULTIPLIER,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            semantic: None,
        }
        .normalized()
    }

    /// Clamps/defaults every field to the ranges described in the
    /// spec's options table, returning a new, always-valid record.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.overlap == 0 || self.overlap > self.size {
            self.overlap = DEFAULT_OVERLAP.min(self.size.max(1));
        }
        self.max_depth = self.max_depth.clamp(MIN_DEPTH, MAX_DEPTH_CAP);
        if self.size_multiplier == 0 {
            self.size_multiplier = DEFAULT_SIZE_MULTIPLIER;
        }
        if self.max_concurrent == 0 {
            self.max_concurrent = DEFAULT_MAX_CONCURRENT;
        }
        if let Some(sem) = self.semantic.as_mut() {
            sem.normalize(self.size, self.max_depth);
        }
        self
    }

    /// Presets matching `NewStructuredOptions` for the given content
    /// kind: code/JSON get a larger, deeper split; everything else
    /// (including media) gets a smaller, shallow one.
    #[must_use]
    pub fn preset_for(kind: &ChunkType) -> Self {
        match kind {
            ChunkType::Code | ChunkType::Json => Self {
                kind: Some(kind.clone()),
                size: 800,
                overlap: 100,
                max_depth: 3,
                size_multiplier: 3,
                max_concurrent: 10,
                semantic: None,
            },
            _ => Self {
                kind: Some(kind.clone()),
                size: 300,
                overlap: 20,
                max_depth: 1,
                size_multiplier: 3,
                max_concurrent: 10,
                semantic: None,
            },
        }
    }
}

/// Options controlling the LLM-driven semantic chunker.
#[derive(Debug, Clone)]
pub struct SemanticOptions {
    /// Id of the connector to resolve via the connector registry.
    pub connector: String,
    /// Byte size of each LLM input window; `0` means "derive from
    /// `size * max_depth * 3`" during normalization.
    pub context_size: usize,
    /// Extra JSON object merged into the LLM request body.
    pub options: serde_json::Value,
    /// Custom system prompt; `None` uses the built-in default.
    pub prompt: Option<String>,
    /// Use function-calling (`segment_text` tool) instead of free-form
    /// JSON in the message content.
    pub toolcall: bool,
    /// Retries per window before falling back to a single chunk.
    pub max_retry: u32,
    /// Max concurrent LLM calls, distinct from
    /// [`ChunkingOptions::max_concurrent`].
    pub max_concurrent: usize,
}

impl SemanticOptions {
    /// Creates semantic options for the given connector id, with all
    /// other fields at spec defaults.
    #[must_use]
    pub fn new(connector: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
            context_size: 0,
            options: serde_json::Value::Null,
            prompt: None,
            toolcall: false,
            max_retry: DEFAULT_MAX_RETRY,
            max_concurrent: DEFAULT_SEMANTIC_MAX_CONCURRENT,
        }
    }

    fn normalize(&mut self, size: usize, max_depth: u32) {
        if self.context_size == 0 {
            self.context_size = size.saturating_mul(max_depth as usize).saturating_mul(3);
        }
        if self.max_concurrent == 0 {
            self.max_concurrent = DEFAULT_SEMANTIC_MAX_CONCURRENT;
        }
        if !self.options.is_object() && !self.options.is_null() {
            // Malformed extra payload: drop it rather than fail the run.
            self.options = serde_json::Value::Null;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalized_overlap_never_exceeds_size(size in 1usize..10_000, overlap in 0usize..20_000) {
            let opts = ChunkingOptions { kind: None, size, overlap, max_depth: 1, size_multiplier: 3, max_concurrent: 10, semantic: None }.normalized();
            prop_assert!(opts.overlap <= opts.size.max(1));
        }

        #[test]
        fn normalized_max_depth_is_always_in_range(max_depth in 0u32..1000) {
            let opts = ChunkingOptions { kind: None, size: 100, overlap: 10, max_depth, size_multiplier: 3, max_concurrent: 10, semantic: None }.normalized();
            prop_assert!((MIN_DEPTH..=MAX_DEPTH_CAP).contains(&opts.max_depth));
        }
    }

    #[test]
    fn normalize_defaults_invalid_overlap() {
        let opts = ChunkingOptions {
            kind: None,
            size: 100,
            overlap: 0,
            max_depth: 1,
            size_multiplier: 3,
            max_concurrent: 10,
            semantic: None,
        }
        .normalized();
        assert_eq!(opts.overlap, 50);
    }

    #[test]
    fn normalize_rejects_overlap_exceeding_size() {
        let opts = ChunkingOptions {
            kind: None,
            size: 10,
            overlap: 500,
            max_depth: 1,
            size_multiplier: 3,
            max_concurrent: 10,
            semantic: None,
        }
        .normalized();
        assert!(opts.overlap <= opts.size.max(1));
    }

    #[test]
    fn normalize_clamps_max_depth() {
        let opts = ChunkingOptions::new(100);
        let mut opts = opts;
        opts.max_depth = 99;
        let opts = opts.normalized();
        assert_eq!(opts.max_depth, MAX_DEPTH_CAP);
    }

    #[test]
    fn semantic_context_size_derives_from_size_and_depth() {
        let mut opts = ChunkingOptions::new(500);
        opts.max_depth = 2;
        opts.semantic = Some(SemanticOptions::new("openai"));
        let opts = opts.normalized();
        let sem = opts.semantic.unwrap_or_else(|| unreachable!());
        assert_eq!(sem.context_size, 500 * 2 * 3);
    }

    #[test]
    fn preset_for_code_matches_spec_table() {
        let opts = ChunkingOptions::preset_for(&ChunkType::Code);
        assert_eq!(opts.size, 800);
        assert_eq!(opts.overlap, 100);
        assert_eq!(opts.max_depth, 3);
    }

    #[test]
    fn preset_for_media_matches_spec_table() {
        let opts = ChunkingOptions::preset_for(&ChunkType::Image);
        assert_eq!(opts.size, 300);
        assert_eq!(opts.overlap, 20);
        assert_eq!(opts.max_depth, 1);
    }
}
