//! The central [`Chunk`] entity and its supporting enums.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Content kind of a chunk: a tag only, propagated from the caller or
/// inferred by sniffing / extension lookup. Closed set per the spec,
/// with an escape hatch for forward compatibility.
///
/// Serializes as a plain lowercase string (`"text"`, `"code"`, ...),
/// with [`ChunkType::Other`] carrying its inner string through verbatim
/// so the wire format stays a flat string regardless of variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkType {
    /// Plain prose text.
    Text,
    /// Source code in any language.
    Code,
    /// JSON data.
    Json,
    /// Image bytes.
    Image,
    /// Audio bytes.
    Audio,
    /// Video bytes.
    Video,
    /// Delimited tabular data.
    Csv,
    /// A content kind outside the closed set, carried through verbatim.
    Other(String),
}

impl Default for ChunkType {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Code => write!(f, "code"),
            Self::Json => write!(f, "json"),
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Csv => write!(f, "csv"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ChunkType {
    fn from(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "code" => Self::Code,
            "json" => Self::Json,
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "csv" => Self::Csv,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for ChunkType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChunkType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// Lifecycle status of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Created but not yet offered to the callback.
    Pending,
    /// Offered to the callback; awaiting its result.
    Processing,
    /// The callback accepted the chunk (leaves) or every child completed
    /// (parents).
    Completed,
    /// The callback rejected the chunk, or at least one descendant failed.
    Failed,
}

/// Byte range and 1-based inclusive/exclusive line numbers locating a
/// chunk's text within the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPos {
    /// Inclusive start byte offset in the original source.
    pub start_index: usize,
    /// Exclusive end byte offset in the original source.
    pub end_index: usize,
    /// 1-based line number containing `start_index`.
    pub start_line: usize,
    /// 1-based line number containing the byte before `end_index`.
    pub end_line: usize,
}

/// A contiguous region of the source text with metadata, emitted
/// exactly once to the caller's callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable opaque identifier, unique across the run.
    pub id: String,
    /// The chunk's textual payload (always valid UTF-8).
    pub text: String,
    /// Content kind tag.
    #[serde(rename = "type")]
    pub kind: ChunkType,
    /// Hierarchy level; 1 is the outermost, increasing downward.
    pub depth: u32,
    /// True iff the chunk is not further subdivided.
    pub leaf: bool,
    /// True iff the chunk has no parent.
    pub root: bool,
    /// Id of the parent at `depth - 1`; `None` for root chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Ancestor ids from root down to the immediate parent. Populated
    /// lazily by [`crate::manager::ChunkManager::parents_of`]; empty
    /// until then.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Zero-based position within this chunk's own depth level, in
    /// textual order, after all output at that level has been produced.
    pub index: usize,
    /// Lifecycle status.
    pub status: ChunkStatus,
    /// Byte range and line numbers within the original source.
    pub text_pos: TextPos,
}

impl Chunk {
    /// Allocates a fresh, globally unique chunk id.
    #[must_use]
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("text", ChunkType::Text)]
    #[test_case("code", ChunkType::Code)]
    #[test_case("json", ChunkType::Json)]
    #[test_case("image", ChunkType::Image)]
    #[test_case("audio", ChunkType::Audio)]
    #[test_case("video", ChunkType::Video)]
    #[test_case("csv", ChunkType::Csv)]
    fn chunk_type_from_str_matches_closed_set(raw: &str, expected: ChunkType) {
        assert_eq!(ChunkType::from(raw), expected);
        assert_eq!(ChunkType::from(raw).to_string(), raw);
    }

    #[test]
    fn chunk_type_from_unknown_str_is_other() {
        assert_eq!(ChunkType::from("wasm"), ChunkType::Other("wasm".to_string()));
    }

    #[test]
    fn chunk_type_display_roundtrip() {
        assert_eq!(ChunkType::Text.to_string(), "text");
        assert_eq!(ChunkType::Other("wasm".to_string()).to_string(), "wasm");
    }

    #[test]
    fn chunk_type_serializes_lowercase() {
        let json = serde_json::to_string(&ChunkType::Json).unwrap_or_default();
        assert_eq!(json, "\"json\"");
    }

    #[test]
    fn new_id_is_unique() {
        let a = Chunk::new_id();
        let b = Chunk::new_id();
        assert_ne!(a, b);
    }
}
