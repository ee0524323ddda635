//! Content-type sniffing used by the public API's `ChunkFile` entry
//! point (spec §4.10): classify into the closed `ChunkType` set by
//! inspecting the first bytes of a file, falling back to its
//! extension, and finally to `text`.

use crate::model::ChunkType;

/// Number of leading bytes inspected for a magic-number match, matching
/// the spec's "first 512 bytes" sniffing window.
pub const SNIFF_WINDOW: usize = 512;

/// Classifies `bytes` (typically the first [`SNIFF_WINDOW`] bytes of a
/// file) by byte-signature, falling back to `None` if nothing matches
/// so the caller can fall through to extension-based detection.
#[must_use]
pub fn sniff_bytes(bytes: &[u8]) -> Option<ChunkType> {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];

    if window.starts_with(b"\x89PNG\r\n\x1a\n")
        || window.starts_with(b"\xff\xd8\xff")
        || window.starts_with(b"GIF87a")
        || window.starts_with(b"GIF89a")
        || (window.len() >= 12 && &window[0..4] == b"RIFF" && &window[8..12] == b"WEBP")
        || window.starts_with(b"BM")
    {
        return Some(ChunkType::Image);
    }

    if window.starts_with(b"ID3")
        || (window.len() >= 2 && window[0] == 0xff && window[1] & 0xe0 == 0xe0)
        || (window.len() >= 12 && &window[0..4] == b"RIFF" && &window[8..12] == b"WAVE")
        || window.starts_with(b"OggS")
        || window.starts_with(b"fLaC")
    {
        return Some(ChunkType::Audio);
    }

    if (window.len() >= 12 && &window[4..8] == b"ftyp")
        || window.starts_with(b"\x1aE\xdf\xa3")
        || window.starts_with(b"\x00\x00\x00\x1cftyp")
    {
        return Some(ChunkType::Video);
    }

    if let Ok(text) = std::str::from_utf8(window) {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if serde_json::from_str::<serde_json::Value>(text).is_ok()
                || serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
            {
                return Some(ChunkType::Json);
            }
        }
    }

    None
}

/// Known source-code file extensions, collapsed onto `ChunkType::Code`.
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "go", "js", "ts", "tsx", "jsx", "java", "c", "h", "cpp", "hpp", "cc", "rb", "sh",
    "bash", "php", "cs", "kt", "swift", "scala", "lua", "pl", "sql", "yaml", "yml", "toml",
];

/// Maps a file extension (without the leading dot) to a [`ChunkType`]
/// using `mime_guess` for image/audio/video/json MIME families and a
/// hand-maintained list for source code, falling back to `None` for
/// anything unrecognized.
#[must_use]
pub fn classify_extension(ext: &str) -> Option<ChunkType> {
    let ext = ext.to_ascii_lowercase();
    if CODE_EXTENSIONS.contains(&ext.as_str()) {
        return Some(ChunkType::Code);
    }
    if ext == "json" {
        return Some(ChunkType::Json);
    }
    if ext == "csv" {
        return Some(ChunkType::Csv);
    }
    let guess = mime_guess::from_ext(&ext).first()?;
    match guess.type_().as_str() {
        "image" => Some(ChunkType::Image),
        "audio" => Some(ChunkType::Audio),
        "video" => Some(ChunkType::Video),
        "text" => Some(ChunkType::Text),
        _ => None,
    }
}

/// Classifies a file by sniffing its leading bytes, then falling back
/// to its extension (from `path`), then to `Text` if the bytes are
/// valid UTF-8, finally to `Code` for a recognized extension only, or
/// `Text` as the last resort.
#[must_use]
pub fn detect_chunk_type(path: &std::path::Path, leading_bytes: &[u8]) -> ChunkType {
    if let Some(kind) = sniff_bytes(leading_bytes) {
        return kind;
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str())
        && let Some(kind) = classify_extension(ext)
    {
        return kind;
    }
    ChunkType::Text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn sniffs_png_signature() {
        let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
        bytes.extend_from_slice(&[0; 16]);
        assert_eq!(sniff_bytes(&bytes), Some(ChunkType::Image));
    }

    #[test]
    fn sniffs_json_object() {
        let bytes = br#"{"a": 1, "b": [1,2,3]}"#;
        assert_eq!(sniff_bytes(bytes), Some(ChunkType::Json));
    }

    #[test]
    fn classifies_rust_extension_as_code() {
        assert_eq!(classify_extension("rs"), Some(ChunkType::Code));
    }

    #[test]
    fn detect_falls_back_to_text() {
        let kind = detect_chunk_type(Path::new("notes.md"), b"just some prose");
        assert_eq!(kind, ChunkType::Text);
    }

    #[test]
    fn detect_uses_extension_when_sniff_is_inconclusive() {
        let kind = detect_chunk_type(Path::new("main.rs"), b"fn main() {}");
        assert_eq!(kind, ChunkType::Code);
    }
}
