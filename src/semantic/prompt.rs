//! Prompt and tool-schema construction for the LLM Segmentation Driver (C8).

use serde_json::{Value, json};

/// Builds the default system prompt instructing the model to mark
/// natural segment boundaries inside a window of at most `max_size`
/// characters, given as a `<byte-offset>: <character>` listing.
#[must_use]
pub fn default_prompt(max_size: usize) -> String {
    format!(
        "You segment text into natural semantic units (sentences, \
         paragraphs, or logically related groups of lines). You will be \
         given the text as a numbered list of `<byte offset>: <character>` \
         pairs, one per line, covering up to {max_size} characters. Using \
         those byte offsets, return the start and end byte offset of each \
         segment you identify. Segments must be non-overlapping, listed in \
         increasing order, and together should cover all of the meaningful \
         content. `end_pos` is exclusive: it is the byte offset one past \
         the segment's last character."
    )
}

/// Renders `text` as the `<byte offset>: <character>\n` listing the
/// user message carries, so the model can reference byte offsets
/// directly even across multibyte characters.
#[must_use]
pub fn chars_listing(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4);
    for (offset, ch) in text.char_indices() {
        out.push_str(&offset.to_string());
        out.push_str(": ");
        out.push(ch);
        out.push('\n');
    }
    out
}

/// The `segment_text` function-calling tool schema used when
/// [`crate::model::SemanticOptions::toolcall`] is set.
#[must_use]
pub fn segment_tool_schema() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": "segment_text",
            "description": "Report the natural segment boundaries found in the text, as byte offsets.",
            "parameters": {
                "type": "object",
                "properties": {
                    "segments": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "start_pos": { "type": "integer" },
                                "end_pos": { "type": "integer" }
                            },
                            "required": ["start_pos", "end_pos"]
                        }
                    }
                },
                "required": ["segments"]
            }
        }
    })
}

/// Forces the model to call `segment_text` rather than answering in free form.
#[must_use]
pub fn segment_tool_choice() -> Value {
    json!({ "type": "function", "function": { "name": "segment_text" } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_listing_uses_byte_offsets_for_multibyte() {
        let listing = chars_listing("Hi你好");
        assert!(listing.contains("0: H"));
        assert!(listing.contains("1: i"));
        // '你' starts at byte 2 and is three bytes wide.
        assert!(listing.contains("2: 你"));
        assert!(listing.contains("5: 好"));
    }

    #[test]
    fn default_prompt_mentions_max_size() {
        assert!(default_prompt(1200).contains("1200"));
    }
}
