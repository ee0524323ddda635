//! UTF-8 edge repair (C1).
//!
//! Cutting an arbitrary byte slice at byte offsets, as the structured
//! chunker does, can land in the middle of a multibyte UTF-8 sequence
//! at either end. [`repair_utf8_edges`] trims the slice down to the
//! largest valid UTF-8 substring it contains.

/// Returns the largest valid UTF-8 substring of `bytes`, advancing past
/// any leading continuation bytes and contracting from the end until
/// the remainder validates. Returns an empty string if nothing in
/// `bytes` validates as UTF-8.
#[must_use]
pub fn repair_utf8_edges(bytes: &[u8]) -> String {
    repair_utf8_edges_with_offset(bytes).1
}

/// As [`repair_utf8_edges`], but also returns how many leading bytes of
/// `bytes` were dropped to reach the returned string — needed by callers
/// that must translate the repaired text back into absolute offsets in
/// the original source.
#[must_use]
pub fn repair_utf8_edges_with_offset(bytes: &[u8]) -> (usize, String) {
    if bytes.is_empty() {
        return (0, String::new());
    }

    // A continuation byte has the form 10xxxxxx; skip past any at the
    // start, since they cannot begin a valid UTF-8 sequence on their own.
    let mut start = 0;
    while start < bytes.len() && is_continuation_byte(bytes[start]) {
        start += 1;
    }

    let mut end = bytes.len();
    loop {
        if start >= end {
            return (start, String::new());
        }
        match std::str::from_utf8(&bytes[start..end]) {
            Ok(s) => return (start, s.to_string()),
            Err(e) => {
                // valid_up_to() tells us how much of the prefix is good;
                // anything beyond that at the tail is the broken part.
                let valid_up_to = e.valid_up_to();
                if valid_up_to > 0 {
                    end = start + valid_up_to;
                } else {
                    // The very first byte is invalid; drop it and retry.
                    start += 1;
                }
            }
        }
    }
}

const fn is_continuation_byte(b: u8) -> bool {
    b & 0b1100_0000 == 0b1000_0000
}
