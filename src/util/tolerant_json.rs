//! Tolerant JSON decoding (C6).
//!
//! Large-language-model output is frequently truncated mid-stream or
//! mid-response. [`tolerant_parse`] first attempts a strict decode;
//! on failure it applies a conservative repair pass (balance
//! brackets/braces, close a trailing open string, drop trailing commas,
//! null out bare unquoted identifiers) and retries once.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ChunkError;

/// Strictly parses `input` as JSON; on failure, repairs common
/// truncation/formatting issues and retries once.
///
/// # Errors
///
/// Returns [`ChunkError::JsonRepair`] if the input is still not valid
/// JSON after repair, or does not deserialize into `T`.
pub fn tolerant_parse<T: DeserializeOwned>(input: &str) -> Result<T, ChunkError> {
    if let Ok(value) = serde_json::from_str::<T>(input) {
        return Ok(value);
    }

    let repaired = repair(input);
    serde_json::from_str::<T>(&repaired).map_err(|e| ChunkError::JsonRepair {
        message: format!("{e} (after repair: {repaired:?})"),
    })
}

/// Parses into a generic [`serde_json::Value`] rather than a concrete
/// type, useful for the stream parser's best-effort incremental checks.
pub fn tolerant_parse_value(input: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(input) {
        return Some(v);
    }
    serde_json::from_str::<Value>(&repair(input)).ok()
}

/// Applies a best-effort repair pass to a JSON fragment that may be
/// truncated or malformed: closes a trailing open string, drops a
/// trailing comma before a closing bracket/brace, balances unclosed
/// `{`/`[`, and replaces bare (unquoted, non-keyword) identifiers with
/// `null`.
fn repair(input: &str) -> String {
    let trimmed = input.trim();
    let quoted = close_trailing_string(trimmed);
    let bare_fixed = replace_bare_identifiers(&quoted);
    let balanced = balance_brackets(&bare_fixed);
    drop_trailing_commas(&balanced)
}

/// If the input has an odd number of unescaped `"` characters, appends
/// one to close the trailing open string.
fn close_trailing_string(input: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ => {}
        }
    }
    if in_string {
        format!("{input}\"")
    } else {
        input.to_string()
    }
}

/// Appends closing brackets/braces so every opener outside of strings
/// is matched, in reverse order of opening.
fn balance_brackets(input: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    let mut out = input.to_string();
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

/// Removes a comma that directly precedes a closing `}`/`]`, ignoring
/// whitespace between them.
fn drop_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Replaces bare (unquoted) identifiers that are not JSON keywords with
/// `null`. This is a narrow heuristic aimed at LLM output that emits an
/// unquoted placeholder (e.g. `"key": undefined`) rather than valid
/// JSON, not a general-purpose JSON5 parser.
fn replace_bare_identifiers(input: &str) -> String {
    const KEYWORDS: [&str; 3] = ["true", "false", "null"];
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            if KEYWORDS.contains(&ident.as_str()) {
                out.push_str(&ident);
            } else {
                out.push_str("null");
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}
