//! Byte-range position within a parent chunk's text.

use serde::{Deserialize, Serialize};

use crate::error::ChunkError;

/// A byte range `[start, end)` relative to a parent chunk's `Text`.
///
/// Invariant: `0 <= start < end <= len(text)`. A list of positions
/// emitted for the same parent must be disjoint and monotonically
/// increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl Position {
    /// Creates a position, without validating it against any particular
    /// text length. Use [`Position::validate_list`] to check a full list
    /// against the text it was derived from.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Validates that every position in `positions` satisfies
    /// `0 <= start < end <= len`, and that the list is disjoint and
    /// monotonically increasing when sorted by `start`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidPositions`] on the first violation
    /// found.
    pub fn validate_list(positions: &[Self], len: usize) -> Result<(), ChunkError> {
        if positions.is_empty() {
            return Err(ChunkError::InvalidPositions {
                message: "position list is empty".to_string(),
            });
        }
        let mut prev_end = 0usize;
        for (i, pos) in positions.iter().enumerate() {
            if pos.start >= pos.end {
                return Err(ChunkError::InvalidPositions {
                    message: format!(
                        "position {i} has start ({}) >= end ({})",
                        pos.start, pos.end
                    ),
                });
            }
            if pos.end > len {
                return Err(ChunkError::InvalidPositions {
                    message: format!("position {i} end ({}) exceeds text length ({len})", pos.end),
                });
            }
            if pos.start < prev_end {
                return Err(ChunkError::InvalidPositions {
                    message: format!(
                        "position {i} starts ({}) before the previous position ended ({prev_end})",
                        pos.start
                    ),
                });
            }
            prev_end = pos.end;
        }
        Ok(())
    }
}

/// A numeric value that may arrive from the LLM as a JSON integer,
/// float, or numeric string. Coerced once at the parse boundary into a
/// plain `usize`; no caller downstream ever sees the raw variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlexibleNumber {
    /// A JSON integer.
    Int(i64),
    /// A JSON float; truncated toward zero when coerced.
    Float(f64),
    /// A numeric value encoded as a JSON string.
    Text(String),
}

impl FlexibleNumber {
    /// Coerces into a `usize`, truncating floats toward zero and
    /// parsing numeric strings (integer first, then float).
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidPositions`] if the value cannot be
    /// interpreted as a non-negative integer.
    pub fn coerce(&self) -> Result<usize, ChunkError> {
        match self {
            Self::Int(v) => usize::try_from(*v).map_err(|_| ChunkError::InvalidPositions {
                message: format!("negative position value: {v}"),
            }),
            Self::Float(v) => {
                if *v < 0.0 {
                    return Err(ChunkError::InvalidPositions {
                        message: format!("negative position value: {v}"),
                    });
                }
                Ok(v.trunc() as usize)
            }
            Self::Text(s) => s
                .parse::<i64>()
                .map(|v| v as f64)
                .or_else(|_| s.parse::<f64>())
                .ok()
                .filter(|v| *v >= 0.0)
                .map(|v| v.trunc() as usize)
                .ok_or_else(|| ChunkError::InvalidPositions {
                    message: format!("could not parse position string {s:?}"),
                }),
        }
    }
}
