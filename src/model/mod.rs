//! Core data model: [`Chunk`], [`Position`], and the option records that
//! configure a chunking run.

mod chunk;
mod options;
mod position;

pub use chunk::{Chunk, ChunkStatus, ChunkType, TextPos};
pub use options::{ChunkingOptions, SemanticOptions};
pub use position::{FlexibleNumber, Position};
