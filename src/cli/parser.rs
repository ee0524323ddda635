//! Command-line argument parsing for the `chunkrag` binary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// `chunkrag`: hierarchical text chunking for retrieval-augmented generation.
///
/// Splits a file (or stdin) into a tree of chunks, either mechanically
/// (structured mode) or by asking an LLM to mark natural segment
/// boundaries (semantic mode), and prints the resulting chunks.
#[derive(Parser, Debug)]
#[command(name = "chunkrag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for emitted chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line (the full [`chunkrag::model::Chunk`]).
    Json,
    /// A short human-readable summary line per chunk.
    Text,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a file (or `-` for stdin) into a chunk hierarchy.
    #[command(after_help = r#"Examples:
  chunkrag chunk notes.txt --size 500 --overlap 50
  chunkrag chunk src/lib.rs --preset code
  cat notes.txt | chunkrag chunk - --size 500 --format json
  chunkrag chunk report.txt --semantic --connector openai --size 200 --max-depth 3
"#)]
    Chunk(ChunkArgs),
}

/// Arguments shared by the `chunk` command.
#[derive(clap::Args, Debug)]
pub struct ChunkArgs {
    /// Path to the input file, or `-` to read from stdin.
    pub path: PathBuf,

    /// Target byte size of a leaf chunk.
    #[arg(long)]
    pub size: Option<usize>,

    /// Bytes of overlap between sibling chunks.
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Number of hierarchy levels (1-5). Defaults to 1, or the
    /// preset's own depth when `--preset` is given.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Growth factor between adjacent levels.
    #[arg(long)]
    pub size_multiplier: Option<u32>,

    /// Max concurrent callback workers.
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Content kind; auto-detected from the file when omitted.
    #[arg(long)]
    pub kind: Option<String>,

    /// Apply a `NewStructuredOptions`-style preset (`code`, `json`, or
    /// `media`) instead of specifying `--size`/`--overlap` by hand.
    #[arg(long, conflicts_with_all = ["size", "overlap"])]
    pub preset: Option<String>,

    /// Use the LLM-driven semantic chunker instead of the structured one.
    #[arg(long)]
    pub semantic: bool,

    /// Connector id to resolve (semantic mode only).
    #[arg(long, default_value_t = crate::config::DEFAULT_CONNECTOR_ID.to_string())]
    pub connector: String,

    /// Chat model override for the connector (semantic mode only).
    #[arg(long, env = "CHUNKRAG_MODEL")]
    pub model: Option<String>,

    /// Base URL of the chat completions endpoint (semantic mode only).
    #[arg(long, env = "CHUNKRAG_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer API key for the connector (semantic mode only).
    #[arg(long, env = "CHUNKRAG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Byte size of each LLM context window; derived from `size *
    /// max_depth * 3` when omitted (semantic mode only).
    #[arg(long)]
    pub context_size: Option<usize>,

    /// Use function-calling for segment output instead of free-form JSON.
    #[arg(long)]
    pub toolcall: bool,

    /// Retries per window before falling back to a single chunk.
    #[arg(long)]
    pub max_retry: Option<u32>,

    /// Max concurrent LLM calls (semantic mode only).
    #[arg(long)]
    pub semantic_max_concurrent: Option<usize>,

    /// Extra JSON object merged into the LLM request body.
    #[arg(long)]
    pub options: Option<String>,

    /// Custom system prompt for the segmentation model.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
