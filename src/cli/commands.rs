//! CLI command implementations.

use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use chunkrag::model::{ChunkType, ChunkingOptions, SemanticOptions};
use chunkrag::{ReqwestTransport, StreamingTransport, callback, chunk_file, chunk_stream};

use crate::cli::parser::{ChunkArgs, OutputFormat};
use crate::config::build_registry;

/// Runs the `chunk` command: builds [`ChunkingOptions`] from `args`,
/// opens the input, and streams the resulting chunks to stdout.
pub async fn run_chunk(args: ChunkArgs) -> Result<()> {
    let opts = build_options(&args)?;
    let format = args.format;

    let callback = callback::boxed(move |chunk| async move {
        print_chunk(&chunk, format);
        Ok(())
    });

    let connectors = build_registry(
        &args.connector,
        args.model.clone(),
        args.base_url.clone(),
        args.api_key.clone(),
    );
    let transport: Arc<dyn StreamingTransport> = Arc::new(ReqwestTransport::new());
    let cancel = CancellationToken::new();

    if args.path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).context("failed to read stdin")?;
        chunk_stream(Cursor::new(buf), &opts, &connectors, transport, callback, cancel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to process chunking: {e}"))?;
    } else {
        chunk_file(&args.path, &opts, &connectors, transport, callback, cancel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to process chunking: {e}"))?;
    }

    Ok(())
}

fn build_options(args: &ChunkArgs) -> Result<ChunkingOptions> {
    let kind = args.kind.as_deref().map(ChunkType::from);

    let mut opts = if let Some(preset) = &args.preset {
        let preset_kind = match preset.as_str() {
            "code" => ChunkType::Code,
            "json" => ChunkType::Json,
            "media" | "default" => ChunkType::Image,
            other => bail!("unknown preset {other:?}; expected code, json, or media"),
        };
        ChunkingOptions::preset_for(&preset_kind)
    } else {
        let Some(size) = args.size else {
            bail!("--size is required unless --preset is given");
        };
        ChunkingOptions {
            kind: None,
            size,
            overlap: args.overlap.unwrap_or(50),
            max_depth: args.max_depth.unwrap_or(1),
            size_multiplier: args.size_multiplier.unwrap_or(3),
            max_concurrent: args.max_concurrent.unwrap_or(10),
            semantic: None,
        }
    };

    if let Some(max_depth) = args.max_depth {
        opts.max_depth = max_depth;
    }
    if let Some(size_multiplier) = args.size_multiplier {
        opts.size_multiplier = size_multiplier;
    }
    if let Some(max_concurrent) = args.max_concurrent {
        opts.max_concurrent = max_concurrent;
    }
    if kind.is_some() {
        opts.kind = kind;
    }

    if args.semantic {
        let mut sem = SemanticOptions::new(args.connector.clone());
        sem.toolcall = args.toolcall;
        sem.prompt.clone_from(&args.prompt);
        if let Some(context_size) = args.context_size {
            sem.context_size = context_size;
        }
        if let Some(max_retry) = args.max_retry {
            sem.max_retry = max_retry;
        }
        if let Some(max_concurrent) = args.semantic_max_concurrent {
            sem.max_concurrent = max_concurrent;
        }
        if let Some(options) = &args.options {
            sem.options = serde_json::from_str(options).context("--options is not valid JSON")?;
        }
        opts.semantic = Some(sem);
    }

    Ok(opts.normalized())
}

fn print_chunk(chunk: &chunkrag::Chunk, format: OutputFormat) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => match serde_json::to_string(chunk) {
            Ok(line) => {
                let _ = writeln!(out, "{line}");
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "failed to serialize chunk {}: {e}", chunk.id);
            }
        },
        OutputFormat::Text => {
            let preview: String = chunk.text.chars().take(60).collect();
            let preview = preview.replace('\n', "\\n");
            let _ = writeln!(
                out,
                "[depth={} index={} leaf={} {}..{}] {preview}",
                chunk.depth, chunk.index, chunk.leaf, chunk.text_pos.start_index, chunk.text_pos.end_index
            );
        }
    }
}
