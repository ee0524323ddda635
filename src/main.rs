//! `chunkrag`: hierarchical text chunking for retrieval-augmented generation.
//!
//! Thin CLI wrapper around the `chunkrag` library: parses arguments,
//! wires up a connector from the environment, and streams the
//! resulting chunks to stdout.

mod cli;
mod config;

use std::io::Write;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Chunk(args) => cli::commands::run_chunk(args).await,
    };

    if let Err(e) = result {
        let _ = writeln!(std::io::stderr(), "Error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
