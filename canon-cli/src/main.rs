//! `canon` — batch backstory consistency checker.
//!
//! # Usage
//!
//! ```
//! canon --book "The Count of Monte Cristo"=books/monte-cristo.txt \
//!       --input records.jsonl --output verdicts.jsonl
//! ```
//!
//! Input records are JSON lines:
//! `{"id": 17, "book": "...", "character": "...", "caption": "...", "backstory": "..."}`.
//! Each verdict is written back as one JSON line in input order.

mod ingest;

use anyhow::{bail, Context, Result};
use canon_core::judge::GroqTransport;
use canon_core::{
    BackstoryChecker, BookId, CheckRequest, CheckerConfig, Contradiction, MemoryStore,
    RouterConfig,
};
use clap::Parser;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "canon", about = "Batch backstory consistency checker")]
struct Args {
    /// Book to index, as NAME=PATH. Repeatable.
    #[arg(long = "book", value_name = "NAME=PATH", required = true)]
    books: Vec<String>,

    /// JSON-lines input records.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// JSON-lines output file (defaults to stdout).
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Backend model ids in priority order. Repeatable; defaults to the
    /// built-in priority list.
    #[arg(long = "model", value_name = "MODEL")]
    models: Vec<String>,

    /// Evidence kept per claim.
    #[arg(long, default_value_t = 10)]
    top_k: usize,

    /// Checks in flight at once. Keep low to respect upstream rate limits.
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Chunk size in characters.
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    /// Overlap between adjacent chunks in characters.
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Groq API key.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: String,
}

// ─── Batch records ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Record {
    id: serde_json::Value,
    book: String,
    character: String,
    #[serde(default)]
    caption: Option<String>,
    backstory: String,
}

#[derive(Debug, Serialize)]
struct OutputRecord {
    id: serde_json::Value,
    score: u8,
    degraded: bool,
    contradictions: Vec<Contradiction>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut store = MemoryStore::new();
    for entry in &args.books {
        let (name, path) = entry
            .split_once('=')
            .with_context(|| format!("--book expects NAME=PATH, got {entry:?}"))?;
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("reading book file {path}"))?;

        let book_id = BookId::new(name);
        let chunks = ingest::chunk_book(&book_id, &raw, args.chunk_size, args.chunk_overlap);
        if chunks.is_empty() {
            bail!("book {name:?} produced no chunks");
        }
        tracing::info!(book = name, chunks = chunks.len(), "book indexed");
        store.add_book(book_id, chunks);
    }

    let mut config = CheckerConfig::default();
    if !args.models.is_empty() {
        config.router = RouterConfig::default().with_models(args.models.clone());
    }
    config.retriever.top_k = args.top_k;

    let transport = Arc::new(GroqTransport::new(groq::Groq::new(args.api_key.as_str())));
    let checker = Arc::new(BackstoryChecker::new(Arc::new(store), transport, config));

    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading input file {}", args.input.display()))?;
    let records: Vec<Record> = input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).with_context(|| format!("parsing input line {}", number + 1))
        })
        .collect::<Result<_>>()?;

    tracing::info!(records = records.len(), "processing records");

    let mut outputs: Vec<(usize, Option<OutputRecord>)> =
        futures::stream::iter(records.into_iter().enumerate().map(|(index, record)| {
            let checker = Arc::clone(&checker);
            async move {
                let mut request = CheckRequest::new(
                    record.book.as_str(),
                    record.character.as_str(),
                    record.backstory.as_str(),
                );
                if let Some(caption) = record.caption {
                    request = request.with_caption(caption);
                }

                match checker.check(&request).await {
                    Ok(verdict) => (
                        index,
                        Some(OutputRecord {
                            id: record.id,
                            score: verdict.score,
                            degraded: verdict.degraded,
                            contradictions: verdict.contradictions,
                        }),
                    ),
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping record");
                        (index, None)
                    }
                }
            }
        }))
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    outputs.sort_by_key(|(index, _)| *index);

    let lines: Vec<String> = outputs
        .into_iter()
        .filter_map(|(_, output)| output)
        .map(|output| serde_json::to_string(&output).map_err(anyhow::Error::from))
        .collect::<Result<_>>()?;

    let body = if lines.is_empty() {
        String::new()
    } else {
        lines.join("\n") + "\n"
    };

    match &args.output {
        Some(path) => std::fs::write(path, body)
            .with_context(|| format!("writing output file {}", path.display()))?,
        None => print!("{body}"),
    }

    Ok(())
}
