//! Add command - ingest documents into the store

use anyhow::{Context, Result};
use colored::Colorize;

use bookworm::core::config::Config;
use bookworm::ingest::{collect_documents, ingest_document, Chunker, Document, IngestStats, PageRange};

pub fn run(
    config: &Config,
    inputs: &[String],
    start_page: Option<usize>,
    stop_page: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut paths = Vec::new();
    for input in inputs {
        let found = collect_documents(input).with_context(|| format!("Bad input: {}", input))?;
        if found.is_empty() && !json {
            println!("{} Nothing matched: {}", "!".yellow(), input.cyan());
        }
        paths.extend(found);
    }

    if paths.is_empty() {
        if json {
            println!("{}", serde_json::json!({ "error": "No documents found" }));
        } else {
            eprintln!("{} No documents found", "Error:".red().bold());
        }
        std::process::exit(1);
    }

    let store = super::open_store(config)?;
    let embedder = super::embedder(config)?;
    let chunker = Chunker::new(config.chunking.max_chunk_chars);
    let range = PageRange::new(start_page, stop_page);
    let runtime = super::runtime()?;

    let mut all_stats: Vec<IngestStats> = Vec::new();
    for path in &paths {
        if !json {
            println!("{} Adding {}...", "→".dimmed(), path.display());
        }

        let document = Document::load(path, range)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let stats = runtime.block_on(ingest_document(&store, &embedder, &chunker, &document))?;

        if !json {
            print_stats(&stats);
        }
        all_stats.push(stats);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all_stats)?);
    } else if all_stats.iter().any(|s| s.missing_embeddings > 0) {
        println!();
        println!(
            "{} Some chunks have no embedding. Check that {} is reachable.",
            "!".yellow().bold(),
            config.embedding.url.cyan()
        );
    }

    Ok(())
}

fn print_stats(stats: &IngestStats) {
    println!(
        "{} {}: {} chunks added in {:.2}s",
        "✓".green().bold(),
        stats.file_name.cyan(),
        stats.added.to_string().cyan(),
        stats.duration_ms as f64 / 1000.0
    );
    if stats.skipped > 0 {
        println!("  {} {} chunks already stored", "→".dimmed(), stats.skipped);
    }
    if stats.missing_embeddings > 0 {
        println!("  {} {} chunks without embedding", "✗".red(), stats.missing_embeddings);
    }
}
