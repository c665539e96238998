//! Search command - rank stored chunks against a query

use anyhow::Result;
use colored::Colorize;

use bookworm::core::config::Config;
use bookworm::search::{Embedder, ExactSearch, SearchStrategy};

pub fn run(config: &Config, query: &str, limit: Option<usize>, focus: bool, json: bool) -> Result<()> {
    let limit = limit.unwrap_or(config.search.top_n);
    let store = super::open_store(config)?;
    let embedder = super::embedder(config)?;

    let runtime = super::runtime()?;
    let Some(query_vector) = runtime.block_on(embedder.embed(query)) else {
        if json {
            println!("{}", serde_json::json!({ "error": "Query could not be embedded" }));
        } else {
            eprintln!(
                "{} Query could not be embedded. Is {} reachable?",
                "Error:".red().bold(),
                config.embedding.url
            );
        }
        std::process::exit(1);
    };

    let results = ExactSearch.search(&store, &query_vector, super::filter(focus), limit)?;

    if json {
        let json_results: Vec<_> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "chunk_id": r.chunk_id,
                    "book_id": r.book_id,
                    "file_name": r.file_name,
                    "page_number": r.page_number,
                    "score": r.score,
                    "text": r.text,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        return Ok(());
    }

    println!(
        "{} {} results for: {}",
        "→".dimmed(),
        results.len(),
        query.cyan()
    );
    println!();

    for (i, result) in results.iter().enumerate() {
        let score_str = format!("{:.2}", result.score);
        let score_colored = if result.score > 0.8 {
            score_str.green()
        } else if result.score > 0.6 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };

        println!(
            "{}. [{}] {} #{}",
            (i + 1).to_string().bold(),
            score_colored,
            result.file_name.cyan(),
            result.page_number
        );
        println!("   {}", super::truncate(&result.text, 160).dimmed());
        println!();
    }

    Ok(())
}
