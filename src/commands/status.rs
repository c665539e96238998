use anyhow::Result;
use colored::*;

use bookworm::core::config::Config;
use bookworm::search::store::DATE_FORMAT;

pub fn run(config: &Config, json: bool) -> Result<()> {
    if !config.database.exists() {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "exists": false,
                    "database": config.database.display().to_string(),
                })
            );
        } else {
            println!(
                "{} Store not found at {}. Run {} first.",
                "!".yellow().bold(),
                config.database.display(),
                "bookworm add".cyan()
            );
        }
        return Ok(());
    }

    let store = super::open_store(config)?;
    let stats = store.stats()?;
    let file_size = std::fs::metadata(&config.database)
        .map(|m| m.len())
        .unwrap_or(0);
    let last_added = stats
        .last_added
        .map(|d| d.format(DATE_FORMAT).to_string());

    if json {
        println!(
            "{}",
            serde_json::json!({
                "exists": true,
                "database": config.database.display().to_string(),
                "books": stats.book_count,
                "chunks": stats.chunk_count,
                "embedded_chunks": stats.embedded_count,
                "excluded_books": stats.excluded_books,
                "focused_books": stats.focused_books,
                "embedding_dim": stats.embedding_dim,
                "embedding_model": stats.embedding_model,
                "last_added": last_added,
                "file_size_bytes": file_size,
            })
        );
        return Ok(());
    }

    println!("{}", "Library Status".bold());
    println!("{}", "=".repeat(50));
    println!();
    println!("  {} {} books", "→".dimmed(), stats.book_count.to_string().cyan());
    println!(
        "  {} {} chunks ({} embedded)",
        "→".dimmed(),
        stats.chunk_count.to_string().cyan(),
        stats.embedded_count
    );
    if stats.excluded_books > 0 {
        println!("  {} {} excluded", "→".dimmed(), stats.excluded_books.to_string().red());
    }
    if stats.focused_books > 0 {
        println!("  {} {} focused", "→".dimmed(), stats.focused_books.to_string().green());
    }
    match (&stats.embedding_model, stats.embedding_dim) {
        (Some(model), Some(dim)) => println!("  {} Model: {} ({}-d)", "→".dimmed(), model, dim),
        (Some(model), None) => println!("  {} Model: {}", "→".dimmed(), model),
        _ => {}
    }
    if stats.embedded_count < stats.chunk_count {
        println!(
            "  {} {} chunks have no embedding",
            "!".yellow(),
            stats.chunk_count - stats.embedded_count
        );
    }
    println!("  {} Size: {:.2} KB", "→".dimmed(), file_size as f64 / 1024.0);
    if let Some(ts) = last_added {
        println!("  {} Last added: {}", "→".dimmed(), ts);
    }

    Ok(())
}
