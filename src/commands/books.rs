//! Book management commands - list, inspect, remove, flag

use anyhow::Result;
use colored::*;

use bookworm::core::config::Config;
use bookworm::search::store::{Book, BookKey, Outcome, DATE_FORMAT};

/// Per-book retrieval flag changes
#[derive(Debug, Clone, Copy)]
pub enum FlagChange {
    Exclude,
    Include,
    Focus,
    Unfocus,
}

impl FlagChange {
    fn verb(self) -> &'static str {
        match self {
            FlagChange::Exclude => "Excluded",
            FlagChange::Include => "Included",
            FlagChange::Focus => "Focused",
            FlagChange::Unfocus => "Unfocused",
        }
    }
}

fn book_json(book: &Book) -> serde_json::Value {
    serde_json::json!({
        "id": book.id,
        "name": book.name,
        "file_name": book.file_name,
        "date_added": book.date_added.format(DATE_FORMAT).to_string(),
        "excluded": book.excluded,
        "focused": book.focused,
    })
}

pub fn list(config: &Config, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let books = store.list_books()?;

    if json {
        let items: Vec<_> = books.iter().map(book_json).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if books.is_empty() {
        println!("{} No books yet. Run {} first.", "→".dimmed(), "bookworm add".cyan());
        return Ok(());
    }

    let width = books
        .iter()
        .map(|b| unicode_width::UnicodeWidthStr::width(b.name.as_str()))
        .max()
        .unwrap_or(0);

    println!("{}", "Books".bold());
    println!();
    for book in &books {
        let mut flags = Vec::new();
        if book.excluded {
            flags.push("excluded".red());
        }
        if book.focused {
            flags.push("focused".green());
        }
        let flags = flags
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        println!(
            "  {:>4}  {}  {}  {}",
            book.id.to_string().dimmed(),
            super::pad(&book.name, width).cyan(),
            book.date_added.format(DATE_FORMAT).to_string().dimmed(),
            flags
        );
    }

    Ok(())
}

pub fn chunks(config: &Config, book: &str, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let key = BookKey::from_input(book);

    let Some(found) = store.get_book(key.clone())? else {
        return not_found(&key, json);
    };
    let chunks = store.list_chunks(found.id)?;

    if json {
        let items: Vec<_> = chunks
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "page_number": c.page_number,
                    "source_page": c.source_page,
                    "char_count": c.char_count,
                    "token_count": c.token_count,
                    "has_embedding": c.has_embedding,
                    "text": c.text,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!(
        "{} {} chunks in {}",
        "→".dimmed(),
        chunks.len(),
        found.name.cyan()
    );
    println!();
    for chunk in &chunks {
        let marker = if chunk.has_embedding {
            "●".green()
        } else {
            "○".red()
        };
        println!(
            "{} {:>4} {} {}",
            marker,
            chunk.page_number.to_string().bold(),
            format!("p{}", chunk.source_page).dimmed(),
            super::truncate(&chunk.text, 80)
        );
    }

    Ok(())
}

pub fn remove(config: &Config, book: &str) -> Result<()> {
    let store = super::open_store(config)?;
    let key = BookKey::from_input(book);
    match store.remove_book(key.clone())? {
        Outcome::Applied => println!("{} Removed {}", "✓".green(), key.to_string().cyan()),
        _ => return not_found(&key, false),
    }
    Ok(())
}

pub fn remove_chunk(config: &Config, file_name: &str, page_number: i64) -> Result<()> {
    let store = super::open_store(config)?;
    match store.remove_chunk(file_name, page_number)? {
        Outcome::Applied => println!(
            "{} Removed chunk {} of {}",
            "✓".green(),
            page_number,
            file_name.cyan()
        ),
        _ => {
            eprintln!(
                "{} No chunk {} in {}",
                "Error:".red().bold(),
                page_number,
                file_name
            );
            std::process::exit(1);
        }
    }
    Ok(())
}

pub fn set_flag(config: &Config, book: &str, change: FlagChange) -> Result<()> {
    let store = super::open_store(config)?;
    let key = BookKey::from_input(book);
    let outcome = match change {
        FlagChange::Exclude => store.exclude_book(key.clone())?,
        FlagChange::Include => store.include_book(key.clone())?,
        FlagChange::Focus => store.focus_book(key.clone())?,
        FlagChange::Unfocus => store.un_focus_book(key.clone())?,
    };

    if outcome == Outcome::NotFound {
        return not_found(&key, false);
    }
    println!("{} {} {}", "✓".green(), change.verb(), key.to_string().cyan());
    Ok(())
}

pub fn vector(config: &Config, file_name: &str, page_number: i64, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let embedding = store.get_vector(file_name, page_number)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "file_name": file_name,
                "page_number": page_number,
                "embedding": embedding,
            })
        );
        return Ok(());
    }

    match embedding {
        Some(v) => {
            println!("{} {} dimensions", "→".dimmed(), v.len().to_string().cyan());
            let preview: Vec<String> = v.iter().take(8).map(|x| format!("{:.4}", x)).collect();
            let ellipsis = if v.len() > 8 { ", ..." } else { "" };
            println!("  [{}{}]", preview.join(", "), ellipsis);
        }
        None => println!(
            "{} No embedding stored for chunk {} of {}",
            "!".yellow(),
            page_number,
            file_name
        ),
    }
    Ok(())
}

fn not_found(key: &BookKey, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "error": "Book not found", "book": key.to_string() }));
    } else {
        eprintln!("{} Book not found: {}", "Error:".red().bold(), key);
    }
    std::process::exit(1);
}
