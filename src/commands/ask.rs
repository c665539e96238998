//! Ask and chat commands - answer questions from the library

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Result};
use colored::Colorize;

use bookworm::chat::{split_message, Answer, ConversationMemory, QueryPipeline};
use bookworm::core::config::Config;

pub fn run(config: &Config, query: &str, focus: bool, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let pipeline = super::pipeline(config, store, focus)?;
    let mut memory = super::memory(config);

    let runtime = super::runtime()?;
    let answer = runtime.block_on(pipeline.ask(&mut memory, query))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "reply": answer.reply,
                "failed": answer.failed,
                "sources": answer.sources.iter().map(|s| serde_json::json!({
                    "file_name": s.file_name,
                    "page_number": s.page_number,
                    "score": s.score,
                })).collect::<Vec<_>>(),
            })
        );
    } else {
        print_answer(config, &answer);
    }

    if answer.failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Interactive session sharing one conversation memory
pub fn chat(config: &Config, focus: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let pipeline = super::pipeline(config, store, focus)?;
    let mut memory = super::memory(config);
    let runtime = super::runtime()?;

    println!("{}", "bookworm chat".bold());
    println!(
        "{}",
        "Commands: /ping, /clear, /books, /quit".dimmed()
    );
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} ", ">".cyan().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/ping" => println!("Pong!"),
            "/clear" => {
                memory.clear();
                println!("Memory Cleared.");
            }
            "/books" => list_books(&pipeline)?,
            query => {
                println!("{}", "Processing...".dimmed());
                match runtime.block_on(pipeline.ask(&mut memory, query)) {
                    Ok(answer) => {
                        print_answer(config, &answer);
                        report_memory(&memory, &answer);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "query failed");
                        println!("{}", format!("Error: {}", e).red());
                    }
                }
            }
        }
        println!();
    }

    Ok(())
}

fn print_answer(config: &Config, answer: &Answer) {
    let segments = split_message(&answer.reply, config.delivery.max_message_chars);
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            println!();
        }
        if answer.failed {
            println!("{}", segment.red());
        } else {
            println!("{}", segment);
        }
    }

    if !answer.sources.is_empty() {
        println!();
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  {} Source {}: {} #{} ({:.2})",
                "→".dimmed(),
                i + 1,
                source.file_name.cyan(),
                source.page_number,
                source.score
            );
        }
    }
}

fn report_memory(memory: &ConversationMemory, answer: &Answer) {
    if !answer.evicted.is_empty() {
        println!(
            "  {} {} earlier exchanges dropped from memory",
            "→".dimmed(),
            answer.evicted.len()
        );
    }
    tracing::debug!(
        entries = memory.len(),
        tokens = memory.token_count(),
        ceiling = memory.ceiling(),
        "memory"
    );
}

fn list_books(pipeline: &QueryPipeline) -> Result<()> {
    let store = pipeline
        .store()
        .lock()
        .map_err(|_| anyhow!("store lock poisoned"))?;
    let books = store.list_books()?;
    if books.is_empty() {
        println!("No books in the library.");
    }
    for book in books {
        println!("{}: {}", book.id, book.name.cyan());
    }
    Ok(())
}
