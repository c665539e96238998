pub mod add;
pub mod ask;
pub mod books;
pub mod init;
pub mod models;
pub mod search;
pub mod status;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use unicode_width::UnicodeWidthStr;

use bookworm::chat::{ConversationMemory, HttpGenerator, QueryPipeline};
use bookworm::core::config::Config;
use bookworm::search::{EmbeddingStore, FilterMode, HttpEmbedder};

/// Open the configured store, creating the database file if needed
pub fn open_store(config: &Config) -> Result<EmbeddingStore> {
    if let Some(parent) = config.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = EmbeddingStore::open(&config.database)
        .with_context(|| format!("Failed to open store at {}", config.database.display()))?;
    Ok(store.with_vacuum_threshold(config.store.vacuum_threshold))
}

pub fn embedder(config: &Config) -> Result<HttpEmbedder> {
    let endpoint = &config.embedding;
    HttpEmbedder::new(&endpoint.url, &endpoint.model, endpoint.timeout())
        .context("Failed to build embedding client")
}

pub fn generator(config: &Config) -> Result<HttpGenerator> {
    let endpoint = &config.generation;
    let generator = HttpGenerator::new(&endpoint.url, &endpoint.model, endpoint.timeout())
        .context("Failed to build generation client")?;
    Ok(generator.with_models_url(endpoint.models_url.clone()))
}

pub fn pipeline(config: &Config, store: EmbeddingStore, focus: bool) -> Result<QueryPipeline> {
    Ok(QueryPipeline::new(
        Arc::new(embedder(config)?),
        Arc::new(generator(config)?),
        Arc::new(Mutex::new(store)),
    )
    .with_top_n(config.search.top_n)
    .with_filter(filter(focus)))
}

pub fn memory(config: &Config) -> ConversationMemory {
    ConversationMemory::new(config.memory.token_ceiling)
}

pub fn filter(focus: bool) -> FilterMode {
    if focus {
        FilterMode::FocusOnly
    } else {
        FilterMode::All
    }
}

/// Current-thread runtime for one-shot async commands
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Truncate to `max_chars` characters, appending `...` when cut
pub fn truncate(s: &str, max_chars: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    }
}

/// Pad to a terminal display width (wide glyphs count double)
pub fn pad(s: &str, width: usize) -> String {
    let shown = UnicodeWidthStr::width(s);
    if shown >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - shown))
    }
}
