//! Document ingestion: chunk, embed, store

use std::time::Instant;

use serde::Serialize;

use super::chunker::Chunker;
use super::loader::Document;
use crate::core::error::Result;
use crate::search::embedding::Embedder;
use crate::search::store::{EmbeddingStore, Outcome, META_EMBEDDING_MODEL};

/// Ingestion statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    pub file_name: String,
    pub chunks: usize,
    pub added: usize,
    pub skipped: usize,
    pub missing_embeddings: usize,
    pub duration_ms: u128,
}

/// Add a document to the store
///
/// The book is named after its file. Chunks already stored with the same
/// text are skipped without calling the embedder, so re-ingesting a document
/// only embeds what changed. A chunk whose embedding fails is still stored,
/// without a vector. Failed and empty embeddings both count as missing.
pub async fn ingest_document(
    store: &EmbeddingStore,
    embedder: &dyn Embedder,
    chunker: &Chunker,
    document: &Document,
) -> Result<IngestStats> {
    let start = Instant::now();
    let mut stats = IngestStats {
        file_name: document.file_name.clone(),
        ..Default::default()
    };

    if store.add_book(&document.file_name, &document.file_name)? == Outcome::AlreadyExists {
        tracing::info!(book = %document.file_name, "book already present, adding new chunks only");
    }
    record_model(store, embedder.model_name())?;

    let chunks = chunker.chunk_document(&document.file_name, &document.pages);
    stats.chunks = chunks.len();
    tracing::info!(book = %document.file_name, chunks = chunks.len(), "chunked document");

    for chunk in chunks {
        if store.chunk_exists(&chunk.file_name, chunk.page_number, &chunk.text)? {
            stats.skipped += 1;
            continue;
        }

        let embedding = embedder.embed(&chunk.text).await;
        if embedding.as_ref().map_or(true, |v| v.is_empty()) {
            stats.missing_embeddings += 1;
        }

        let page_number = chunk.page_number;
        match store.add_chunk(&chunk.into_record(embedding))? {
            Outcome::Applied => stats.added += 1,
            Outcome::AlreadyExists => {
                tracing::warn!(
                    book = %document.file_name,
                    page_number,
                    "chunk text changed since last ingestion; remove the book to re-index it"
                );
                stats.skipped += 1;
            }
            Outcome::NotFound => {
                tracing::warn!(book = %document.file_name, "book disappeared during ingestion");
                break;
            }
        }
    }

    stats.duration_ms = start.elapsed().as_millis();
    tracing::info!(
        book = %stats.file_name,
        added = stats.added,
        skipped = stats.skipped,
        missing = stats.missing_embeddings,
        "ingested document"
    );
    Ok(stats)
}

fn record_model(store: &EmbeddingStore, model: &str) -> Result<()> {
    match store.get_meta(META_EMBEDDING_MODEL)? {
        Some(existing) if existing != model => {
            tracing::warn!(
                stored = %existing,
                current = %model,
                "store was built with a different embedding model; scores across models are meaningless"
            );
        }
        Some(_) => {}
        None => store.set_meta(META_EMBEDDING_MODEL, model)?,
    }
    Ok(())
}
