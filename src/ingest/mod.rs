//! Turning documents into embedded chunks

pub mod chunker;
pub mod loader;
pub mod pipeline;

pub use chunker::{Chunker, Page, TextChunk};
pub use loader::{collect_documents, Document, PageRange};
pub use pipeline::{ingest_document, IngestStats};
