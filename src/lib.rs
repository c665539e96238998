//! bookworm library
//!
//! Retrieval-augmented question answering over a personal library.
//!
//! # Modules
//!
//! - `core`: configuration and the library error type
//! - `ingest`: loading documents and cutting them into chunks
//! - `search`: embedding store and similarity search
//! - `chat`: conversation memory, prompting and generation
//! - `logging`: tracing subscriber setup

pub mod chat;
pub mod core;
pub mod ingest;
pub mod logging;
pub mod search;

// Re-exports for convenience
pub use crate::chat::{Answer, ConversationMemory, QueryPipeline};
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::ingest::{ingest_document, Chunker, Document};
pub use crate::search::{EmbeddingStore, FilterMode, Outcome};
