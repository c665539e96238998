//! Embedding storage and similarity search
//!
//! Vectors come from an external embedding model, are stored as SQLite BLOBs
//! and compared with cosine similarity.

pub mod embedding;
pub mod engine;
pub mod store;

pub use embedding::{cosine_similarity, Embedder, HttpEmbedder};
pub use engine::{ExactSearch, SearchHit, SearchStrategy};
pub use store::{Book, BookKey, ChunkRecord, EmbeddingStore, FilterMode, Outcome};
