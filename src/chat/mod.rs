//! Question answering over the library
//!
//! A query is embedded, matched against stored chunks and sent to a
//! generation model together with the conversation memory.

pub mod delivery;
pub mod generation;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod tokens;

pub use delivery::split_message;
pub use generation::{visible_models, GenerationError, Generator, HttpGenerator};
pub use memory::{ConversationMemory, MemoryEntry};
pub use pipeline::{Answer, QueryPipeline};
pub use tokens::{ApproxTokenCounter, TokenCounter};
