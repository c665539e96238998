//! Query path: embed, retrieve, prompt, generate, remember

use std::sync::{Arc, Mutex};

use super::generation::{GenerationError, Generator};
use super::memory::{ConversationMemory, MemoryEntry};
use super::prompt::build_prompt;
use crate::core::error::{Error, Result};
use crate::search::embedding::Embedder;
use crate::search::engine::{ExactSearch, SearchHit, SearchStrategy};
use crate::search::store::{EmbeddingStore, FilterMode};

/// Result of one query
#[derive(Debug, Clone)]
pub struct Answer {
    /// Generated reply, or the error text when generation failed
    pub reply: String,
    pub sources: Vec<SearchHit>,
    /// Entries dropped from memory while answering, oldest first
    pub evicted: Vec<MemoryEntry>,
    pub failed: bool,
}

/// Everything needed to answer a query against the library
///
/// The store is shared; its lock is only held while searching, never across
/// an HTTP call.
#[derive(Clone)]
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: Arc<Mutex<EmbeddingStore>>,
    strategy: Arc<dyn SearchStrategy>,
    top_n: usize,
    filter: FilterMode,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        store: Arc<Mutex<EmbeddingStore>>,
    ) -> Self {
        Self {
            embedder,
            generator,
            store,
            strategy: Arc::new(ExactSearch),
            top_n: 3,
            filter: FilterMode::All,
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn SearchStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn store(&self) -> &Arc<Mutex<EmbeddingStore>> {
        &self.store
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    /// Generation models on offer; the embedding model is left out
    pub async fn list_models(&self) -> std::result::Result<Vec<String>, GenerationError> {
        self.generator.list_models(self.embedder.model_name()).await
    }

    /// Embed the query and return the best chunks
    ///
    /// A query that cannot be embedded retrieves nothing.
    pub async fn retrieve(&self, query: &str, filter: FilterMode, top_n: usize) -> Result<Vec<SearchHit>> {
        let Some(query_vector) = self.embedder.embed(query).await else {
            tracing::warn!("query could not be embedded, answering without context");
            return Ok(Vec::new());
        };

        let store = self.store.lock().map_err(|_| Error::LockPoisoned)?;
        self.strategy.search(&store, &query_vector, filter, top_n)
    }

    /// Answer `query` using and updating `memory`
    ///
    /// Memory is trimmed to its ceiling first. The exchange is remembered
    /// only when generation succeeds; otherwise the reply is the error text.
    pub async fn ask(&self, memory: &mut ConversationMemory, query: &str) -> Result<Answer> {
        let mut evicted = memory.evict_to_budget(memory.ceiling());

        let sources = self.retrieve(query, self.filter, self.top_n).await?;
        tracing::info!(sources = sources.len(), "retrieved context");

        let prompt = build_prompt(
            query,
            memory.entries(),
            sources.iter().map(|hit| hit.text.as_str()),
        );

        match self.generator.generate(&prompt).await {
            Ok(reply) => {
                evicted.extend(memory.append(query, reply.as_str()));
                Ok(Answer {
                    reply,
                    sources,
                    evicted,
                    failed: false,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "generation failed");
                Ok(Answer {
                    reply: e.to_string(),
                    sources,
                    evicted,
                    failed: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tokens::WordTokenCounter;
    use crate::search::store::ChunkRecord;
    use async_trait::async_trait;

    struct FixedEmbedder(Option<Vec<f32>>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
            self.0.clone()
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Echoes the prompt back, or fails with a status
    struct EchoGenerator {
        fail: bool,
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
            if self.fail {
                Err(GenerationError::Status {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(prompt.to_string())
            }
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn store() -> Arc<Mutex<EmbeddingStore>> {
        let store = EmbeddingStore::open_in_memory().unwrap();
        store.add_book("Alpha", "alpha.pdf").unwrap();
        for (page, embedding, text) in [
            (0, vec![1.0, 0.0], "Hobbits live in holes."),
            (1, vec![0.0, 1.0], "Dragons hoard gold."),
        ] {
            store
                .add_chunk(&ChunkRecord {
                    file_name: "alpha.pdf".to_string(),
                    page_number: page,
                    source_page: 0,
                    char_count: text.len() as i64,
                    word_count: 4,
                    token_count: 5,
                    text: text.to_string(),
                    embedding: Some(embedding),
                })
                .unwrap();
        }
        Arc::new(Mutex::new(store))
    }

    fn pipeline(query_vector: Option<Vec<f32>>, fail: bool) -> QueryPipeline {
        QueryPipeline::new(
            Arc::new(FixedEmbedder(query_vector)),
            Arc::new(EchoGenerator { fail }),
            store(),
        )
        .with_top_n(1)
    }

    #[tokio::test]
    async fn test_ask_uses_best_chunk_and_remembers() {
        let pipeline = pipeline(Some(vec![1.0, 0.1]), false);
        let mut memory = ConversationMemory::new(10_000);

        let answer = pipeline.ask(&mut memory, "Where do hobbits live?").await.unwrap();
        assert!(!answer.failed);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].text, "Hobbits live in holes.");
        assert!(answer.reply.contains("Source 1:\nHobbits live in holes."));
        assert!(answer.reply.contains("No prior memory."));
        assert_eq!(memory.len(), 1);

        let second = pipeline.ask(&mut memory, "And dragons?").await.unwrap();
        assert!(second.reply.contains("Query: Where do hobbits live?"));
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_embedding_answers_without_context() {
        let pipeline = pipeline(None, false);
        let mut memory = ConversationMemory::new(10_000);

        let answer = pipeline.ask(&mut memory, "Anything?").await.unwrap();
        assert!(answer.sources.is_empty());
        assert!(answer.reply.contains("No Context Provided."));
        assert!(!answer.failed);
    }

    #[tokio::test]
    async fn test_failed_generation_leaves_memory_untouched() {
        let pipeline = pipeline(Some(vec![1.0, 0.0]), true);
        let mut memory = ConversationMemory::new(10_000);
        memory.append("earlier", "answer");

        let answer = pipeline.ask(&mut memory, "Where do hobbits live?").await.unwrap();
        assert!(answer.failed);
        assert_eq!(answer.reply, "Error: 500 - boom");
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_query_keeps_memory_usable() {
        let shared = store();
        let mismatched = QueryPipeline::new(
            Arc::new(FixedEmbedder(Some(vec![1.0, 0.0, 0.0]))),
            Arc::new(EchoGenerator { fail: false }),
            shared.clone(),
        );
        let mut memory = ConversationMemory::new(10_000);
        memory.append("earlier", "answer");

        let result = mismatched.ask(&mut memory, "Where do hobbits live?").await;
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch { expected: 2, found: 3 })
        ));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.entries().next().unwrap().query, "earlier");

        let working = QueryPipeline::new(
            Arc::new(FixedEmbedder(Some(vec![1.0, 0.0]))),
            Arc::new(EchoGenerator { fail: false }),
            shared,
        );
        let answer = working.ask(&mut memory, "And dragons?").await.unwrap();
        assert!(!answer.failed);
        assert!(answer.reply.contains("Query: earlier"));
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_evicted_before_answering() {
        let pipeline = pipeline(Some(vec![1.0, 0.0]), false);
        let mut memory = ConversationMemory::with_counter(6, Box::new(WordTokenCounter));
        memory.append("one two", "three four");

        // Echoed prompt is far over the ceiling, so the new exchange is evicted too
        let answer = pipeline.ask(&mut memory, "hobbits").await.unwrap();
        assert_eq!(answer.evicted.len(), 2);
        assert_eq!(answer.evicted[0].query, "one two");
        assert!(memory.is_empty());
    }

    /// Reports a fixed model list
    struct CatalogGenerator;

    #[async_trait]
    impl Generator for CatalogGenerator {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
            Ok(String::new())
        }

        async fn list_models(&self, hidden: &str) -> std::result::Result<Vec<String>, GenerationError> {
            Ok(crate::chat::generation::visible_models(
                ["llama3.1".to_string(), "fixed:latest".to_string()],
                hidden,
            ))
        }

        fn model_name(&self) -> &str {
            "llama3.1"
        }
    }

    #[tokio::test]
    async fn test_list_models_hides_embedder_model() {
        let catalog = QueryPipeline::new(
            Arc::new(FixedEmbedder(None)),
            Arc::new(CatalogGenerator),
            store(),
        );
        assert_eq!(catalog.list_models().await.unwrap(), vec!["llama3.1"]);

        // Default listing is the generator's own model
        let echo = pipeline(None, false);
        assert_eq!(echo.list_models().await.unwrap(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_focus_filter() {
        let pipeline = pipeline(Some(vec![1.0, 0.0]), false).with_filter(FilterMode::FocusOnly);
        let mut memory = ConversationMemory::default();
        let answer = pipeline.ask(&mut memory, "hobbits").await.unwrap();
        assert!(answer.sources.is_empty());
    }
}
