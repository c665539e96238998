//! bookworm MCP server implementation

use std::sync::{Arc, Mutex};

use anyhow::Result;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use bookworm::chat::{split_message, Answer, ConversationMemory, QueryPipeline};
use bookworm::core::config::Config;
use bookworm::search::store::{Book, ChunkSummary, EmbeddingStore, StoreStats, DATE_FORMAT};
use bookworm::search::{BookKey, FilterMode, SearchHit};

/// Parameters for rag_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "Natural language search query")]
    pub query: String,
    #[schemars(description = "Maximum number of results (default: 3)")]
    #[serde(default)]
    pub limit: Option<usize>,
    #[schemars(description = "Only search books marked as focused")]
    #[serde(default)]
    pub focus_only: bool,
}

/// Parameters for rag_query tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryParams {
    #[schemars(description = "Question to answer from the library")]
    pub query: String,
    #[schemars(description = "Only use books marked as focused")]
    #[serde(default)]
    pub focus_only: bool,
}

/// Parameters for rag_list_chunks tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListChunksParams {
    #[schemars(description = "Book id, name or file name")]
    pub book: String,
}

/// Search hit for JSON output
#[derive(Debug, Serialize)]
struct HitJson {
    file_name: String,
    page_number: i64,
    score: f32,
    text: String,
}

impl From<&SearchHit> for HitJson {
    fn from(hit: &SearchHit) -> Self {
        Self {
            file_name: hit.file_name.clone(),
            page_number: hit.page_number,
            score: hit.score,
            text: hit.text.clone(),
        }
    }
}

/// Book info for JSON output
#[derive(Debug, Serialize)]
struct BookJson {
    id: i64,
    name: String,
    file_name: String,
    date_added: String,
    excluded: bool,
    focused: bool,
}

impl From<&Book> for BookJson {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            name: book.name.clone(),
            file_name: book.file_name.clone(),
            date_added: book.date_added.format(DATE_FORMAT).to_string(),
            excluded: book.excluded,
            focused: book.focused,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChunkJson {
    page_number: i64,
    source_page: i64,
    token_count: i64,
    has_embedding: bool,
    text: String,
}

impl From<&ChunkSummary> for ChunkJson {
    fn from(chunk: &ChunkSummary) -> Self {
        Self {
            page_number: chunk.page_number,
            source_page: chunk.source_page,
            token_count: chunk.token_count,
            has_embedding: chunk.has_embedding,
            text: chunk.text.clone(),
        }
    }
}

fn status_json(stats: &StoreStats, memory: &ConversationMemory) -> serde_json::Value {
    serde_json::json!({
        "books": stats.book_count,
        "chunks": stats.chunk_count,
        "embedded_chunks": stats.embedded_count,
        "excluded_books": stats.excluded_books,
        "focused_books": stats.focused_books,
        "embedding_dim": stats.embedding_dim,
        "embedding_model": stats.embedding_model,
        "memory_entries": memory.len(),
        "memory_tokens": memory.token_count(),
        "memory_ceiling": memory.ceiling(),
    })
}

/// Reply segments, followed by a source listing
fn answer_contents(answer: &Answer, limit: usize) -> Vec<String> {
    let mut parts = split_message(&answer.reply, limit);
    if parts.is_empty() {
        parts.push(String::new());
    }
    if !answer.sources.is_empty() {
        let sources: Vec<String> = answer
            .sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Source {}: {} #{} ({:.2})", i + 1, s.file_name, s.page_number, s.score))
            .collect();
        parts.push(sources.join("\n"));
    }
    parts
}

fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    // Upper bound keeps a single call from dumping the whole library
    requested.unwrap_or(default).clamp(1, 100)
}

fn internal(context: &str, e: impl std::fmt::Display) -> McpError {
    McpError::internal_error(format!("{}: {}", context, e), None)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value).map_err(|e| internal("JSON serialization failed", e))
}

/// bookworm MCP Service
#[derive(Clone)]
pub struct BookwormService {
    pipeline: Arc<QueryPipeline>,
    memory: Arc<tokio::sync::Mutex<ConversationMemory>>,
    top_n: usize,
    max_message_chars: usize,
    tool_router: ToolRouter<Self>,
}

impl BookwormService {
    pub fn new(pipeline: QueryPipeline, memory: ConversationMemory, config: &Config) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            memory: Arc::new(tokio::sync::Mutex::new(memory)),
            top_n: config.search.top_n,
            max_message_chars: config.delivery.max_message_chars,
            tool_router: Self::tool_router(),
        }
    }

    fn store(&self) -> Result<std::sync::MutexGuard<'_, EmbeddingStore>, McpError> {
        self.pipeline
            .store()
            .lock()
            .map_err(|_| McpError::internal_error("store lock poisoned", None))
    }

    fn filter(focus_only: bool) -> FilterMode {
        if focus_only {
            FilterMode::FocusOnly
        } else {
            FilterMode::All
        }
    }
}

#[tool_router]
impl BookwormService {
    #[tool(description = "Check that the bookworm server is alive. Replies with Pong!")]
    async fn rag_ping(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text("Pong!")]))
    }

    /// Rank stored chunks against a query without generating an answer
    #[tool(description = "Search the library for passages similar to the query. Returns the best matching chunks with their similarity scores.")]
    async fn rag_search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let limit = clamp_limit(params.0.limit, self.top_n);
        let hits = self
            .pipeline
            .retrieve(&params.0.query, Self::filter(params.0.focus_only), limit)
            .await
            .map_err(|e| internal("Search failed", e))?;

        let output: Vec<HitJson> = hits.iter().map(HitJson::from).collect();
        Ok(CallToolResult::success(vec![Content::text(to_json(&output)?)]))
    }

    /// Answer a question from the library, remembering the exchange
    #[tool(description = "Answer a question using passages retrieved from the library. The conversation is remembered across calls until rag_clear_memory.")]
    async fn rag_query(&self, params: Parameters<QueryParams>) -> Result<CallToolResult, McpError> {
        let pipeline = (*self.pipeline).clone().with_filter(Self::filter(params.0.focus_only));
        let mut memory = self.memory.lock().await;

        let answer = pipeline
            .ask(&mut memory, &params.0.query)
            .await
            .map_err(|e| internal("Query failed", e))?;

        let contents = answer_contents(&answer, self.max_message_chars)
            .into_iter()
            .map(Content::text)
            .collect();
        if answer.failed {
            Ok(CallToolResult::error(contents))
        } else {
            Ok(CallToolResult::success(contents))
        }
    }

    #[tool(description = "Forget the conversation so far.")]
    async fn rag_clear_memory(&self) -> Result<CallToolResult, McpError> {
        self.memory.lock().await.clear();
        Ok(CallToolResult::success(vec![Content::text("Memory Cleared.")]))
    }

    #[tool(description = "List the books in the library with their ids and retrieval flags.")]
    async fn rag_list_books(&self) -> Result<CallToolResult, McpError> {
        let books = self
            .store()?
            .list_books()
            .map_err(|e| internal("Failed to list books", e))?;
        let output: Vec<BookJson> = books.iter().map(BookJson::from).collect();
        Ok(CallToolResult::success(vec![Content::text(to_json(&output)?)]))
    }

    #[tool(description = "List the chunks of one book, by id, name or file name.")]
    async fn rag_list_chunks(&self, params: Parameters<ListChunksParams>) -> Result<CallToolResult, McpError> {
        let chunks = {
            let store = self.store()?;
            let key = BookKey::from_input(&params.0.book);
            if store
                .get_book(key.clone())
                .map_err(|e| internal("Lookup failed", e))?
                .is_none()
            {
                return Ok(CallToolResult::success(vec![Content::text(format!(
                    "Book not found: {}",
                    params.0.book
                ))]));
            }
            store
                .list_chunks(key)
                .map_err(|e| internal("Failed to list chunks", e))?
        };

        let output: Vec<ChunkJson> = chunks.iter().map(ChunkJson::from).collect();
        Ok(CallToolResult::success(vec![Content::text(to_json(&output)?)]))
    }

    #[tool(description = "List the generation models available on the model server. The embedding model is left out.")]
    async fn rag_list_models(&self) -> Result<CallToolResult, McpError> {
        match self.pipeline.list_models().await {
            Ok(models) => Ok(CallToolResult::success(vec![Content::text(to_json(&models)?)])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Failed to retrieve models. {}",
                e
            ))])),
        }
    }

    #[tool(description = "Get library statistics and conversation memory usage.")]
    async fn rag_status(&self) -> Result<CallToolResult, McpError> {
        let stats = self
            .store()?
            .stats()
            .map_err(|e| internal("Failed to read stats", e))?;
        let memory = self.memory.lock().await;
        let output = status_json(&stats, &memory);
        Ok(CallToolResult::success(vec![Content::text(to_json(&output)?)]))
    }
}

#[tool_handler]
impl ServerHandler for BookwormService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "bookworm MCP Server. Answers questions from a personal library using retrieved passages.".to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(config: Config) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let store = EmbeddingStore::open(&config.database)?
        .with_vacuum_threshold(config.store.vacuum_threshold);
    let endpoint = &config.embedding;
    let embedder = bookworm::search::HttpEmbedder::new(&endpoint.url, &endpoint.model, endpoint.timeout())?;
    let endpoint = &config.generation;
    let generator = bookworm::chat::HttpGenerator::new(&endpoint.url, &endpoint.model, endpoint.timeout())?
        .with_models_url(endpoint.models_url.clone());

    let pipeline = QueryPipeline::new(Arc::new(embedder), Arc::new(generator), Arc::new(Mutex::new(store)))
        .with_top_n(config.search.top_n);
    let memory = ConversationMemory::new(config.memory.token_ceiling);

    tracing::info!(database = %config.database.display(), "starting MCP server on stdio");
    let service = BookwormService::new(pipeline, memory, &config);
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
