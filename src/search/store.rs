//! Embedding store using SQLite
//!
//! Books and their chunks live in two tables; chunk embeddings are stored as
//! little-endian f32 BLOBs and compared in Rust (see [`super::engine`]).
//!
//! Every mutating call runs in its own transaction. Missing books and
//! duplicate rows are not errors: mutators report them as an [`Outcome`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::core::error::{Error, Result};

/// Timestamp format of `books.date_added`
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const META_EMBEDDING_DIM: &str = "embedding_dim";
pub const META_EMBEDDING_MODEL: &str = "embedding_model";

const DEFAULT_VACUUM_THRESHOLD: f64 = 0.25;

/// Result of a store mutation that can legitimately do nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    NotFound,
    AlreadyExists,
}

impl Outcome {
    pub fn applied(self) -> bool {
        self == Outcome::Applied
    }
}

/// How a book is looked up: by id, or by file name / name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookKey {
    Id(i64),
    Name(String),
    /// Numeric user input: the id if such a book exists, otherwise a name
    IdOrName(i64, String),
}

impl From<i64> for BookKey {
    fn from(id: i64) -> Self {
        BookKey::Id(id)
    }
}

impl From<&str> for BookKey {
    fn from(name: &str) -> Self {
        BookKey::Name(name.to_string())
    }
}

impl From<String> for BookKey {
    fn from(name: String) -> Self {
        BookKey::Name(name)
    }
}

impl From<&String> for BookKey {
    fn from(name: &String) -> Self {
        BookKey::Name(name.clone())
    }
}

impl BookKey {
    /// Interpret user input
    ///
    /// Numeric input is tried as an id first, so a book called `1984` stays
    /// reachable by name.
    pub fn from_input(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(id) => BookKey::IdOrName(id, s.to_string()),
            Err(_) => BookKey::Name(s.to_string()),
        }
    }
}

impl FromStr for BookKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_input(s))
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookKey::Id(id) => write!(f, "#{}", id),
            BookKey::Name(name) | BookKey::IdOrName(_, name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub date_added: NaiveDateTime,
    pub file_name: String,
    pub excluded: bool,
    pub focused: bool,
}

/// A chunk as handed to the store by the ingestion pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub file_name: String,
    pub page_number: i64,
    pub source_page: i64,
    pub char_count: i64,
    pub word_count: i64,
    pub token_count: i64,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

/// Chunk listing row
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSummary {
    pub id: i64,
    pub page_number: i64,
    pub source_page: i64,
    pub char_count: i64,
    pub token_count: i64,
    pub text: String,
    pub has_embedding: bool,
}

/// A search candidate: an eligible chunk with its decoded embedding
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: i64,
    pub book_id: i64,
    pub file_name: String,
    pub page_number: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Which books take part in a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Every book that is not excluded
    #[default]
    All,
    /// Only focused books that are not excluded
    FocusOnly,
}

#[derive(Debug, Clone, Copy)]
enum BookFlag {
    Excluded,
    Focused,
}

impl BookFlag {
    fn column(self) -> &'static str {
        match self {
            BookFlag::Excluded => "excluded",
            BookFlag::Focused => "focused",
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub book_count: usize,
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub excluded_books: usize,
    pub focused_books: usize,
    pub embedding_dim: Option<usize>,
    pub embedding_model: Option<String>,
    pub last_added: Option<NaiveDateTime>,
}

/// SQLite-backed store of books, chunks and their embeddings
pub struct EmbeddingStore {
    conn: Connection,
    vacuum_threshold: f64,
}

impl EmbeddingStore {
    /// Open or create database at path
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn,
            vacuum_threshold: DEFAULT_VACUUM_THRESHOLD,
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Fraction of free pages above which a removal triggers `VACUUM`
    pub fn with_vacuum_threshold(mut self, threshold: f64) -> Self {
        self.vacuum_threshold = threshold;
        self
    }

    /// Create tables and indexes if they do not exist
    pub fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                date_added TEXT NOT NULL,
                file_name TEXT NOT NULL,
                excluded INTEGER NOT NULL DEFAULT 0,
                focused INTEGER NOT NULL DEFAULT 0,
                UNIQUE (name, file_name)
            );

            -- embedding: dimension * 4 bytes of little-endian f32, NULL when the embedder failed
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
                file_name TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                source_page INTEGER NOT NULL DEFAULT 0,
                char_count INTEGER NOT NULL,
                word_count INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB,
                UNIQUE (book_id, page_number)
            );

            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_books_file_name ON books(file_name);
            CREATE INDEX IF NOT EXISTS idx_books_name ON books(name);
            CREATE INDEX IF NOT EXISTS idx_chunks_file_page ON chunks(file_name, page_number);
            "#,
        )?;

        Ok(())
    }

    /// Add a book unless the `(name, file_name)` pair already exists
    pub fn add_book(&self, name: &str, file_name: &str) -> Result<Outcome> {
        let date_added = Local::now().format(DATE_FORMAT).to_string();
        let inserted = self.conn.execute(
            r#"
            INSERT INTO books (name, date_added, file_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name, file_name) DO NOTHING
            "#,
            params![name, date_added, file_name],
        )?;

        Ok(if inserted == 0 {
            Outcome::AlreadyExists
        } else {
            Outcome::Applied
        })
    }

    /// Find a book by id, or by file name / name (lowest id wins)
    pub fn get_book(&self, key: impl Into<BookKey>) -> Result<Option<Book>> {
        match key.into() {
            BookKey::Id(id) => self.book_by_id(id),
            BookKey::Name(name) => self.book_by_name(&name),
            BookKey::IdOrName(id, name) => match self.book_by_id(id)? {
                Some(book) => Ok(Some(book)),
                None => self.book_by_name(&name),
            },
        }
    }

    fn book_by_id(&self, id: i64) -> Result<Option<Book>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, date_added, file_name, excluded, focused FROM books WHERE id = ?1",
                params![id],
                row_to_book,
            )
            .optional()?)
    }

    fn book_by_name(&self, name: &str) -> Result<Option<Book>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, name, date_added, file_name, excluded, focused FROM books
                WHERE file_name = ?1 OR name = ?1
                ORDER BY id
                LIMIT 1
                "#,
                params![name],
                row_to_book,
            )
            .optional()?)
    }

    /// Insert a chunk under the book named by its `file_name`
    ///
    /// `NotFound` when the book does not exist, `AlreadyExists` when the book
    /// already has a chunk with this `page_number`. A non-empty embedding
    /// whose dimension differs from the store's is rejected.
    pub fn add_chunk(&self, record: &ChunkRecord) -> Result<Outcome> {
        let Some(book) = self.get_book(record.file_name.as_str())? else {
            return Ok(Outcome::NotFound);
        };

        let tx = self.conn.unchecked_transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM chunks WHERE book_id = ?1 AND page_number = ?2)",
            params![book.id, record.page_number],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(Outcome::AlreadyExists);
        }

        if let Some(embedding) = record.embedding.as_deref() {
            if !embedding.is_empty() {
                claim_dimension(&tx, embedding.len())?;
            }
        }

        let blob = record.embedding.as_deref().map(embedding_to_blob);
        tx.execute(
            r#"
            INSERT INTO chunks (book_id, file_name, page_number, source_page, char_count, word_count, token_count, text, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                book.id,
                record.file_name,
                record.page_number,
                record.source_page,
                record.char_count,
                record.word_count,
                record.token_count,
                record.text,
                blob,
            ],
        )?;
        tx.commit()?;

        Ok(Outcome::Applied)
    }

    /// Whether a chunk with identical file, ordinal and text is stored
    pub fn chunk_exists(&self, file_name: &str, page_number: i64, text: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM chunks WHERE file_name = ?1 AND page_number = ?2 AND text = ?3)",
            params![file_name, page_number, text],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Delete a book and all its chunks, compacting the file if worthwhile
    pub fn remove_book(&self, key: impl Into<BookKey>) -> Result<Outcome> {
        let Some(book) = self.get_book(key)? else {
            return Ok(Outcome::NotFound);
        };

        let tx = self.conn.unchecked_transaction()?;
        // Foreign keys may be off for handles opened elsewhere
        tx.execute("DELETE FROM chunks WHERE book_id = ?1", params![book.id])?;
        tx.execute("DELETE FROM books WHERE id = ?1", params![book.id])?;
        release_dimension_if_empty(&tx)?;
        tx.commit()?;

        tracing::info!(book = %book.name, id = book.id, "removed book");
        self.compact_if_fragmented()?;

        Ok(Outcome::Applied)
    }

    /// Delete one chunk
    pub fn remove_chunk(&self, file_name: &str, page_number: i64) -> Result<Outcome> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute(
            "DELETE FROM chunks WHERE file_name = ?1 AND page_number = ?2",
            params![file_name, page_number],
        )?;
        release_dimension_if_empty(&tx)?;
        tx.commit()?;

        Ok(if deleted == 0 {
            Outcome::NotFound
        } else {
            Outcome::Applied
        })
    }

    pub fn list_books(&self) -> Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, date_added, file_name, excluded, focused FROM books ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_book)?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    /// List the chunks of a book in ordinal order; empty if the book is missing
    pub fn list_chunks(&self, key: impl Into<BookKey>) -> Result<Vec<ChunkSummary>> {
        let Some(book) = self.get_book(key)? else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, page_number, source_page, char_count, token_count, text, embedding IS NOT NULL
            FROM chunks
            WHERE book_id = ?1
            ORDER BY page_number
            "#,
        )?;
        let rows = stmt.query_map(params![book.id], |row| {
            Ok(ChunkSummary {
                id: row.get(0)?,
                page_number: row.get(1)?,
                source_page: row.get(2)?,
                char_count: row.get(3)?,
                token_count: row.get(4)?,
                text: row.get(5)?,
                has_embedding: row.get(6)?,
            })
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    /// Decoded embedding of one chunk; `None` if the chunk or its embedding is absent
    pub fn get_vector(&self, file_name: &str, page_number: i64) -> Result<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT embedding FROM chunks WHERE file_name = ?1 AND page_number = ?2",
                params![file_name, page_number],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        blob.map(|b| blob_to_embedding(&b)).transpose()
    }

    pub fn exclude_book(&self, key: impl Into<BookKey>) -> Result<Outcome> {
        self.set_flag(key.into(), BookFlag::Excluded, true)
    }

    pub fn include_book(&self, key: impl Into<BookKey>) -> Result<Outcome> {
        self.set_flag(key.into(), BookFlag::Excluded, false)
    }

    pub fn focus_book(&self, key: impl Into<BookKey>) -> Result<Outcome> {
        self.set_flag(key.into(), BookFlag::Focused, true)
    }

    pub fn un_focus_book(&self, key: impl Into<BookKey>) -> Result<Outcome> {
        self.set_flag(key.into(), BookFlag::Focused, false)
    }

    fn set_flag(&self, key: BookKey, flag: BookFlag, value: bool) -> Result<Outcome> {
        let Some(book) = self.get_book(key)? else {
            return Ok(Outcome::NotFound);
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!("UPDATE books SET {} = ?1 WHERE id = ?2", flag.column()),
            params![value, book.id],
        )?;
        tx.commit()?;

        Ok(Outcome::Applied)
    }

    /// Chunks eligible for a search, in ascending id order
    ///
    /// Chunks of excluded books are never returned; with
    /// [`FilterMode::FocusOnly`] the book must also be focused. Chunks stored
    /// without an embedding are skipped.
    pub fn eligible_chunks(&self, filter: FilterMode) -> Result<Vec<StoredChunk>> {
        let focus_clause = match filter {
            FilterMode::All => "",
            FilterMode::FocusOnly => "AND b.focused = 1",
        };
        let sql = format!(
            r#"
            SELECT c.id, c.book_id, c.file_name, c.page_number, c.text, c.embedding
            FROM chunks c
            JOIN books b ON c.book_id = b.id
            WHERE b.excluded = 0 {} AND c.embedding IS NOT NULL
            ORDER BY c.id
            "#,
            focus_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(5)?;
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                blob,
            ))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let (id, book_id, file_name, page_number, text, blob) = row?;
            chunks.push(StoredChunk {
                id,
                book_id,
                file_name,
                page_number,
                text,
                embedding: blob_to_embedding(&blob)?,
            });
        }
        Ok(chunks)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let last_added: Option<String> = self
            .conn
            .query_row("SELECT MAX(date_added) FROM books", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(StoreStats {
            book_count: count("SELECT COUNT(*) FROM books")?,
            chunk_count: count("SELECT COUNT(*) FROM chunks")?,
            embedded_count: count("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")?,
            excluded_books: count("SELECT COUNT(*) FROM books WHERE excluded = 1")?,
            focused_books: count("SELECT COUNT(*) FROM books WHERE focused = 1")?,
            embedding_dim: self.embedding_dim()?,
            embedding_model: self.get_meta(META_EMBEDDING_MODEL)?,
            last_added: last_added
                .and_then(|s| NaiveDateTime::parse_from_str(&s, DATE_FORMAT).ok()),
        })
    }

    /// Dimension shared by every stored embedding, once one has been stored
    pub fn embedding_dim(&self) -> Result<Option<usize>> {
        read_dimension(&self.conn)
    }

    /// Set store metadata
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        write_meta(&self.conn, key, value)
    }

    /// Get store metadata
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        read_meta(&self.conn, key)
    }

    /// `VACUUM` when the free-page ratio exceeds the threshold
    ///
    /// Returns whether the store was compacted.
    pub fn compact_if_fragmented(&self) -> Result<bool> {
        let free_pages: i64 = self
            .conn
            .pragma_query_value(None, "freelist_count", |row| row.get(0))?;
        let total_pages: i64 = self
            .conn
            .pragma_query_value(None, "page_count", |row| row.get(0))?;

        if total_pages == 0 {
            return Ok(false);
        }

        let ratio = free_pages as f64 / total_pages as f64;
        if ratio <= self.vacuum_threshold {
            return Ok(false);
        }

        tracing::debug!(free_pages, total_pages, "compacting store");
        self.conn.execute_batch("VACUUM")?;
        Ok(true)
    }
}

fn row_to_book(row: &Row<'_>) -> rusqlite::Result<Book> {
    let date_added: String = row.get(2)?;
    let date_added = NaiveDateTime::parse_from_str(&date_added, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Book {
        id: row.get(0)?,
        name: row.get(1)?,
        date_added,
        file_name: row.get(3)?,
        excluded: row.get(4)?,
        focused: row.get(5)?,
    })
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    Ok(value)
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn read_dimension(conn: &Connection) -> Result<Option<usize>> {
    Ok(read_meta(conn, META_EMBEDDING_DIM)?.and_then(|v| v.parse().ok()))
}

/// Record `dim` as the store dimension, or check it against the recorded one
fn claim_dimension(conn: &Connection, dim: usize) -> Result<()> {
    match read_dimension(conn)? {
        Some(expected) if expected != dim => Err(Error::DimensionMismatch {
            expected,
            found: dim,
        }),
        Some(_) => Ok(()),
        None => write_meta(conn, META_EMBEDDING_DIM, &dim.to_string()),
    }
}

/// Forget the dimension once no non-empty embedding is left
fn release_dimension_if_empty(conn: &Connection) -> Result<()> {
    let remaining: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chunks WHERE length(embedding) > 0)",
        [],
        |row| row.get(0),
    )?;
    if !remaining {
        conn.execute(
            "DELETE FROM store_meta WHERE key = ?1",
            params![META_EMBEDDING_DIM],
        )?;
    }
    Ok(())
}

/// Convert f32 embedding to BLOB
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 embedding
pub fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::CorruptEmbedding { len: blob.len() });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(file_name: &str, page_number: i64, embedding: Option<Vec<f32>>) -> ChunkRecord {
        let text = format!("Text of chunk {} in {}.", page_number, file_name);
        ChunkRecord {
            file_name: file_name.to_string(),
            page_number,
            source_page: page_number,
            char_count: text.chars().count() as i64,
            word_count: text.split_whitespace().count() as i64,
            token_count: text.chars().count() as i64 / 4,
            text,
            embedding,
        }
    }

    fn chunk_rows(store: &EmbeddingStore) -> i64 {
        store
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_blob_conversion() {
        let embedding = vec![1.0, 2.0, 3.0, -0.5, f32::MIN_POSITIVE];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob.len(), embedding.len() * 4);
        let recovered = blob_to_embedding(&blob).unwrap();
        assert_eq!(embedding, recovered);
    }

    #[test]
    fn test_blob_is_little_endian() {
        assert_eq!(embedding_to_blob(&[1.0]), vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn test_corrupt_blob() {
        assert!(matches!(
            blob_to_embedding(&[0, 0, 128]),
            Err(Error::CorruptEmbedding { len: 3 })
        ));
        assert_eq!(blob_to_embedding(&[]).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_create_schema_is_idempotent() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.create_schema()?;
        store.create_schema()?;
        assert_eq!(store.list_books()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_add_book_twice_is_noop() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        assert_eq!(store.add_book("Alpha", "alpha.pdf")?, Outcome::Applied);
        assert_eq!(store.add_book("Alpha", "alpha.pdf")?, Outcome::AlreadyExists);
        // Same name, different file is a different book
        assert_eq!(store.add_book("Alpha", "alpha-2.pdf")?, Outcome::Applied);

        let books = store.list_books()?;
        assert_eq!(books.len(), 2);
        assert!(!books[0].excluded);
        assert!(!books[0].focused);
        Ok(())
    }

    #[test]
    fn test_get_book_by_id_name_and_file() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_book("Beta", "beta.pdf")?;

        let by_name = store.get_book("Beta")?.unwrap();
        let by_file = store.get_book("beta.pdf")?.unwrap();
        let by_id = store.get_book(by_name.id)?.unwrap();
        assert_eq!(by_name, by_file);
        assert_eq!(by_name, by_id);
        assert_eq!(by_id.file_name, "beta.pdf");

        assert!(store.get_book("Gamma")?.is_none());
        assert!(store.get_book(999i64)?.is_none());
        Ok(())
    }

    #[test]
    fn test_get_book_first_match_wins() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("shared", "first.txt")?;
        store.add_book("other", "shared")?;
        assert_eq!(store.get_book("shared")?.unwrap().file_name, "first.txt");
        Ok(())
    }

    #[test]
    fn test_book_key_parsing() {
        assert_eq!(
            "42".parse::<BookKey>().unwrap(),
            BookKey::IdOrName(42, "42".to_string())
        );
        assert_eq!(
            "alpha.pdf".parse::<BookKey>().unwrap(),
            BookKey::Name("alpha.pdf".to_string())
        );
    }

    #[test]
    fn test_numeric_input_falls_back_to_name() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_book("1984", "orwell.txt")?;

        // Id 1 exists, so it wins over a name lookup
        assert_eq!(store.get_book(BookKey::from_input("1"))?.unwrap().name, "Alpha");
        // No book has id 1984; the name matches
        let found = store.get_book(BookKey::from_input("1984"))?.unwrap();
        assert_eq!(found.file_name, "orwell.txt");
        assert_eq!(BookKey::from_input("1984").to_string(), "1984");

        assert_eq!(store.focus_book(BookKey::from_input("1984"))?, Outcome::Applied);
        assert!(store.get_book("orwell.txt")?.unwrap().focused);
        assert_eq!(store.remove_book(BookKey::from_input("1984"))?, Outcome::Applied);
        assert_eq!(store.get_book(BookKey::from_input("1984"))?, None);
        Ok(())
    }

    #[test]
    fn test_add_chunk_twice_leaves_one_row() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;

        let chunk = record("alpha.pdf", 1, Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(store.add_chunk(&chunk)?, Outcome::Applied);
        assert_eq!(store.add_chunk(&chunk)?, Outcome::AlreadyExists);

        let mut changed = chunk.clone();
        changed.text = "Different text, same page.".to_string();
        assert_eq!(store.add_chunk(&changed)?, Outcome::AlreadyExists);

        assert_eq!(chunk_rows(&store), 1);
        assert_eq!(store.list_chunks("Alpha")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_add_chunk_without_book_is_not_found() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        let outcome = store.add_chunk(&record("missing.pdf", 0, None))?;
        assert_eq!(outcome, Outcome::NotFound);
        assert_eq!(chunk_rows(&store), 0);
        Ok(())
    }

    #[test]
    fn test_chunk_without_embedding_is_stored_as_null() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_chunk(&record("alpha.pdf", 0, None))?;

        assert_eq!(store.get_vector("alpha.pdf", 0)?, None);
        let chunks = store.list_chunks("alpha.pdf")?;
        assert!(!chunks[0].has_embedding);
        assert!(store.eligible_chunks(FilterMode::All)?.is_empty());
        assert_eq!(store.embedding_dim()?, None);
        Ok(())
    }

    #[test]
    fn test_get_vector_round_trip() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        let embedding = vec![0.25, -0.75, 1.5, 0.0];
        store.add_chunk(&record("alpha.pdf", 3, Some(embedding.clone())))?;

        assert_eq!(store.get_vector("alpha.pdf", 3)?, Some(embedding));
        assert_eq!(store.get_vector("alpha.pdf", 4)?, None);
        assert_eq!(store.get_vector("beta.pdf", 3)?, None);
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_chunk(&record("alpha.pdf", 0, Some(vec![1.0, 0.0, 0.0])))?;
        assert_eq!(store.embedding_dim()?, Some(3));

        let result = store.add_chunk(&record("alpha.pdf", 1, Some(vec![1.0, 0.0])));
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 3,
                found: 2
            })
        ));
        assert_eq!(chunk_rows(&store), 1);

        // Empty and absent embeddings carry no dimension
        assert_eq!(
            store.add_chunk(&record("alpha.pdf", 2, Some(Vec::new())))?,
            Outcome::Applied
        );
        assert_eq!(store.add_chunk(&record("alpha.pdf", 3, None))?, Outcome::Applied);
        Ok(())
    }

    #[test]
    fn test_dimension_released_when_store_empties() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_chunk(&record("alpha.pdf", 0, Some(vec![1.0, 0.0, 0.0])))?;
        store.remove_book("Alpha")?;
        assert_eq!(store.embedding_dim()?, None);

        store.add_book("Beta", "beta.pdf")?;
        assert_eq!(
            store.add_chunk(&record("beta.pdf", 0, Some(vec![1.0, 0.0])))?,
            Outcome::Applied
        );
        assert_eq!(store.embedding_dim()?, Some(2));
        Ok(())
    }

    #[test]
    fn test_chunk_exists_matches_text() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        let chunk = record("alpha.pdf", 0, None);
        store.add_chunk(&chunk)?;

        assert!(store.chunk_exists("alpha.pdf", 0, &chunk.text)?);
        assert!(!store.chunk_exists("alpha.pdf", 0, "edited text")?);
        assert!(!store.chunk_exists("alpha.pdf", 1, &chunk.text)?);
        Ok(())
    }

    #[test]
    fn test_remove_book_cascades() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?.with_vacuum_threshold(0.01);
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_book("Beta", "beta.pdf")?;
        for page in 0..20 {
            store.add_chunk(&record("alpha.pdf", page, Some(vec![1.0, 0.5])))?;
        }
        store.add_chunk(&record("beta.pdf", 0, Some(vec![0.5, 1.0])))?;

        assert_eq!(store.remove_book("alpha.pdf")?, Outcome::Applied);
        assert!(store.get_book("Alpha")?.is_none());
        assert_eq!(chunk_rows(&store), 1);
        assert_eq!(store.list_chunks("Beta")?.len(), 1);

        assert_eq!(store.remove_book("Alpha")?, Outcome::NotFound);
        Ok(())
    }

    #[test]
    fn test_cascade_on_direct_book_delete() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_chunk(&record("alpha.pdf", 0, None))?;
        store.conn.execute("DELETE FROM books", [])?;
        assert_eq!(chunk_rows(&store), 0);
        Ok(())
    }

    #[test]
    fn test_remove_chunk() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_chunk(&record("alpha.pdf", 0, None))?;
        store.add_chunk(&record("alpha.pdf", 1, None))?;

        assert_eq!(store.remove_chunk("alpha.pdf", 0)?, Outcome::Applied);
        assert_eq!(store.remove_chunk("alpha.pdf", 0)?, Outcome::NotFound);
        let remaining = store.list_chunks("Alpha")?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].page_number, 1);
        Ok(())
    }

    #[test]
    fn test_flags() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;

        assert_eq!(store.exclude_book("Alpha")?, Outcome::Applied);
        assert!(store.get_book("Alpha")?.unwrap().excluded);
        store.include_book("alpha.pdf")?;
        assert!(!store.get_book("Alpha")?.unwrap().excluded);

        let id = store.get_book("Alpha")?.unwrap().id;
        store.focus_book(id)?;
        let book = store.get_book(id)?.unwrap();
        assert!(book.focused);
        assert!(!book.excluded);
        store.un_focus_book(id)?;
        assert!(!store.get_book(id)?.unwrap().focused);

        assert_eq!(store.exclude_book("Nope")?, Outcome::NotFound);
        assert_eq!(store.focus_book(12345i64)?, Outcome::NotFound);
        Ok(())
    }

    #[test]
    fn test_eligible_chunks_filters() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_book("Beta", "beta.pdf")?;
        store.add_chunk(&record("alpha.pdf", 0, Some(vec![1.0, 0.0])))?;
        store.add_chunk(&record("beta.pdf", 0, Some(vec![0.0, 1.0])))?;
        store.add_chunk(&record("alpha.pdf", 1, Some(vec![0.5, 0.5])))?;

        let all: Vec<i64> = store
            .eligible_chunks(FilterMode::All)?
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(all, vec![1, 2, 3]);
        assert!(store.eligible_chunks(FilterMode::FocusOnly)?.is_empty());

        store.focus_book("Beta")?;
        let focused = store.eligible_chunks(FilterMode::FocusOnly)?;
        assert_eq!(focused.len(), 1);
        assert_eq!(focused[0].file_name, "beta.pdf");
        assert_eq!(focused[0].embedding, vec![0.0, 1.0]);

        store.exclude_book("Beta")?;
        assert!(store.eligible_chunks(FilterMode::FocusOnly)?.is_empty());
        assert_eq!(store.eligible_chunks(FilterMode::All)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_stats_and_meta() -> Result<()> {
        let store = EmbeddingStore::open_in_memory()?;
        store.add_book("Alpha", "alpha.pdf")?;
        store.add_book("Beta", "beta.pdf")?;
        store.add_chunk(&record("alpha.pdf", 0, Some(vec![1.0, 0.0])))?;
        store.add_chunk(&record("alpha.pdf", 1, None))?;
        store.exclude_book("Beta")?;
        store.set_meta(META_EMBEDDING_MODEL, "nomic-embed-text")?;

        let stats = store.stats()?;
        assert_eq!(stats.book_count, 2);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.embedded_count, 1);
        assert_eq!(stats.excluded_books, 1);
        assert_eq!(stats.focused_books, 0);
        assert_eq!(stats.embedding_dim, Some(2));
        assert_eq!(stats.embedding_model.as_deref(), Some("nomic-embed-text"));
        assert!(stats.last_added.is_some());
        Ok(())
    }

    #[test]
    fn test_open_file_database_persists() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("library.db");
        {
            let store = EmbeddingStore::open(&path)?;
            store.add_book("Alpha", "alpha.pdf")?;
            store.add_chunk(&record("alpha.pdf", 0, Some(vec![0.5, 0.5])))?;
        }
        let store = EmbeddingStore::open(&path)?;
        assert_eq!(store.list_books()?.len(), 1);
        assert_eq!(store.get_vector("alpha.pdf", 0)?, Some(vec![0.5, 0.5]));
        Ok(())
    }

    proptest! {
        #[test]
        fn test_blob_preserves_every_value(embedding in prop::collection::vec(any::<f32>(), 0..256)) {
            let blob = embedding_to_blob(&embedding);
            prop_assert_eq!(blob.len(), embedding.len() * 4);

            let recovered = blob_to_embedding(&blob).unwrap();
            // Bitwise, so NaN payloads and signed zeros count too
            let expected: Vec<u32> = embedding.iter().map(|v| v.to_bits()).collect();
            let actual: Vec<u32> = recovered.iter().map(|v| v.to_bits()).collect();
            prop_assert_eq!(expected, actual);
        }

        #[test]
        fn test_blob_rejects_partial_values(blob in prop::collection::vec(any::<u8>(), 0..64)) {
            let result = blob_to_embedding(&blob);
            if blob.len() % 4 == 0 {
                prop_assert_eq!(result.unwrap().len(), blob.len() / 4);
            } else {
                let is_corrupt = matches!(result, Err(Error::CorruptEmbedding { .. }));
                prop_assert!(is_corrupt);
            }
        }
    }
}
