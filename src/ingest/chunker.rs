//! Sentence-aware chunker
//!
//! Page text is normalized, split into sentences and greedily packed into
//! chunks of at most `max_chars` characters. A chunk boundary always falls
//! between two whole sentences.
//!
//! Sentence splitting is a punctuation heuristic: a sentence ends at `.`, `!`
//! or `?` followed by whitespace, unless the text just before looks like an
//! abbreviation:
//!
//! - a single-letter initial (`J. R. R. Tolkien`)
//! - a dotted abbreviation (`e.g.`, `i.e.`, `U.S.`)
//! - a capitalised two-letter abbreviation (`Mr.`, `Dr.`, `St.`)
//!
//! Anything else still splits, so `Mrs. Dalloway`, `Prof. Smith` and
//! `etc. The` produce extra boundaries. Chunk boundaries of already ingested
//! documents depend on this exact behaviour; changing it re-chunks (and
//! re-embeds) every document on the next ingestion.

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::config::DEFAULT_MAX_CHUNK_CHARS;
use crate::search::store::ChunkRecord;

lazy_static! {
    static ref ABBREVIATION_TAIL: Regex =
        Regex::new(r"(?:(?:^|\s)[A-Z]\.|\w\.\w.|[A-Z][a-z]\.)$").unwrap();
}

/// Bytes of sentence tail inspected by the abbreviation guard
const GUARD_WINDOW: usize = 16;

/// One page of extracted text
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 0-based page number in the source document
    pub number: usize,
    pub text: String,
}

/// A packed chunk, ready to be embedded
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub file_name: String,
    /// Ordinal of this chunk within the document
    pub page_number: i64,
    /// Page the chunk was cut from
    pub source_page: i64,
    pub sentences: Vec<String>,
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub token_count: usize,
}

impl TextChunk {
    fn new(file_name: &str, page_number: i64, source_page: i64, sentences: Vec<String>) -> Self {
        let text = sentences.join(" ");
        let char_count = text.chars().count();
        Self {
            file_name: file_name.to_string(),
            page_number,
            source_page,
            word_count: text.split_whitespace().count(),
            token_count: approximate_tokens(char_count),
            char_count,
            sentences,
            text,
        }
    }

    /// Convert into a store record carrying the (possibly absent) embedding
    pub fn into_record(self, embedding: Option<Vec<f32>>) -> ChunkRecord {
        ChunkRecord {
            file_name: self.file_name,
            page_number: self.page_number,
            source_page: self.source_page,
            char_count: self.char_count as i64,
            word_count: self.word_count as i64,
            token_count: self.token_count as i64,
            text: self.text,
            embedding,
        }
    }
}

/// Chunker with a maximum chunk size in characters
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_CHARS)
    }
}

impl Chunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Chunk every page of a document
    ///
    /// Chunks are numbered consecutively across pages, starting at 0.
    /// Pages with no text produce no chunks.
    pub fn chunk_document(&self, file_name: &str, pages: &[Page]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();

        for page in pages {
            let sentences = split_sentences(&normalize(&page.text));
            for group in pack_sentences(sentences, self.max_chars) {
                let ordinal = chunks.len() as i64;
                chunks.push(TextChunk::new(file_name, ordinal, page.number as i64, group));
            }
        }

        chunks
    }
}

/// Collapse whitespace runs (newlines included) into single spaces and trim
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into sentences
///
/// Expects normalized text; returned sentences are trimmed and never empty.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace()
            && matches!(prev, Some('.' | '!' | '?'))
            && !ends_with_abbreviation(&text[start..i])
        {
            push_trimmed(&mut sentences, &text[start..i]);
            start = i + c.len_utf8();
        }
        prev = Some(c);
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    if !candidate.is_empty() {
        sentences.push(candidate.to_string());
    }
}

fn ends_with_abbreviation(sentence: &str) -> bool {
    let mut from = sentence.len().saturating_sub(GUARD_WINDOW);
    while !sentence.is_char_boundary(from) {
        from += 1;
    }
    ABBREVIATION_TAIL.is_match(&sentence[from..])
}

/// Greedily pack sentences into groups
///
/// A group's text is its sentences joined with single spaces. The next
/// sentence opens a new group when it would push the joined length past
/// `max_chars`. A sentence longer than `max_chars` becomes a group of its own.
pub fn pack_sentences(sentences: Vec<String>, max_chars: usize) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for sentence in sentences {
        let len = sentence.chars().count();
        let joined_len = if current.is_empty() {
            len
        } else {
            current_len + 1 + len
        };

        if current.is_empty() || joined_len <= max_chars {
            current.push(sentence);
            current_len = joined_len;
        } else {
            groups.push(std::mem::take(&mut current));
            current.push(sentence);
            current_len = len;
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

/// Rough token estimate used for chunk annotations: one token per 4 chars
pub fn approximate_tokens(char_count: usize) -> usize {
    char_count / 4
}
