//! Loading text documents
//!
//! Documents are plain text (`.txt`, `.md`). Pages are separated by form
//! feeds, the page break `pdftotext` emits; a file without form feeds is a
//! single page.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::chunker::Page;
use crate::core::error::Result;

/// Extensions picked up when walking a directory
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

const PAGE_BREAK: char = '\x0c';

/// Pages to keep from a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRange {
    /// Pages to skip from the start
    pub start: usize,
    /// First page not kept
    pub stop: Option<usize>,
}

impl PageRange {
    pub fn new(start: Option<usize>, stop: Option<usize>) -> Self {
        Self {
            start: start.unwrap_or(0),
            stop,
        }
    }

    fn contains(&self, page: usize) -> bool {
        page >= self.start && self.stop.map_or(true, |stop| page < stop)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: PathBuf,
    /// File name without directories; the book's key in the store
    pub file_name: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// Load a document, keeping the pages in `range`
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn load(path: &Path, range: PageRange) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::from_text(path.to_path_buf(), file_name, &content, range))
    }

    pub fn from_text(path: PathBuf, file_name: String, content: &str, range: PageRange) -> Self {
        let pages = split_pages(content)
            .into_iter()
            .filter(|page| range.contains(page.number))
            .collect();

        Self {
            path,
            file_name,
            pages,
        }
    }
}

/// Split text into pages at form feeds
///
/// The empty piece after a final form feed is not a page.
pub fn split_pages(content: &str) -> Vec<Page> {
    let mut pieces: Vec<&str> = content.split(PAGE_BREAK).collect();
    if pieces.len() > 1 && pieces.last().is_some_and(|p| p.trim().is_empty()) {
        pieces.pop();
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(number, text)| Page {
            number,
            text: text.to_string(),
        })
        .collect()
}

/// Resolve an input to the document paths it names
///
/// A file is taken as is; a directory is walked for supported extensions;
/// anything else is treated as a glob pattern. Results are sorted.
pub fn collect_documents(input: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(input);

    let mut paths = if path.is_file() {
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
            .map(|entry| entry.into_path())
            .collect()
    } else {
        let mut matched = Vec::new();
        for entry in glob::glob(input)? {
            match entry {
                Ok(p) if p.is_file() => matched.push(p),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping unreadable path"),
            }
        }
        matched
    };

    paths.sort();
    Ok(paths)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
