//! Token estimation for the conversation budget

/// Counts tokens in a piece of text
///
/// Implementations must be deterministic: memory caches the count of each
/// entry when it is appended.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// One token per four characters, rounded up
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// One token per whitespace-separated word
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenCounter;

impl TokenCounter for WordTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
