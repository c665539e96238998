//! Bounded conversation memory
//!
//! Memory is an ordered log of query/response pairs kept under a token
//! ceiling. When the total goes over, the oldest entries are evicted first.

use std::collections::VecDeque;

use super::tokens::{ApproxTokenCounter, TokenCounter};
use crate::core::config::DEFAULT_TOKEN_CEILING;

/// One prior exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub query: String,
    pub response: String,
}

impl MemoryEntry {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }
}

pub struct ConversationMemory {
    entries: VecDeque<(MemoryEntry, usize)>,
    total_tokens: usize,
    ceiling: usize,
    counter: Box<dyn TokenCounter>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_CEILING)
    }
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("entries", &self.entries.len())
            .field("total_tokens", &self.total_tokens)
            .field("ceiling", &self.ceiling)
            .finish()
    }
}

impl ConversationMemory {
    /// Memory with the approximate token counter
    pub fn new(ceiling: usize) -> Self {
        Self::with_counter(ceiling, Box::new(ApproxTokenCounter))
    }

    pub fn with_counter(ceiling: usize, counter: Box<dyn TokenCounter>) -> Self {
        Self {
            entries: VecDeque::new(),
            total_tokens: 0,
            ceiling,
            counter,
        }
    }

    fn entry_tokens(&self, entry: &MemoryEntry) -> usize {
        self.counter.count(&entry.query) + self.counter.count(&entry.response)
    }

    /// Append an exchange, then evict down to the ceiling
    ///
    /// Returns the evicted entries, oldest first. If the new entry alone is
    /// over the ceiling it is evicted as well.
    pub fn append(&mut self, query: impl Into<String>, response: impl Into<String>) -> Vec<MemoryEntry> {
        let entry = MemoryEntry::new(query, response);
        let tokens = self.entry_tokens(&entry);
        self.entries.push_back((entry, tokens));
        self.total_tokens += tokens;

        self.evict_to_budget(self.ceiling)
    }

    /// Drop oldest entries until the total is at most `ceiling`
    ///
    /// Removes no more than needed; ends with an empty memory at worst.
    pub fn evict_to_budget(&mut self, ceiling: usize) -> Vec<MemoryEntry> {
        let mut evicted = Vec::new();
        while self.total_tokens > ceiling {
            let Some((entry, tokens)) = self.entries.pop_front() else {
                break;
            };
            self.total_tokens -= tokens;
            evicted.push(entry);
        }

        if !evicted.is_empty() {
            tracing::debug!(
                evicted = evicted.len(),
                remaining = self.entries.len(),
                tokens = self.total_tokens,
                "evicted conversation memory"
            );
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_tokens = 0;
    }

    pub fn token_count(&self) -> usize {
        self.total_tokens
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter().map(|(entry, _)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tokens::WordTokenCounter;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn memory(ceiling: usize) -> ConversationMemory {
        ConversationMemory::with_counter(ceiling, Box::new(WordTokenCounter))
    }

    #[test]
    fn test_append_under_ceiling_keeps_everything() {
        let mut mem = memory(100);
        assert!(mem.append(words(10), words(10)).is_empty());
        assert!(mem.append(words(10), words(10)).is_empty());
        assert_eq!(mem.len(), 2);
        assert_eq!(mem.token_count(), 40);
    }

    #[test]
    fn test_three_appends_evict_oldest_in_order() {
        let mut mem = memory(50);
        assert!(mem.append("first", words(19)).is_empty());
        assert!(mem.append("second", words(19)).is_empty());
        let evicted = mem.append("third", words(19));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].query, "first");
        assert!(mem.token_count() <= 50);
        let queries: Vec<&str> = mem.entries().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["second", "third"]);
    }

    #[test]
    fn test_eviction_removes_no_more_than_needed() {
        let mut mem = memory(1000);
        for i in 0..5 {
            mem.append(format!("q{}", i), words(9));
        }
        assert_eq!(mem.token_count(), 50);

        let evicted = mem.evict_to_budget(25);
        let queries: Vec<&str> = evicted.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["q0", "q1", "q2"]);
        assert_eq!(mem.token_count(), 20);
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn test_oversized_entry_empties_memory() {
        let mut mem = memory(10);
        mem.append("small", "one");
        let evicted = mem.append("huge", words(50));

        assert_eq!(evicted.len(), 2);
        assert_eq!(evicted[1].query, "huge");
        assert!(mem.is_empty());
        assert_eq!(mem.token_count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut mem = ConversationMemory::new(DEFAULT_TOKEN_CEILING);
        mem.append("What is a hobbit?", "A small person.");
        assert!(mem.token_count() > 0);
        mem.clear();
        assert!(mem.is_empty());
        assert_eq!(mem.token_count(), 0);
        assert_eq!(mem.ceiling(), DEFAULT_TOKEN_CEILING);
    }

    #[test]
    fn test_approx_counts_both_sides() {
        let mut mem = ConversationMemory::new(1000);
        // 5 chars -> 2 tokens, 8 chars -> 2 tokens
        mem.append("hello", "world!!!");
        assert_eq!(mem.token_count(), 4);
    }

    proptest! {
        #[test]
        fn test_append_stays_under_ceiling(
            sizes in prop::collection::vec(0usize..40, 0..30),
            ceiling in 0usize..100,
        ) {
            let mut mem = memory(ceiling);
            for (i, n) in sizes.iter().enumerate() {
                mem.append(format!("q{}", i), words(*n));
                prop_assert!(mem.token_count() <= ceiling || mem.is_empty());
                let recount: usize = mem.entries().map(|e| 1 + e.response.split_whitespace().count()).sum();
                prop_assert_eq!(mem.token_count(), recount);
            }
        }

        #[test]
        fn test_eviction_is_minimal(
            sizes in prop::collection::vec(0usize..40, 1..30),
            budget in 0usize..200,
        ) {
            let mut mem = memory(usize::MAX);
            for (i, n) in sizes.iter().enumerate() {
                mem.append(format!("q{}", i), words(*n));
            }
            let before: Vec<MemoryEntry> = mem.entries().cloned().collect();

            let evicted = mem.evict_to_budget(budget);
            prop_assert!(mem.token_count() <= budget || mem.is_empty());

            // Oldest entries go first, the rest keep their order
            let remaining: Vec<MemoryEntry> = mem.entries().cloned().collect();
            prop_assert_eq!(&before[..evicted.len()], &evicted[..]);
            prop_assert_eq!(&before[evicted.len()..], &remaining[..]);

            // Just before the last eviction the memory was still over budget
            if let Some(last) = evicted.last() {
                let last_tokens = 1 + last.response.split_whitespace().count();
                prop_assert!(mem.token_count() + last_tokens > budget);
            }
        }
    }
}
