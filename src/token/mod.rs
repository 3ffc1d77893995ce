//! Token Counter — pure, deterministic token estimation.
//!
//! The default and required estimator is character-based: `ceil(len/4)`.
//! Results are memoized by message id so repeated calls against the same
//! message never recompute. A [`TokenCounter`] trait exists so a real
//! tokenizer can be substituted, but the character estimate is what the
//! validation ratios in [`crate::summarization`] are defined against, and it
//! remains available regardless of what is plugged in.

use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Estimate the token count of a piece of text.
///
/// Implementations must be pure and total — no error conditions. The default
/// [`CharEstimator`] is authoritative whenever no provider-supplied counter is
/// configured.
pub trait TokenCounter: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// `ceil(len(text) / 4)`. Image content blocks contribute zero tokens and
/// never reach this function — they're filtered out by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharEstimator;

impl TokenCounter for CharEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Memoizing token counter. Wraps a [`TokenCounter`] and caches results by
/// message id so `count(id, text)` is O(1) after the first call for that id.
pub struct MemoizingCounter<C: TokenCounter = CharEstimator> {
    inner: C,
    cache: RwLock<HashMap<Uuid, usize>>,
}

impl Default for MemoizingCounter<CharEstimator> {
    fn default() -> Self {
        Self::new(CharEstimator)
    }
}

impl<C: TokenCounter> MemoizingCounter<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Count tokens for `text` identified by `id`, memoizing the result.
    /// A second call with the same `id` returns the cached value even if
    /// `text` differs — messages are immutable after insertion (§3), so a
    /// changed `text` under the same id would itself be an invariant
    /// violation upstream.
    pub fn count(&self, id: Uuid, text: &str) -> usize {
        if let Some(&cached) = self.cache.read().expect("cache lock poisoned").get(&id) {
            return cached;
        }
        let tokens = self.inner.estimate(text);
        self.cache
            .write()
            .expect("cache lock poisoned")
            .insert(id, tokens);
        tokens
    }

    /// Estimate without memoizing — used for transient text (in-flight
    /// streaming chunks) that has no stable message id yet.
    pub fn estimate(&self, text: &str) -> usize {
        self.inner.estimate(text)
    }

    pub fn forget(&self, id: Uuid) {
        self.cache.write().expect("cache lock poisoned").remove(&id);
    }

    pub fn len(&self) -> usize {
        self.cache.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_estimator_rounds_up() {
        let e = CharEstimator;
        assert_eq!(e.estimate(""), 0);
        assert_eq!(e.estimate("hi"), 1); // ceil(2/4) = 1
        assert_eq!(e.estimate("hello"), 2); // ceil(5/4) = 2
        assert_eq!(e.estimate("12345678"), 2); // ceil(8/4) = 2
        assert_eq!(e.estimate("123456789"), 3); // ceil(9/4) = 3
    }

    #[test]
    fn memoizes_by_id() {
        let counter = MemoizingCounter::default();
        let id = Uuid::new_v4();
        assert_eq!(counter.count(id, "hello world"), 3);
        assert_eq!(counter.len(), 1);
        // Same id, different text: still returns the memoized value.
        assert_eq!(counter.count(id, "completely different and much longer text"), 3);
    }

    #[test]
    fn distinct_ids_counted_independently() {
        let counter = MemoizingCounter::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(counter.count(a, "1234"), 1);
        assert_eq!(counter.count(b, "12345678"), 2);
        assert_eq!(counter.len(), 2);
    }

    #[test]
    fn forget_evicts_cache_entry() {
        let counter = MemoizingCounter::default();
        let id = Uuid::new_v4();
        counter.count(id, "hello");
        assert_eq!(counter.len(), 1);
        counter.forget(id);
        assert!(counter.is_empty());
    }
}
