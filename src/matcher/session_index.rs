//! Session lookup index with bucketed candidate filtering
//!
//! Two-level structure `first_char -> length -> keys` that serves exact
//! lookups in O(1) and narrows fuzzy-match candidates to keys sharing the
//! first character within ±1 length. The bucketing mirrors the early-exit
//! conditions of `tokens_close`, so any candidate that could pass the fuzzy
//! predicate is guaranteed to appear in `get_candidates`. Correctness of
//! matching never depends on the bucketing; it only prunes work.

use std::collections::HashMap;

/// Frozen after pattern compilation; keys are normalized tokens, values the
/// canonical session/episode title they resolve to.
#[derive(Debug, Clone, Default)]
pub struct SessionLookupIndex {
    mapping: HashMap<String, String>,
    buckets: HashMap<char, HashMap<usize, Vec<String>>>,
}

impl SessionLookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key -> canonical mapping, updating both levels.
    pub fn add(&mut self, key: &str, canonical: &str) {
        if key.is_empty() {
            return;
        }
        self.mapping.insert(key.to_string(), canonical.to_string());
        let first = key.chars().next().unwrap_or_default();
        let len = key.chars().count();
        self.buckets
            .entry(first)
            .or_default()
            .entry(len)
            .or_default()
            .push(key.to_string());
    }

    /// Insert only if the key is not already mapped.
    pub fn add_if_absent(&mut self, key: &str, canonical: &str) {
        if !key.is_empty() && !self.mapping.contains_key(key) {
            self.add(key, canonical);
        }
    }

    /// Exact lookup.
    pub fn get_direct(&self, token: &str) -> Option<&str> {
        self.mapping.get(token).map(String::as_str)
    }

    /// Keys sharing the token's first character with length within ±1.
    pub fn get_candidates(&self, token: &str) -> Vec<&str> {
        let Some(first) = token.chars().next() else {
            return Vec::new();
        };
        let len = token.chars().count();
        let Some(length_buckets) = self.buckets.get(&first) else {
            return Vec::new();
        };
        let mut candidates = Vec::new();
        for target_len in [len.saturating_sub(1), len, len + 1] {
            if target_len == 0 {
                continue;
            }
            if let Some(bucket) = length_buckets.get(&target_len) {
                candidates.extend(bucket.iter().map(String::as_str));
            }
        }
        candidates
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.mapping.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
