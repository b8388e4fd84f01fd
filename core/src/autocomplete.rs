use crate::persist::{load_json_optional, DataPaths};
use anyhow::Result;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::{info, warn};

/// Prefix completion over the known vocabulary.
///
/// Terms are kept sorted so that every completion of a prefix is one contiguous
/// range found by binary search; ranking then only looks at that range.
pub struct Autocomplete {
    terms: Vec<(String, u64)>,
}

impl Autocomplete {
    pub fn new(vocabulary: HashMap<String, u64>) -> Self {
        let mut terms: Vec<(String, u64)> = vocabulary
            .into_iter()
            .map(|(t, f)| (t.to_lowercase(), f))
            .filter(|(t, _)| !t.is_empty())
            .collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        terms.dedup_by(|later, earlier| later.0 == earlier.0);
        Self { terms }
    }

    /// A missing vocabulary leaves autocomplete empty rather than failing startup.
    pub fn open(paths: &DataPaths) -> Result<Self> {
        let path = paths.vocabulary();
        let vocabulary: HashMap<String, u64> = match load_json_optional(&path)? {
            Some(v) => v,
            None => {
                warn!(path = %path.display(), "no autocomplete vocabulary");
                HashMap::new()
            }
        };
        let index = Self::new(vocabulary);
        info!(terms = index.len(), "loaded autocomplete vocabulary");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Up to `limit` terms starting with `prefix`, most frequent first, ties alphabetical.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let start = self.terms.partition_point(|(t, _)| t.as_str() < prefix.as_str());
        let end = start + self.terms[start..].partition_point(|(t, _)| t.starts_with(&prefix));

        // min-heap of the best `limit` entries seen so far
        let mut heap: BinaryHeap<Reverse<(u64, Reverse<&str>)>> = BinaryHeap::with_capacity(limit + 1);
        for (term, freq) in &self.terms[start..end] {
            heap.push(Reverse((*freq, Reverse(term.as_str()))));
            if heap.len() > limit {
                heap.pop();
            }
        }
        let mut best: Vec<(u64, &str)> = heap.into_iter().map(|Reverse((f, Reverse(t)))| (f, t)).collect();
        best.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));
        best.into_iter().map(|(_, t)| t.to_string()).collect()
    }

    /// Complete the last word of `query`, keeping the words before it.
    pub fn suggest_query(&self, query: &str, limit: usize) -> Vec<String> {
        let mut words: Vec<&str> = query.split_whitespace().collect();
        let Some(last) = words.pop() else {
            return Vec::new();
        };
        let context = words.join(" ");
        self.suggest(last, limit)
            .into_iter()
            .map(|w| if context.is_empty() { w } else { format!("{context} {w}") })
            .collect()
    }
}
