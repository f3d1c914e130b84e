//! Bounded collection of SEARCH results.

use crate::options::{SearchOptions, SearchPolicy};
use crate::types::MessageId;

/// Accumulates `* SEARCH` values under a cap.
///
/// With [`SearchPolicy::KeepFirst`] values past the cap are dropped. With
/// [`SearchPolicy::KeepRecent`] the smallest kept value is evicted when a
/// larger one arrives, so the result is the `limit` largest values.
#[derive(Debug, Clone)]
pub struct SearchCollector {
    options: SearchOptions,
    values: Vec<u32>,
    seen: usize,
}

impl SearchCollector {
    /// Creates an empty collector.
    #[must_use]
    pub const fn new(options: SearchOptions) -> Self {
        Self {
            options,
            values: Vec::new(),
            seen: 0,
        }
    }

    /// Offers one value.
    pub fn push(&mut self, value: u32) {
        self.seen += 1;
        let limit = self.options.limit;
        if limit == 0 || self.values.len() < limit {
            self.values.push(value);
            return;
        }
        if self.options.policy == SearchPolicy::KeepRecent
            && let Some((oldest, &min)) = self
                .values
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| **v)
            && value > min
        {
            self.values.remove(oldest);
            self.values.push(value);
        }
    }

    /// Offers every number in the data of a `SEARCH` response.
    pub fn extend_from_data(&mut self, data: &str) {
        for value in data.split_ascii_whitespace().filter_map(|t| t.parse().ok()) {
            self.push(value);
        }
    }

    /// Number of values offered, kept or not.
    #[must_use]
    pub const fn seen(&self) -> usize {
        self.seen
    }

    /// Returns the kept values as message ids.
    #[must_use]
    pub fn finish(self) -> Vec<MessageId> {
        let mut values = self.values;
        if self.options.sort_descending {
            values.sort_unstable_by(|a, b| b.cmp(a));
        }
        let uid = self.options.uid;
        values
            .into_iter()
            .map(|v| if uid { MessageId::Uid(v) } else { MessageId::Number(v) })
            .collect()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn values(ids: Vec<MessageId>) -> Vec<u32> {
        ids.into_iter().map(MessageId::value).collect()
    }

    #[test]
    fn test_keep_first() {
        let mut collector = SearchCollector::new(SearchOptions::first(3));
        collector.extend_from_data("4 9 2 7 11");
        assert_eq!(collector.seen(), 5);
        assert_eq!(values(collector.finish()), vec![4, 9, 2]);
    }

    #[test]
    fn test_keep_recent_sorted() {
        let mut collector = SearchCollector::new(SearchOptions::recent(3));
        collector.extend_from_data("4 9 2 7 11");
        let ids = collector.finish();
        assert_eq!(ids[0], MessageId::Uid(11));
        assert_eq!(values(ids), vec![11, 9, 7]);
    }

    #[test]
    fn test_unlimited_and_sequence_numbers() {
        let options = SearchOptions {
            limit: 0,
            ..SearchOptions::default()
        }
        .sequence_numbers();
        let mut collector = SearchCollector::new(options);
        collector.extend_from_data("1 2 3 x 4");
        let ids = collector.finish();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| !id.is_uid()));
    }

    proptest! {
        #[test]
        fn prop_keep_first_is_prefix(input in prop::collection::vec(1u32..10_000, 0..60), limit in 1usize..20) {
            let mut collector = SearchCollector::new(SearchOptions::first(limit));
            for v in &input {
                collector.push(*v);
            }
            let kept = values(collector.finish());
            prop_assert_eq!(&kept[..], &input[..input.len().min(limit)]);
        }

        #[test]
        fn prop_keep_recent_is_top_n_descending(input in prop::collection::vec(1u32..10_000, 0..60), limit in 1usize..20) {
            let mut collector = SearchCollector::new(SearchOptions::recent(limit));
            for v in &input {
                collector.push(*v);
            }
            let kept = values(collector.finish());
            let mut expected = input.clone();
            expected.sort_unstable_by(|a, b| b.cmp(a));
            expected.truncate(limit);
            prop_assert_eq!(kept, expected);
        }
    }
}
