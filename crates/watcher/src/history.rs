//! Bounded record of recently seen message ids.

use std::collections::{HashSet, VecDeque};

/// Insertion-ordered set of message ids with a size cap.
///
/// When an insert takes the history past its limit `L`, the oldest entries
/// are dropped until `ceil(L / 2)` remain.
#[derive(Debug, Clone)]
pub struct DedupHistory {
    order: VecDeque<String>,
    seen: HashSet<String>,
    limit: usize,
}

impl DedupHistory {
    /// Create an empty history holding at most `limit` ids (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit: usize = limit.max(1);
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    /// Record `message_id`. Returns `false` if it was already present.
    pub fn insert(&mut self, message_id: &str) -> bool {
        if self.seen.contains(message_id) {
            return false;
        }

        self.order.push_back(message_id.to_string());
        self.seen.insert(message_id.to_string());

        if self.order.len() > self.limit {
            self.trim();
        }
        true
    }

    fn trim(&mut self) {
        let keep: usize = self.limit.div_ceil(2);
        let before: usize = self.order.len();
        while self.order.len() > keep {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        log::debug!(
            "Trimmed message history from {} to {} entries",
            before,
            self.order.len()
        );
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_duplicates() {
        let mut history = DedupHistory::new(10);
        assert!(history.insert("a"));
        assert!(!history.insert("a"));
        assert!(history.insert("b"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_trim_keeps_newest_half_even_limit() {
        let mut history = DedupHistory::new(4);
        for id in ["1", "2", "3", "4"] {
            history.insert(id);
        }
        assert_eq!(history.len(), 4);

        history.insert("5");
        assert_eq!(history.len(), 2);
        assert!(history.contains("4"));
        assert!(history.contains("5"));
        assert!(!history.contains("1"));
        assert!(!history.contains("3"));
    }

    #[test]
    fn test_trim_keeps_newest_half_odd_limit() {
        let mut history = DedupHistory::new(5);
        for i in 0..6 {
            history.insert(&i.to_string());
        }
        assert_eq!(history.len(), 3);
        for id in ["3", "4", "5"] {
            assert!(history.contains(id));
        }
    }

    #[test]
    fn test_trimmed_ids_are_forgotten() {
        let mut history = DedupHistory::new(2);
        history.insert("a");
        history.insert("b");
        history.insert("c");
        assert!(history.insert("a"));
    }

    #[test]
    fn test_zero_limit_is_raised_to_one() {
        let mut history = DedupHistory::new(0);
        assert_eq!(history.limit(), 1);
        history.insert("a");
        history.insert("b");
        assert_eq!(history.len(), 1);
        assert!(history.contains("b"));
    }
}
