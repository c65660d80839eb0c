//! Grow-only counter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::traits::Crdt;

/// A grow-only counter (G-Counter).
///
/// Each node owns one entry and only ever increments it; the observed value
/// is the sum over all nodes. Merging takes the pointwise maximum per node,
/// so the value never decreases and duplicate merges are harmless.
///
/// ```
/// use concord::crdt::{Crdt, GCounter};
///
/// let mut a = GCounter::new();
/// a.increment("n1");
/// let mut b = GCounter::new();
/// b.increment_by("n2", 3);
///
/// assert_eq!(a.merge(&b).value(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GCounter {
    counts: BTreeMap<String, u64>,
}

impl GCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the calling node's entry by one.
    pub fn increment(&mut self, node_id: &str) {
        self.increment_by(node_id, 1);
    }

    /// Increment the calling node's entry by `amount`.
    ///
    /// Only the caller's own entry is ever touched; other nodes' counts are
    /// learned exclusively through [`Crdt::merge`].
    pub fn increment_by(&mut self, node_id: &str, amount: u64) {
        *self.counts.entry(node_id.to_string()).or_insert(0) += amount;
    }

    /// The counter value: the sum of every node's count.
    pub fn value(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The count contributed by a single node.
    pub fn count_for(&self, node_id: &str) -> u64 {
        self.counts.get(node_id).copied().unwrap_or(0)
    }
}

impl Crdt for GCounter {
    fn merge(&self, other: &Self) -> Self {
        let mut counts = self.counts.clone();
        for (node, &count) in &other.counts {
            let entry = counts.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        Self { counts }
    }
}
