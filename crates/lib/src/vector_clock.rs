//! Vector clocks for causal ordering of distributed events.
//!
//! Every node keeps a counter per node it has heard from. Comparing two
//! clocks pairwise (missing entries read as zero) yields one of four causal
//! relationships, which drives the two-stage merge in
//! [`LwwRegister`](crate::crdt::LwwRegister): causal dominance is decided
//! here; wall-clock timestamps are consulted only for true concurrency.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Causal relationship between two [`VectorClock`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// Identical clocks.
    Equal,
    /// `self` causally precedes `other`.
    Before,
    /// `self` causally succeeds `other`.
    After,
    /// Neither clock dominates the other.
    Concurrent,
}

/// Per-node event counters.
///
/// A node only ever increments its own entry, and no entry ever decreases.
/// Stored as a `BTreeMap` so serialization is deterministic; the wire form is
/// a plain `{ "node-id": counter }` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// An empty clock: every node reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter for `node_id`, zero if absent.
    pub fn get(&self, node_id: &str) -> u64 {
        self.counters.get(node_id).copied().unwrap_or(0)
    }

    /// Returns a new clock with `node_id`'s counter incremented by one and
    /// all other entries unchanged.
    #[must_use]
    pub fn increment(&self, node_id: &str) -> Self {
        let mut counters = self.counters.clone();
        *counters.entry(node_id.to_string()).or_insert(0) += 1;
        Self { counters }
    }

    /// Returns the pointwise maximum of the two clocks over the union of
    /// their node keys. Commutative, associative, and idempotent.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut counters = self.counters.clone();
        for (node, &count) in &other.counters {
            let entry = counters.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        Self { counters }
    }

    /// Compares the clocks entry by entry over the union of node keys.
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let mut self_less = false;
        let mut self_greater = false;

        for node in self.counters.keys().chain(other.counters.keys()) {
            let a = self.get(node);
            let b = other.get(node);
            if a < b {
                self_less = true;
            } else if a > b {
                self_greater = true;
            }
        }

        match (self_less, self_greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// True if `self` strictly dominates `other`.
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::After
    }

    /// True if neither clock dominates the other.
    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// Iterate over `(node_id, counter)` entries in node-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.counters.iter()
    }

    /// True if no node has a nonzero counter recorded.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl From<BTreeMap<String, u64>> for VectorClock {
    fn from(counters: BTreeMap<String, u64>) -> Self {
        Self { counters }
    }
}

impl<const N: usize> From<[(&str, u64); N]> for VectorClock {
    fn from(entries: [(&str, u64); N]) -> Self {
        Self {
            counters: entries
                .into_iter()
                .map(|(node, count)| (node.to_string(), count))
                .collect(),
        }
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (node, count)) in self.counters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{node}:{count}")?;
        }
        write!(f, "}}")
    }
}
