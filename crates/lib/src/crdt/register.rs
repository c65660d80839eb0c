//! Last-write-wins register with causal conflict resolution.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::traits::{Crdt, Data};
use crate::vector_clock::{CausalOrder, VectorClock};

/// A last-write-wins register.
///
/// Holds one value together with the vector clock, writer node, and wall
/// clock timestamp of the write that produced it. Conflict resolution is
/// two-stage:
///
/// 1. Compare vector clocks. If one side causally dominates (or the clocks
///    are equal), it wins outright and no timestamp is consulted.
/// 2. Only for truly concurrent clocks, fall back to the deterministic
///    tie-break: the later timestamp wins; on an exact timestamp tie, the
///    lexicographically greater writer node id wins.
///
/// Resolving concurrent writes by timestamp alone - without the causal check
/// first - would silently revert a causally newer write that happens to carry
/// a lower wall clock timestamp. The merged register always carries the
/// pointwise maximum of both clocks, so causal history survives even when a
/// value is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwwRegister<T> {
    value: T,
    vector_clock: VectorClock,
    writer: String,
    written_at: DateTime<Utc>,
}

impl<T: Data> LwwRegister<T> {
    /// Create a register describing a single known write.
    pub fn new(
        value: T,
        writer: impl Into<String>,
        written_at: DateTime<Utc>,
        vector_clock: VectorClock,
    ) -> Self {
        Self {
            value,
            vector_clock,
            writer: writer.into(),
            written_at,
        }
    }

    /// Record a local write.
    ///
    /// The new state is stamped with this register's clock incremented for
    /// `node_id`, so it causally dominates everything the register has seen.
    pub fn set(&mut self, value: T, node_id: &str, now: DateTime<Utc>) {
        self.vector_clock = self.vector_clock.increment(node_id);
        self.value = value;
        self.writer = node_id.to_string();
        self.written_at = now;
    }

    /// The current value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The register's vector clock.
    pub fn vector_clock(&self) -> &VectorClock {
        &self.vector_clock
    }

    /// The node that performed the winning write.
    pub fn writer(&self) -> &str {
        &self.writer
    }

    /// Wall clock timestamp of the winning write.
    pub fn written_at(&self) -> DateTime<Utc> {
        self.written_at
    }

    /// True if this register's write is concurrent with `other`'s.
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        self.vector_clock.is_concurrent(&other.vector_clock)
    }
}

impl<T: Data + PartialEq> Crdt for LwwRegister<T> {
    fn merge(&self, other: &Self) -> Self {
        let winner = match self.vector_clock.compare(&other.vector_clock) {
            // Causal order decides; timestamps are not consulted.
            CausalOrder::After | CausalOrder::Equal => self,
            CausalOrder::Before => other,
            // True concurrency: timestamp, then writer id.
            CausalOrder::Concurrent => match self.written_at.cmp(&other.written_at) {
                Ordering::Greater => self,
                Ordering::Less => other,
                Ordering::Equal => {
                    if self.writer >= other.writer {
                        self
                    } else {
                        other
                    }
                }
            },
        };

        let merged = Self {
            value: winner.value.clone(),
            vector_clock: self.vector_clock.merged(&other.vector_clock),
            writer: winner.writer.clone(),
            written_at: winner.written_at,
        };
        // A merge result must never causally precede either input.
        debug_assert!(merged.vector_clock.compare(&self.vector_clock) != CausalOrder::Before);
        debug_assert!(merged.vector_clock.compare(&other.vector_clock) != CausalOrder::Before);
        merged
    }
}
