//! Core traits implemented by every CRDT in this crate.

use serde::{Serialize, de::DeserializeOwned};

/// Marker trait for values that can be replicated.
///
/// Everything that crosses a node boundary or lands in the event log must be
/// cloneable and JSON-serializable.
pub trait Data: Clone + Serialize + DeserializeOwned {}

impl<T: Clone + Serialize + DeserializeOwned> Data for T {}

/// A state-based CRDT.
///
/// `merge` must be commutative, associative, and idempotent, so that any two
/// replicas that have seen the same set of states converge regardless of
/// delivery order or duplication. Merging never fails: the implementors form
/// a closed set and each handles every reachable input, which is what lets
/// the sync path apply remote state unconditionally.
pub trait Crdt: Data {
    /// Merge this replica's state with another, returning the joined state.
    #[must_use]
    fn merge(&self, other: &Self) -> Self;
}
