//! Conflict-free Replicated Data Types.
//!
//! State-based CRDT primitives whose merge operations are commutative,
//! associative, and idempotent, so replicas converge without coordination:
//!
//! - [`GCounter`] - grow-only counter (per-node counts, value = sum)
//! - [`GSet`] - grow-only set (merge = union, no removal)
//! - [`TwoPhaseSet`] - add/remove set with monotonic tombstones
//! - [`LwwRegister`] - last-write-wins register with causal-order-aware
//!   conflict resolution
//!
//! The register is the workhorse: the [`manager`](crate::manager) keeps one
//! per replicated entity. The other primitives are provided for callers that
//! replicate counters or sets directly.

pub mod counter;
pub mod errors;
pub mod register;
pub mod set;
pub mod traits;

pub use counter::GCounter;
pub use errors::CrdtError;
pub use register::LwwRegister;
pub use set::{GSet, TwoPhaseSet};
pub use traits::{Crdt, Data};
