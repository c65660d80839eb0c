//! Grow-only and two-phase sets.

use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::errors::CrdtError;
use super::traits::{Crdt, Data};

/// A grow-only set (G-Set).
///
/// Elements can be added but never removed; merging is set union. Callers
/// that need removal should use [`TwoPhaseSet`] and accept its tombstone
/// semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GSet<T: Ord> {
    elements: BTreeSet<T>,
}

impl<T: Ord> Default for GSet<T> {
    fn default() -> Self {
        Self {
            elements: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> GSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element. Returns `true` if it was not already present.
    pub fn insert(&mut self, element: T) -> bool {
        self.elements.insert(element)
    }

    /// Membership test.
    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    /// The current elements.
    pub fn elements(&self) -> &BTreeSet<T> {
        &self.elements
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True if the set holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T: Ord + Data> Crdt for GSet<T> {
    fn merge(&self, other: &Self) -> Self {
        Self {
            elements: self.elements.union(&other.elements).cloned().collect(),
        }
    }
}

/// A two-phase set (2P-Set).
///
/// A pair of G-Sets: `added` and `removed`. An element is a member iff it is
/// in `added` and not in `removed`. Removal writes a monotonic tombstone:
/// once removed, an element can never become a member again, even through
/// a later [`insert`](TwoPhaseSet::insert) - a documented limitation callers
/// must design around (use fresh element identities if re-adding matters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoPhaseSet<T: Ord> {
    added: GSet<T>,
    removed: GSet<T>,
}

impl<T: Ord> Default for TwoPhaseSet<T> {
    fn default() -> Self {
        Self {
            added: GSet::default(),
            removed: GSet::default(),
        }
    }
}

impl<T: Ord + Clone + Display> TwoPhaseSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element.
    ///
    /// Returns `false` without modifying the set when the element carries a
    /// tombstone (it was removed at some point) or is already a member.
    pub fn insert(&mut self, element: T) -> bool {
        if self.removed.contains(&element) {
            return false;
        }
        self.added.insert(element)
    }

    /// Remove an element.
    ///
    /// The element must currently be a member; removing anything else fails
    /// with [`CrdtError::NotAMember`].
    pub fn remove(&mut self, element: T) -> Result<(), CrdtError> {
        if !self.contains(&element) {
            return Err(CrdtError::NotAMember {
                element: element.to_string(),
            });
        }
        self.removed.insert(element);
        Ok(())
    }

    /// Membership test: added and not removed.
    pub fn contains(&self, element: &T) -> bool {
        self.added.contains(element) && !self.removed.contains(element)
    }

    /// The current members.
    pub fn elements(&self) -> BTreeSet<T> {
        self.added
            .elements()
            .difference(self.removed.elements())
            .cloned()
            .collect()
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.elements().len()
    }

    /// True if there are no current members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Ord + Data + Display> Crdt for TwoPhaseSet<T> {
    fn merge(&self, other: &Self) -> Self {
        Self {
            added: self.added.merge(&other.added),
            removed: self.removed.merge(&other.removed),
        }
    }
}
