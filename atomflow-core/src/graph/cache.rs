//! Cache Records
//!
//! This module defines the immutable record the store keeps for every
//! computed atom.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::reactive::{ActionType, Atom, Value};

/// One recorded dependency read: the atom and the exact cache that was read.
#[derive(Debug, Clone)]
pub struct CacheDep {
    pub atom: Atom,
    pub cache: Arc<Cache>,
}

/// Memoized result of one atom computation.
///
/// Caches are immutable and shared through `Arc`. Because every dependency
/// entry points at the cache that was read, caches form a tree that mirrors
/// the dependency graph at the time of the computation.
#[derive(Debug, Clone)]
pub struct Cache {
    /// The computed state.
    state: Value,

    /// Atoms read during the computation, in first-read order.
    deps: Vec<CacheDep>,

    /// Action types the computation handled.
    types: BTreeSet<ActionType>,
}

impl Cache {
    /// Create a new cache record.
    pub fn new(state: Value, deps: Vec<CacheDep>, types: BTreeSet<ActionType>) -> Self {
        Self { state, deps, types }
    }

    /// Get the computed state.
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Get the recorded dependencies.
    pub fn deps(&self) -> &[CacheDep] {
        &self.deps
    }

    /// Get the action types the atom reacts to directly.
    pub fn types(&self) -> &BTreeSet<ActionType> {
        &self.types
    }

    /// Whether the atom handled any of the given action types.
    pub fn reacts_to<'a, I>(&self, mut action_types: I) -> bool
    where
        I: Iterator<Item = &'a ActionType>,
    {
        action_types.any(|t| self.types.contains(t))
    }

    /// Whether the subtree shape differs from `other`.
    ///
    /// The shape is the own type set plus, recursively, the dependency count
    /// and every dependency's type set. It is what the reducer index is built
    /// from, so an unchanged shape means the index needs no update.
    pub fn shape_changed(&self, other: &Cache) -> bool {
        self.types != other.types || deps_shape_changed(&self.deps, &other.deps)
    }
}

fn deps_shape_changed(old: &[CacheDep], new: &[CacheDep]) -> bool {
    old.len() != new.len()
        || old.iter().zip(new).any(|(old, new)| {
            !Arc::ptr_eq(&old.cache, &new.cache) && old.cache.shape_changed(&new.cache)
        })
}
