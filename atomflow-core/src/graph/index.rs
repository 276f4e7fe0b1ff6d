//! Reducer Index
//!
//! The reducer index routes a dispatched action type to the mounted atoms
//! that must be re-evaluated for it.
//!
//! # Algorithm
//!
//! A mounted atom is registered under every action type found in its cache
//! subtree:
//!
//! 1. Push the atom's cache on a stack
//! 2. Pop a cache, register the mounted atom under each of its types
//! 3. Push every dependency cache
//! 4. Repeat until the stack is empty
//!
//! Deregistration walks the same subtree and removes the atom from each type
//! set, dropping sets that become empty. Registration is set based, so
//! removing an old shape and adding a new one leaves the index exact for that
//! atom regardless of overlaps between the two shapes.
//!
//! The walk has no cycle guard. Caches are built bottom-up by a transaction
//! that rejects dependency cycles, so a cache tree can never contain one.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::reactive::{ActionType, Atom};

use super::cache::Cache;

/// Action type to mounted atoms routing table.
#[derive(Debug, Default)]
pub struct ReducerIndex {
    /// Atoms per type, in registration order.
    by_type: HashMap<ActionType, IndexSet<Atom>>,
}

impl ReducerIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `atom` under every type in the `cache` subtree.
    pub fn add(&mut self, atom: &Atom, cache: &Cache) {
        let mut stack = vec![cache];
        while let Some(cache) = stack.pop() {
            for action_type in cache.types() {
                self.by_type
                    .entry(action_type.clone())
                    .or_default()
                    .insert(atom.clone());
            }
            stack.extend(cache.deps().iter().map(|dep| &*dep.cache));
        }
        tracing::debug!(atom = atom.id(), "registered in reducer index");
    }

    /// Remove `atom` from every type in the `cache` subtree.
    pub fn remove(&mut self, atom: &Atom, cache: &Cache) {
        let mut stack = vec![cache];
        while let Some(cache) = stack.pop() {
            for action_type in cache.types() {
                if let Some(atoms) = self.by_type.get_mut(action_type) {
                    atoms.shift_remove(atom);
                    if atoms.is_empty() {
                        self.by_type.remove(action_type);
                    }
                }
            }
            stack.extend(cache.deps().iter().map(|dep| &*dep.cache));
        }
        tracing::debug!(atom = atom.id(), "removed from reducer index");
    }

    /// Atoms registered under `action_type`, in registration order.
    pub fn atoms_for(&self, action_type: &str) -> Vec<Atom> {
        self.by_type
            .get(action_type)
            .map(|atoms| atoms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `atom` is registered under `action_type`.
    pub fn contains(&self, action_type: &str, atom: &Atom) -> bool {
        self.by_type
            .get(action_type)
            .is_some_and(|atoms| atoms.contains(atom))
    }

    /// Number of action types with at least one registered atom.
    pub fn type_count(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
