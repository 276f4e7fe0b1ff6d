//! Cache Graph
//!
//! This module holds the memoized side of the store: the cache record of
//! every computed atom and the reducer index that routes action types to
//! mounted atoms.
//!
//! # Overview
//!
//! The cache graph maps an atom to the cache of its latest computation.
//! Each cache points at the caches of the dependencies it read, so the graph
//! of caches mirrors the dependency graph of atoms.
//!
//! # Design Decisions
//!
//! 1. Entries are keyed by atom identity and live until the store is dropped.
//!    Unmounting an atom cleans up the reducer index but keeps its cache, so
//!    a later remount or read does not recompute it.
//!
//! 2. Caches are immutable `Arc`s. A transaction builds new caches on the
//!    side and the store swaps them in only when the whole batch succeeded.

mod cache;
mod index;

use std::collections::HashMap;
use std::sync::Arc;

use crate::reactive::Atom;

pub use cache::{Cache, CacheDep};
pub use index::ReducerIndex;

/// Atom to latest cache mapping.
#[derive(Debug, Default)]
pub struct CacheGraph {
    caches: HashMap<Atom, Arc<Cache>>,
}

impl CacheGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the latest cache of an atom.
    pub fn get(&self, atom: &Atom) -> Option<Arc<Cache>> {
        self.caches.get(atom).cloned()
    }

    /// Replace the cache of an atom, returning the previous one.
    pub fn insert(&mut self, atom: Atom, cache: Arc<Cache>) -> Option<Arc<Cache>> {
        self.caches.insert(atom, cache)
    }

    pub fn contains(&self, atom: &Atom) -> bool {
        self.caches.contains_key(atom)
    }

    /// Number of cached atoms.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}
