//! Atom Implementation
//!
//! An Atom is a named reactive computation node. The store memoizes its
//! result in a [`Cache`](crate::graph::Cache) and decides when to run it
//! again.
//!
//! # How Atoms Work
//!
//! 1. The computation receives a [`Ctx`] read context.
//!
//! 2. Every atom read through [`Ctx::get`] is recorded as a dependency.
//!
//! 3. Every action type handled through [`Ctx::on`] is recorded as a type
//!    the atom reacts to.
//!
//! 4. The recorded dependencies and types become part of the cache, so they
//!    reflect what the computation actually touched on its last run.
//!
//! Atoms are compared by identity. Two atoms built from the same id and the
//! same closure are still two different atoms.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::BoxError;
use crate::store::Ctx;

use super::Value;

/// Process-unique identity of an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomKey(u64);

impl AtomKey {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw key value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Signature of an atom's computation.
pub type Computation = dyn Fn(&mut Ctx<'_, '_>) -> Result<Value, BoxError> + Send + Sync;

struct AtomInner {
    key: AtomKey,
    id: String,
    compute: Box<Computation>,
}

/// A reactive computation node.
///
/// # Example
///
/// ```rust,ignore
/// let counter = Atom::new("counter", |ctx| {
///     let mut state = ctx.state_as::<i64>().copied().unwrap_or(0);
///     ctx.on("inc", |_| state += 1);
///     Ok(Value::new(state))
/// });
/// ```
#[derive(Clone)]
pub struct Atom(Arc<AtomInner>);

impl Atom {
    /// Create an atom with the given id and computation.
    ///
    /// The id names the atom in snapshots and in [`Store::get_all_states`].
    ///
    /// [`Store::get_all_states`]: crate::store::Store::get_all_states
    pub fn new<F>(id: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&mut Ctx<'_, '_>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(AtomInner {
            key: AtomKey::next(),
            id: id.into(),
            compute: Box::new(compute),
        }))
    }

    /// Get the atom's identity.
    pub fn key(&self) -> AtomKey {
        self.0.key
    }

    /// Get the atom's id.
    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub(crate) fn compute(&self, ctx: &mut Ctx<'_, '_>) -> Result<Value, BoxError> {
        (self.0.compute)(ctx)
    }
}

/// Shape check for atoms: an atom must carry a non-empty id.
pub fn is_atom(atom: &Atom) -> bool {
    !atom.id().is_empty()
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("key", &self.0.key.raw())
            .field("id", &self.0.id)
            .finish()
    }
}
