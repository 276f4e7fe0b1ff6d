//! Listener types for the store.
//!
//! A listener is a callback registered through `Store::subscribe`. There are
//! three kinds: atom listeners receive new states, action listeners receive
//! dispatched actions, and transaction listeners receive every
//! [`TransactionResult`], including failed ones.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::TransactionResult;

use super::{Action, ActionCreator, Atom, Value};

/// Unique identifier for a registered listener.
///
/// The id is what an unsubscribe removes, so the same closure can be
/// registered twice and released independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

pub type AtomCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ActionCallback = Arc<dyn Fn(&Action) + Send + Sync>;
pub type TransactionCallback = Arc<dyn Fn(&TransactionResult) + Send + Sync>;

/// Argument of the unified `Store::subscribe` entry point.
#[derive(Clone)]
pub enum Listener {
    /// Observe every transaction, successful or not.
    Transaction(TransactionCallback),
    /// Observe state changes of one atom. Mounts the atom.
    Atom(Atom, AtomCallback),
    /// Observe every dispatched action of the creator's type.
    Action(ActionCreator, ActionCallback),
}

impl Listener {
    /// Wrap a transaction callback.
    pub fn transaction<F>(callback: F) -> Self
    where
        F: Fn(&TransactionResult) + Send + Sync + 'static,
    {
        Self::Transaction(Arc::new(callback))
    }

    /// Wrap a state callback for `atom`.
    pub fn atom<F>(atom: &Atom, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::Atom(atom.clone(), Arc::new(callback))
    }

    /// Wrap an action callback for the creator's type.
    pub fn action<F>(creator: &ActionCreator, callback: F) -> Self
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        Self::Action(creator.clone(), Arc::new(callback))
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(_) => f.write_str("Listener::Transaction"),
            Self::Atom(atom, _) => write!(f, "Listener::Atom({})", atom.id()),
            Self::Action(creator, _) => {
                write!(f, "Listener::Action({})", creator.action_type())
            }
        }
    }
}
