//! Computation Scope
//!
//! The computation scope tracks which atoms are currently computing on this
//! thread. The store uses it for two checks:
//!
//! - a computation that reads an atom already on the stack has formed a
//!   dependency cycle;
//! - a `dispatch` issued while an atom of the same store is computing is
//!   re-entrant and is rejected. Each entry carries the owning store, so a
//!   computation in one store may still cold-read atoms of another.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering an atom's computation pushes its key
//! and the returned guard pops it, so the stack stays balanced even when the
//! computation panics and the panic is caught by the transaction.

use std::cell::RefCell;

use super::AtomKey;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    owner: usize,
    key: AtomKey,
    id: String,
}

/// Guard that pops the scope when dropped.
pub struct ComputeScope {
    key: AtomKey,
}

impl ComputeScope {
    /// Enter the computation of the given atom on behalf of `owner`, an
    /// address that identifies the store running the transaction.
    pub fn enter(owner: usize, key: AtomKey, id: &str) -> Self {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry {
                owner,
                key,
                id: id.to_string(),
            });
        });

        Self { key }
    }

    /// Check if any atom is computing on this thread.
    pub fn is_active() -> bool {
        SCOPE_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Id of the innermost atom computing for `owner`, if any.
    pub fn current_in(owner: usize) -> Option<String> {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|entry| entry.owner == owner)
                .map(|entry| entry.id.clone())
        })
    }

    /// Whether the given atom is somewhere on the stack.
    pub fn contains(key: AtomKey) -> bool {
        SCOPE_STACK.with(|stack| stack.borrow().iter().any(|entry| entry.key == key))
    }

    /// Number of nested computations on this thread.
    pub fn depth() -> usize {
        SCOPE_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ComputeScope {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.key, self.key,
                    "ComputeScope mismatch: expected {:?}, got {:?}",
                    self.key, entry.key
                );
            }
        });
    }
}
