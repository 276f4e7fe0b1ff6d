//! Reactive Primitives
//!
//! This module holds the values the store works with: atoms, actions, state
//! values and listeners. None of them hold state themselves; the
//! [`Store`](crate::store::Store) owns every cache and registration.
//!
//! # Concepts
//!
//! ## Atoms
//!
//! An Atom is a computation node identified by reference. Its computation
//! reads other atoms and reacts to action types through a read context, and
//! the store records exactly what it touched.
//!
//! ## Actions
//!
//! An Action is a typed event with an optional payload. Atoms opt into an
//! action type by handling it; a dispatch only recomputes atoms that are
//! mounted and registered under the dispatched types, plus explicit targets.
//!
//! ## Values
//!
//! States and payloads are type-erased [`Value`]s compared by identity.

mod action;
mod atom;
mod context;
mod subscriber;
mod value;

pub use action::{is_action, is_action_creator, Action, ActionCreator, ActionType, Batch};
pub use atom::{is_atom, Atom, AtomKey, Computation};
pub use context::ComputeScope;
pub use subscriber::{ActionCallback, AtomCallback, Listener, ListenerId, TransactionCallback};
pub use value::Value;
