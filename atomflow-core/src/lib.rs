//! Atomflow Core
//!
//! This crate provides the store engine for Atomflow, a reactive state
//! container. It implements:
//!
//! - Atoms: named computations that derive state from actions and from
//!   other atoms
//! - Dependency-tracked, memoized caches
//! - Atomic batch dispatch with a fixed notification order
//! - Mount-driven activation: only observed atoms react to actions
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Atoms, actions, values and listener types
//! - `graph`: Cache records and the reducer index
//! - `store`: The transaction engine, dispatch pipeline and subscriptions
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use atomflow_core::{Action, Atom, Store, Value};
//!
//! let counter = Atom::new("counter", |ctx| {
//!     let mut n = ctx.state_as::<i64>().copied().unwrap_or(0);
//!     ctx.on("inc", |_| n += 1);
//!     Ok(Value::new(n))
//! });
//!
//! let doubled = {
//!     let counter = counter.clone();
//!     Atom::new("doubled", move |ctx| {
//!         let n = *ctx.get(&counter)?.get::<i64>().ok_or("not a number")?;
//!         Ok(Value::new(n * 2))
//!     })
//! };
//!
//! let store = Store::new();
//! let _sub = store.subscribe_atom(&doubled, |v| println!("doubled: {v:?}"))?;
//!
//! store.dispatch(Action::new("inc"))?;
//! // prints "doubled: 2"
//! ```

pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use error::{BoxError, Result, StoreError};
pub use reactive::{Action, ActionCreator, Atom, Batch, Listener, Value};
pub use store::{Ctx, Settled, Snapshot, Store, StoreBuilder, Subscription, TransactionResult};
