//! Store Engine
//!
//! The store owns the cache graph, the reducer index and every listener. It
//! is the only place where state changes.
//!
//! # Overview
//!
//! A dispatch goes through a fixed pipeline:
//!
//! 1. The batch is validated and a [`Transaction`] computes a patch for
//!    every affected atom without touching the live graph.
//! 2. On success the patch is merged. Mounted atoms seen for the first time
//!    are indexed, and atoms whose dependency shape changed are re-indexed.
//! 3. Listeners are notified: transaction listeners first (always), then
//!    atom listeners for every atom whose state changed, then action
//!    listeners in dispatch order.
//! 4. Effects queued by computations are started and joined by the returned
//!    [`Settled`] barrier.
//!
//! # Concurrency
//!
//! Dispatches are serialized by a dispatch lock held for compute and merge.
//! Shared maps live behind a separate state lock that is only held for short
//! bookkeeping, never while a computation, listener or effect runs. Listeners
//! and effects may therefore dispatch and subscribe freely. A computation may
//! not dispatch into the store that is computing it: that is reported as
//! [`StoreError::ReentrantDispatch`]. Other stores are unaffected.
//!
//! # Mounting
//!
//! An atom with at least one atom listener is mounted. Only mounted atoms
//! are registered in the reducer index, so an action recomputes the observed
//! part of the graph and nothing else. Caches of unmounted atoms are kept.

mod builder;
mod effects;
mod listeners;
mod notify;
mod subscription;
mod transaction;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::graph::{Cache, CacheGraph, ReducerIndex};
use crate::reactive::{
    is_action, is_action_creator, is_atom, Action, ActionCreator, Atom, Batch, ComputeScope,
    Listener, ListenerId, Value,
};

use listeners::Registry;
use notify::{call_isolated, ListenerKind};
use subscription::Release;
use transaction::{CacheSource, Transaction};

pub use builder::{Snapshot, StoreBuilder};
pub use effects::{Effect, Settled};
pub use subscription::Subscription;
pub use transaction::{Ctx, Patch};

/// Outcome of one dispatch, as seen by transaction listeners.
#[derive(Debug)]
pub struct TransactionResult {
    actions: Vec<Action>,
    error: Option<StoreError>,
    patch: Patch,
}

impl TransactionResult {
    /// The dispatched batch, in order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The failure that aborted the transaction, if any.
    pub fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    /// Caches computed by the transaction, in merge order.
    ///
    /// On failure this holds what was computed before the error; none of it
    /// was merged.
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// Whether the transaction committed.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Default)]
pub(crate) struct StoreState {
    graph: CacheGraph,
    index: ReducerIndex,
    listeners: Registry,
}

pub(crate) struct StoreInner {
    name: String,
    snapshot: Snapshot,
    spawn_effects: bool,
    dispatch_lock: Mutex<()>,
    state: Mutex<StoreState>,
}

impl CacheSource for StoreInner {
    fn owner(&self) -> usize {
        self as *const Self as usize
    }

    fn cache(&self, atom: &Atom) -> Option<Arc<Cache>> {
        self.state.lock().graph.get(atom)
    }

    fn hydrated(&self, id: &str) -> Option<Value> {
        self.snapshot.get(id).cloned()
    }

    fn indexed(&self, action_type: &str) -> Vec<Atom> {
        self.state.lock().index.atoms_for(action_type)
    }
}

impl StoreInner {
    /// Swap the patch into the graph and keep the index in step.
    ///
    /// Returns the atoms whose state changed, in merge order.
    fn merge(&self, patch: &Patch) -> Vec<(Atom, Value)> {
        let mut state = self.state.lock();
        let StoreState {
            graph,
            index,
            listeners,
        } = &mut *state;

        let mut changed = Vec::new();
        for (atom, cache) in patch {
            let previous = graph.insert(atom.clone(), cache.clone());

            if listeners.is_mounted(atom) {
                match &previous {
                    None => index.add(atom, cache),
                    Some(old) if old.shape_changed(cache) => {
                        index.remove(atom, old);
                        index.add(atom, cache);
                    }
                    Some(_) => {}
                }
            }

            let old_state = previous.as_ref().map(|old| old.state());
            if !Value::same_opt(old_state, Some(cache.state())) {
                changed.push((atom.clone(), cache.state().clone()));
            }
        }
        changed
    }

    fn release(&self, release: Release) {
        if let Release::Group(members) = release {
            drop(members);
            return;
        }

        let mut state = self.state.lock();
        let StoreState {
            graph,
            index,
            listeners,
        } = &mut *state;

        match release {
            Release::Atom(atom, id) => {
                if listeners.remove_atom(&atom, id) {
                    if let Some(cache) = graph.get(&atom) {
                        index.remove(&atom, &cache);
                    }
                    tracing::debug!(store = %self.name, atom = atom.id(), "atom unmounted");
                }
            }
            Release::Action(action_type, id) => listeners.remove_action(&action_type, id),
            Release::Transaction(id) => listeners.remove_transaction(id),
            Release::Group(_) => {}
        }
    }
}

/// Reactive state container.
///
/// Cloning a store is cheap and every clone shares the same graph.
///
/// # Example
///
/// ```rust,ignore
/// let counter = Atom::new("counter", |ctx| {
///     let mut n = ctx.state_as::<i64>().copied().unwrap_or(0);
///     ctx.on("inc", |_| n += 1);
///     Ok(Value::new(n))
/// });
///
/// let store = Store::new();
/// let _sub = store.subscribe_atom(&counter, |v| println!("{v:?}"))?;
/// store.dispatch(Action::new("inc"))?;
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store with default settings.
    pub fn new() -> Self {
        StoreBuilder::default().build()
    }

    /// Create a store that seeds cold atoms from `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        StoreBuilder::default().snapshot(snapshot).build()
    }

    /// Start configuring a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Name given by [`StoreBuilder::name`].
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Apply one action or a batch of actions atomically.
    ///
    /// Returns a barrier for the effects queued by the batch. A failed
    /// computation aborts the whole batch, leaves the store untouched and is
    /// returned after the transaction listeners ran.
    pub fn dispatch(&self, batch: impl Into<Batch>) -> Result<Settled> {
        self.commit(batch.into().0).map(|(settled, _)| settled)
    }

    fn commit(&self, actions: Vec<Action>) -> Result<(Settled, Patch)> {
        if actions.is_empty() || !actions.iter().all(is_action) {
            return Err(StoreError::InvalidInput("dispatch arguments"));
        }
        if let Some(atom) = ComputeScope::current_in(self.inner.owner()) {
            return Err(StoreError::ReentrantDispatch(atom));
        }

        let span = tracing::debug_span!(
            "dispatch",
            store = %self.inner.name,
            actions = actions.len()
        );
        let _enter = span.enter();

        let (result, changed, effects) = {
            let _guard = self.inner.dispatch_lock.lock();
            let mut tx = Transaction::new(self.inner.as_ref(), &actions);
            let outcome = tx.run();
            let (patch, effects) = tx.into_parts();

            match outcome {
                Ok(()) => {
                    let changed = self.inner.merge(&patch);
                    (TransactionResult { actions, error: None, patch }, changed, effects)
                }
                Err(err) => {
                    tracing::debug!(error = %err, "transaction failed");
                    let result = TransactionResult {
                        actions,
                        error: Some(err),
                        patch,
                    };
                    (result, Vec::new(), Vec::new())
                }
            }
        };

        let callbacks = self.inner.state.lock().listeners.transaction_callbacks();
        for callback in callbacks {
            call_isolated(ListenerKind::Transaction, || callback(&result));
        }

        let TransactionResult {
            actions,
            error,
            patch,
        } = result;
        if let Some(err) = error {
            return Err(err);
        }

        tracing::debug!(
            computed = patch.len(),
            changed = changed.len(),
            effects = effects.len(),
            "transaction committed"
        );

        for (atom, state) in &changed {
            let callbacks = self.inner.state.lock().listeners.atom_callbacks(atom);
            for callback in callbacks {
                call_isolated(ListenerKind::Atom, || callback(state));
            }
        }

        for action in &actions {
            let callbacks = self
                .inner
                .state
                .lock()
                .listeners
                .action_callbacks(action.action_type());
            for callback in callbacks {
                call_isolated(ListenerKind::Action, || callback(action));
            }
        }

        Ok((Settled::start(effects, self, self.inner.spawn_effects), patch))
    }

    /// Latest cache of an atom, without computing anything.
    pub fn get_cache(&self, atom: &Atom) -> Option<Arc<Cache>> {
        self.inner.state.lock().graph.get(atom)
    }

    /// Current state of an atom, computing it on first access.
    ///
    /// A first access dispatches an init action that targets only this atom,
    /// so listeners observe it like any other transaction. A cached state is
    /// returned as is.
    pub fn get_state(&self, atom: &Atom) -> Result<Value> {
        if let Some(cache) = self.get_cache(atom) {
            return Ok(cache.state().clone());
        }

        let action = Action::new(init_action_type(atom)).with_targets([atom.clone()]);
        let (settled, patch) = self.commit(vec![action])?;
        // Nobody awaits the init dispatch; its effects still have to run.
        settled.detach();

        patch
            .get(atom)
            .cloned()
            .or_else(|| self.get_cache(atom))
            .map(|cache| cache.state().clone())
            .ok_or(StoreError::InvalidInput("atom"))
    }

    /// Typed [`get_state`](Store::get_state). `None` if the state is not a `T`.
    pub fn get_state_as<T>(&self, atom: &Atom) -> Result<Option<T>>
    where
        T: Clone + 'static,
    {
        Ok(self.get_state(atom)?.get::<T>().cloned())
    }

    /// States of every mounted atom and, transitively, their dependencies.
    ///
    /// Dependencies are read from the live graph, falling back to the cache
    /// recorded by the reader. Atoms sharing an id overwrite each other; the
    /// later one wins.
    pub fn get_all_states(&self) -> Snapshot {
        let state = self.inner.state.lock();
        let mut states = Snapshot::new();
        let mut seen = HashSet::new();

        let roots: Vec<(Atom, Arc<Cache>)> = state
            .listeners
            .mounted()
            .filter_map(|atom| state.graph.get(atom).map(|cache| (atom.clone(), cache)))
            .collect();

        for root in roots {
            let mut stack = vec![root];
            while let Some((atom, cache)) = stack.pop() {
                if !seen.insert(atom.clone()) {
                    continue;
                }
                states.insert(atom.id(), cache.state().clone());
                for dep in cache.deps().iter().rev() {
                    let live = state.graph.get(&dep.atom).unwrap_or_else(|| dep.cache.clone());
                    stack.push((dep.atom.clone(), live));
                }
            }
        }

        states
    }

    /// Register a listener.
    ///
    /// An atom listener mounts the atom and computes it if needed; the
    /// listener receives that first state through the init dispatch. If the
    /// first computation fails the listener is removed again and the error is
    /// returned.
    pub fn subscribe(&self, listener: Listener) -> Result<Subscription> {
        let id = ListenerId::new();
        let weak = Arc::downgrade(&self.inner);

        match listener {
            Listener::Transaction(callback) => {
                self.inner.state.lock().listeners.add_transaction(id, callback);
                Ok(Subscription::new(weak, Release::Transaction(id)))
            }
            Listener::Action(creator, callback) => {
                if !is_action_creator(&creator) {
                    return Err(StoreError::InvalidInput("action listener"));
                }
                let action_type = creator.action_type().clone();
                self.inner
                    .state
                    .lock()
                    .listeners
                    .add_action(action_type.clone(), id, callback);
                Ok(Subscription::new(weak, Release::Action(action_type, id)))
            }
            Listener::Atom(atom, callback) => {
                if !is_atom(&atom) {
                    return Err(StoreError::InvalidInput("atom listener"));
                }
                self.mount(&atom, id, callback);
                let subscription = Subscription::new(weak, Release::Atom(atom.clone(), id));
                self.get_state(&atom)?;
                Ok(subscription)
            }
        }
    }

    fn mount(&self, atom: &Atom, id: ListenerId, callback: crate::reactive::AtomCallback) {
        let mut state = self.inner.state.lock();
        let StoreState {
            graph,
            index,
            listeners,
        } = &mut *state;

        if listeners.add_atom(atom, id, callback) {
            if let Some(cache) = graph.get(atom) {
                index.add(atom, &cache);
            }
            tracing::debug!(store = %self.inner.name, atom = atom.id(), "atom mounted");
        }
    }

    /// Observe the states of `atom`. See [`subscribe`](Store::subscribe).
    pub fn subscribe_atom<F>(&self, atom: &Atom, callback: F) -> Result<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Listener::atom(atom, callback))
    }

    /// Observe every dispatched action of the creator's type.
    pub fn subscribe_action<F>(&self, creator: &ActionCreator, callback: F) -> Result<Subscription>
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        self.subscribe(Listener::action(creator, callback))
    }

    /// Observe every transaction, including failed ones.
    pub fn subscribe_transaction<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TransactionResult) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.inner
            .state
            .lock()
            .listeners
            .add_transaction(id, Arc::new(callback));
        Subscription::new(Arc::downgrade(&self.inner), Release::Transaction(id))
    }

    /// Mount every atom with a no-op listener.
    ///
    /// The returned subscription unmounts them all. If one atom fails to
    /// compute, the atoms mounted before it are released again.
    pub fn init<'a, I>(&self, atoms: I) -> Result<Subscription>
    where
        I: IntoIterator<Item = &'a Atom>,
    {
        let subscriptions = atoms
            .into_iter()
            .map(|atom| self.subscribe_atom(atom, |_| {}))
            .collect::<Result<Vec<_>>>()?;
        Ok(Subscription::group(subscriptions))
    }

    /// Whether `atom` has at least one atom listener.
    pub fn is_mounted(&self, atom: &Atom) -> bool {
        self.inner.state.lock().listeners.is_mounted(atom)
    }

    /// Mounted atoms a dispatch of `action_type` would recompute.
    pub fn indexed_atoms(&self, action_type: &str) -> Vec<Atom> {
        self.inner.state.lock().index.atoms_for(action_type)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("cached", &state.graph.len())
            .field("mounted", &state.listeners.mounted().count())
            .finish()
    }
}

/// Type of the action that computes an atom on first access.
fn init_action_type(atom: &Atom) -> String {
    static NONCE: AtomicU64 = AtomicU64::new(1);
    format!(
        "init \"{}\" ~{:x}",
        atom.id(),
        NONCE.fetch_add(1, Ordering::Relaxed)
    )
}
