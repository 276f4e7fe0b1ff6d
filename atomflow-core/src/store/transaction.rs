//! Transaction Engine
//!
//! A transaction applies one batch of actions to the cache graph without
//! touching it: every recomputed atom lands in a private patch, and the store
//! merges the patch only when the whole batch succeeded.
//!
//! # Algorithm
//!
//! 1. Resolve the explicit targets of every action, in order. Targets are
//!    always recomputed.
//! 2. Resolve every atom the reducer index routes each action type to.
//! 3. Resolving an atom:
//!    - an atom already in the patch is reused (computed at most once);
//!    - an atom with a cache is verified: it is stale if its own types
//!      intersect the batch's types or if any dependency resolves to a
//!      different cache than the one it recorded; fresh caches are reused;
//!    - otherwise its computation runs against a [`Ctx`], pulling
//!      dependencies depth first as they are read.
//!
//! The first failure aborts the transaction. The caller discards the patch.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;

use crate::error::{BoxError, Result, StoreError};
use crate::graph::{Cache, CacheDep};
use crate::reactive::{Action, ActionType, Atom, ComputeScope, Value};

use super::effects::Effect;
use super::Store;

/// Read access to the live store from inside a transaction.
pub(crate) trait CacheSource {
    /// Address identifying the store, recorded on the computation scope.
    fn owner(&self) -> usize;

    /// Latest committed cache of an atom.
    fn cache(&self, atom: &Atom) -> Option<Arc<Cache>>;

    /// Snapshot value for an atom id, used for cold starts.
    fn hydrated(&self, id: &str) -> Option<Value>;

    /// Mounted atoms registered under an action type.
    fn indexed(&self, action_type: &str) -> Vec<Atom>;
}

/// Patch produced by a transaction, in merge order.
pub type Patch = IndexMap<Atom, Arc<Cache>>;

pub(crate) struct Transaction<'s> {
    source: &'s dyn CacheSource,
    actions: &'s [Action],
    action_types: Vec<ActionType>,
    targets: HashSet<Atom>,
    patch: Patch,
    /// Existing caches confirmed fresh during this transaction.
    verified: HashMap<Atom, Arc<Cache>>,
    effects: Vec<Effect>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(source: &'s dyn CacheSource, actions: &'s [Action]) -> Self {
        let mut action_types: Vec<ActionType> = Vec::with_capacity(actions.len());
        for action in actions {
            if !action_types.contains(action.action_type()) {
                action_types.push(action.action_type().clone());
            }
        }

        Self {
            source,
            actions,
            action_types,
            targets: actions
                .iter()
                .flat_map(|action| action.targets().iter().cloned())
                .collect(),
            patch: IndexMap::new(),
            verified: HashMap::new(),
            effects: Vec::new(),
        }
    }

    /// Resolve every atom the batch affects.
    pub(crate) fn run(&mut self) -> Result<()> {
        let actions = self.actions;

        for action in actions {
            for atom in action.targets() {
                self.resolve(atom)?;
            }
        }

        for action in actions {
            for atom in self.source.indexed(action.action_type()) {
                self.resolve(&atom)?;
            }
        }

        Ok(())
    }

    /// Split into the patch and the effects queued by computations.
    pub(crate) fn into_parts(self) -> (Patch, Vec<Effect>) {
        (self.patch, self.effects)
    }

    fn resolve(&mut self, atom: &Atom) -> Result<Arc<Cache>> {
        if let Some(cache) = self.patch.get(atom) {
            return Ok(cache.clone());
        }
        if let Some(cache) = self.verified.get(atom) {
            return Ok(cache.clone());
        }
        if ComputeScope::contains(atom.key()) {
            return Err(StoreError::Cycle(atom.id().to_string()));
        }

        let existing = self.source.cache(atom);
        if let Some(cache) = &existing {
            if !self.targets.contains(atom) && !self.is_stale(cache)? {
                self.verified.insert(atom.clone(), cache.clone());
                return Ok(cache.clone());
            }
        }

        let cache = self.compute(atom, existing.as_deref())?;
        self.patch.insert(atom.clone(), cache.clone());
        Ok(cache)
    }

    fn is_stale(&mut self, cache: &Cache) -> Result<bool> {
        if cache.reacts_to(self.action_types.iter()) {
            return Ok(true);
        }

        for dep in cache.deps() {
            let current = self.resolve(&dep.atom)?;
            if !Arc::ptr_eq(&current, &dep.cache) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn compute(&mut self, atom: &Atom, previous: Option<&Cache>) -> Result<Arc<Cache>> {
        let state = match previous {
            Some(cache) => Some(cache.state().clone()),
            None => self.source.hydrated(atom.id()),
        };

        let _scope = ComputeScope::enter(self.source.owner(), atom.key(), atom.id());
        tracing::trace!(
            atom = atom.id(),
            cold = previous.is_none(),
            depth = ComputeScope::depth(),
            "computing atom"
        );

        let mut ctx = Ctx {
            tx: self,
            atom,
            state,
            deps: Vec::new(),
            types: BTreeSet::new(),
            failure: None,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| atom.compute(&mut ctx)));
        let Ctx {
            deps,
            types,
            failure,
            ..
        } = ctx;

        // A failed dependency fails the reader even if the reader recovered.
        if let Some(failure) = failure {
            return Err(failure);
        }

        match outcome {
            Ok(Ok(state)) => Ok(Arc::new(Cache::new(state, deps, types))),
            Ok(Err(err)) => Err(StoreError::computation(atom.id(), err)),
            Err(payload) => Err(StoreError::panicked(atom.id(), payload)),
        }
    }
}

/// Read context handed to an atom's computation.
///
/// Everything the computation touches through the context is recorded:
/// atoms read through [`get`](Ctx::get) become dependencies and types handled
/// through [`on`](Ctx::on) become the types the atom reacts to.
pub struct Ctx<'t, 's> {
    tx: &'t mut Transaction<'s>,
    atom: &'t Atom,
    state: Option<Value>,
    deps: Vec<CacheDep>,
    types: BTreeSet<ActionType>,
    failure: Option<StoreError>,
}

impl Ctx<'_, '_> {
    /// The atom being computed.
    pub fn atom(&self) -> &Atom {
        self.atom
    }

    /// Previous state: the committed cache, or the snapshot value on a cold
    /// start.
    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    /// Previous state downcast to `T`.
    pub fn state_as<T: 'static>(&self) -> Option<&T> {
        self.state.as_ref().and_then(Value::get::<T>)
    }

    /// Read another atom and record it as a dependency.
    ///
    /// The dependency is resolved within the running transaction, so it sees
    /// the batch's actions and is computed at most once.
    pub fn get(&mut self, atom: &Atom) -> std::result::Result<Value, BoxError> {
        match self.tx.resolve(atom) {
            Ok(cache) => {
                let state = cache.state().clone();
                if !self.deps.iter().any(|dep| dep.atom == *atom) {
                    self.deps.push(CacheDep {
                        atom: atom.clone(),
                        cache,
                    });
                }
                Ok(state)
            }
            Err(err) => {
                let boxed: BoxError = Box::new(err.clone());
                self.failure.get_or_insert(err);
                Err(boxed)
            }
        }
    }

    /// Handle every action of `action_type` in the batch, in dispatch order.
    ///
    /// The type is recorded even when the batch holds no such action, which
    /// is what registers the atom for future dispatches.
    pub fn on<F>(&mut self, action_type: &str, mut handler: F)
    where
        F: FnMut(&Action),
    {
        self.types.insert(ActionType::from(action_type));

        let actions = self.tx.actions;
        for action in actions.iter().filter(|a| &**a.action_type() == action_type) {
            handler(action);
        }
    }

    /// All actions of the running batch. Reading them records nothing.
    pub fn actions(&self) -> &[Action] {
        self.tx.actions
    }

    /// Queue a side effect to run against the store after the batch commits.
    ///
    /// Effects are dropped if the transaction fails.
    pub fn schedule<F, Fut>(&mut self, effect: F)
    where
        F: FnOnce(Store) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.tx
            .effects
            .push(Box::new(move |store: Store| -> BoxFuture<'static, _> {
                Box::pin(effect(store))
            }));
    }
}
