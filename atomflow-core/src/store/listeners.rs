//! Listener registry.
//!
//! Holds the three listener kinds. An atom with at least one listener is
//! mounted; the registry is the source of truth for mount state.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::reactive::{
    ActionCallback, ActionType, Atom, AtomCallback, ListenerId, TransactionCallback,
};

#[derive(Default)]
pub(crate) struct Registry {
    /// Mounted atoms in mount order.
    atoms: IndexMap<Atom, IndexMap<ListenerId, AtomCallback>>,
    actions: HashMap<ActionType, IndexMap<ListenerId, ActionCallback>>,
    transactions: IndexMap<ListenerId, TransactionCallback>,
}

impl Registry {
    /// Add an atom listener. Returns true if this mounted the atom.
    pub(crate) fn add_atom(&mut self, atom: &Atom, id: ListenerId, callback: AtomCallback) -> bool {
        let listeners = self.atoms.entry(atom.clone()).or_default();
        let first = listeners.is_empty();
        listeners.insert(id, callback);
        first
    }

    /// Remove an atom listener. Returns true if this unmounted the atom.
    pub(crate) fn remove_atom(&mut self, atom: &Atom, id: ListenerId) -> bool {
        let Some(listeners) = self.atoms.get_mut(atom) else {
            return false;
        };
        if listeners.shift_remove(&id).is_none() {
            return false;
        }
        if listeners.is_empty() {
            self.atoms.shift_remove(atom);
            return true;
        }
        false
    }

    pub(crate) fn is_mounted(&self, atom: &Atom) -> bool {
        self.atoms.contains_key(atom)
    }

    pub(crate) fn mounted(&self) -> impl Iterator<Item = &Atom> {
        self.atoms.keys()
    }

    pub(crate) fn atom_callbacks(&self, atom: &Atom) -> Vec<AtomCallback> {
        self.atoms
            .get(atom)
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn add_action(&mut self, action_type: ActionType, id: ListenerId, callback: ActionCallback) {
        self.actions.entry(action_type).or_default().insert(id, callback);
    }

    pub(crate) fn remove_action(&mut self, action_type: &str, id: ListenerId) {
        if let Some(listeners) = self.actions.get_mut(action_type) {
            listeners.shift_remove(&id);
            if listeners.is_empty() {
                self.actions.remove(action_type);
            }
        }
    }

    pub(crate) fn action_callbacks(&self, action_type: &str) -> Vec<ActionCallback> {
        self.actions
            .get(action_type)
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn add_transaction(&mut self, id: ListenerId, callback: TransactionCallback) {
        self.transactions.insert(id, callback);
    }

    pub(crate) fn remove_transaction(&mut self, id: ListenerId) {
        self.transactions.shift_remove(&id);
    }

    pub(crate) fn transaction_callbacks(&self) -> Vec<TransactionCallback> {
        self.transactions.values().cloned().collect()
    }
}
