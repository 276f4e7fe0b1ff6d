//! Subscription handles.

use std::fmt;
use std::sync::Weak;

use crate::reactive::{ActionType, Atom, ListenerId};

use super::StoreInner;

pub(crate) enum Release {
    Atom(Atom, ListenerId),
    Action(ActionType, ListenerId),
    Transaction(ListenerId),
    Group(Vec<Subscription>),
}

/// Handle to a registered listener.
///
/// Dropping the handle (or calling [`unsubscribe`](Subscription::unsubscribe))
/// removes the listener. Releasing the last listener of an atom unmounts it.
/// The handle holds the store weakly, so it never keeps a store alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    store: Weak<StoreInner>,
    release: Option<Release>,
}

impl Subscription {
    pub(crate) fn new(store: Weak<StoreInner>, release: Release) -> Self {
        Self {
            store,
            release: Some(release),
        }
    }

    /// Combine several subscriptions into one that releases them all.
    pub fn group(subscriptions: Vec<Subscription>) -> Self {
        Self::new(Weak::new(), Release::Group(subscriptions))
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {}

    /// Keep the listener registered for the rest of the store's life.
    pub fn detach(mut self) {
        if let Some(Release::Group(members)) = self.release.take() {
            members.into_iter().for_each(Subscription::detach);
        }
    }

    /// Whether the listener is still registered through this handle.
    pub fn is_active(&self) -> bool {
        match &self.release {
            Some(Release::Group(members)) => members.iter().any(Subscription::is_active),
            Some(_) => self.store.strong_count() > 0,
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };
        match release {
            Release::Group(members) => drop(members),
            release => {
                if let Some(store) = self.store.upgrade() {
                    store.release(release);
                }
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.release {
            Some(Release::Atom(atom, _)) => format!("atom {}", atom.id()),
            Some(Release::Action(action_type, _)) => format!("action {action_type}"),
            Some(Release::Transaction(_)) => "transaction".to_string(),
            Some(Release::Group(members)) => format!("group of {}", members.len()),
            None => "released".to_string(),
        };
        f.debug_tuple("Subscription").field(&kind).finish()
    }
}
