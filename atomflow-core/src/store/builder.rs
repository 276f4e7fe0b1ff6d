//! Store configuration.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::Value;

use super::{Store, StoreInner, StoreState};

/// Atom id to state record.
///
/// Used both to hydrate a fresh store and as the output of
/// [`Store::get_all_states`]. Entries keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot(IndexMap<String, Value>);

impl Snapshot {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style.
    pub fn with(mut self, id: impl Into<String>, value: Value) -> Self {
        self.insert(id, value);
        self
    }

    /// Insert an entry. A repeated id overwrites the earlier value.
    pub fn insert(&mut self, id: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(id.into(), value)
    }

    /// Value stored under `id`.
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    /// Typed lookup.
    pub fn get_as<T: 'static>(&self, id: &str) -> Option<&T> {
        self.0.get(id).and_then(Value::get::<T>)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(id, value)| (id.into(), value)).collect())
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Builder for a [`Store`].
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::builder()
///     .name("app")
///     .snapshot(Snapshot::new().with("counter", Value::new(10i64)))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    name: String,
    snapshot: Snapshot,
    spawn_effects: bool,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            snapshot: Snapshot::default(),
            spawn_effects: true,
        }
    }
}

impl StoreBuilder {
    /// A builder with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name carried by the store's tracing spans.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Initial states for atoms that have never been computed.
    pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Spawn effects on the ambient tokio runtime (default `true`).
    ///
    /// When disabled, or when no runtime is available, effects run when the
    /// [`Settled`](super::Settled) returned by `dispatch` is awaited, or in
    /// place when it is detached or dropped.
    pub fn spawn_effects(mut self, spawn: bool) -> Self {
        self.spawn_effects = spawn;
        self
    }

    /// Create the store.
    pub fn build(self) -> Store {
        tracing::debug!(
            store = %self.name,
            snapshot = self.snapshot.len(),
            "store created"
        );
        Store {
            inner: Arc::new(StoreInner {
                name: self.name,
                snapshot: self.snapshot,
                spawn_effects: self.spawn_effects,
                dispatch_lock: Mutex::new(()),
                state: Mutex::new(StoreState::default()),
            }),
        }
    }
}
