//! Actions and action creators.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::{Atom, Value};

/// The type tag of an action.
pub type ActionType = Arc<str>;

/// A dispatched event.
///
/// `targets` forces the listed atoms to be recomputed by the transaction even
/// when nothing in the reducer index routes this action to them.
#[derive(Clone)]
pub struct Action {
    action_type: ActionType,
    payload: Option<Value>,
    targets: SmallVec<[Atom; 1]>,
}

impl Action {
    /// Create an action with no payload and no targets.
    pub fn new(action_type: impl Into<ActionType>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: None,
            targets: SmallVec::new(),
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Append atoms that must be recomputed.
    pub fn with_targets<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = Atom>,
    {
        self.targets.extend(targets);
        self
    }

    /// The type tag listeners and reducers match on.
    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// The attached payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Downcast the payload.
    pub fn payload_as<T: 'static>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(Value::get::<T>)
    }

    /// Atoms this action forces to recompute.
    pub fn targets(&self) -> &[Atom] {
        &self.targets
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("type", &self.action_type)
            .field("payload", &self.payload)
            .field("targets", &self.targets.iter().map(Atom::id).collect::<Vec<_>>())
            .finish()
    }
}

/// Shape check for actions: the type tag must be non-empty and every target
/// must itself be a valid atom.
pub fn is_action(action: &Action) -> bool {
    !action.action_type.is_empty() && action.targets.iter().all(super::is_atom)
}

/// Builds actions of one declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionCreator {
    action_type: ActionType,
}

impl ActionCreator {
    /// Create a creator for the given type.
    pub fn new(action_type: impl Into<ActionType>) -> Self {
        Self {
            action_type: action_type.into(),
        }
    }

    /// The type every created action carries.
    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// Build an action carrying `payload`.
    pub fn create(&self, payload: Value) -> Action {
        Action::new(self.action_type.clone()).with_payload(payload)
    }

    /// Build an action without a payload.
    pub fn empty(&self) -> Action {
        Action::new(self.action_type.clone())
    }
}

/// Shape check for action creators: the declared type must be non-empty.
pub fn is_action_creator(creator: &ActionCreator) -> bool {
    !creator.action_type.is_empty()
}

/// One action or an ordered batch, applied as a single transaction.
#[derive(Debug, Clone, Default)]
pub struct Batch(pub(crate) Vec<Action>);

impl Batch {
    /// An empty batch. Dispatching it fails; push actions first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action, builder style.
    pub fn push(mut self, action: Action) -> Self {
        self.0.push(action);
        self
    }

    /// Number of actions in the batch.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Action> for Batch {
    fn from(action: Action) -> Self {
        Self(vec![action])
    }
}

impl From<Vec<Action>> for Batch {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl<const N: usize> From<[Action; N]> for Batch {
    fn from(actions: [Action; N]) -> Self {
        Self(actions.into())
    }
}

impl FromIterator<Action> for Batch {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
