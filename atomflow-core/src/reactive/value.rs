//! Type-erased state values.
//!
//! Atom states and action payloads are opaque to the store. A [`Value`] is a
//! shared, immutable handle to any `Send + Sync` value; cloning it is a
//! reference-count bump and keeps the identity.
//!
//! # Identity
//!
//! The store decides whether an atom "changed" by identity, not by equality:
//! two values are the same only if they are the same allocation. A
//! computation that wants to report "no change" must return a clone of the
//! previous value rather than an equal, freshly built one.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared handle to an arbitrary state or payload value.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
    /// Wrap a value in a new allocation (a new identity).
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self(Arc::new(value))
    }

    /// Borrow the inner value if it has type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether the inner value has type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Identity comparison.
    pub fn same(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity comparison where a missing value is only the same as another
    /// missing value.
    pub fn same_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Common scalar types get printed; everything else shows the address.
        let inner: &dyn Any = &*self.0;
        if let Some(v) = inner.downcast_ref::<i64>() {
            write!(f, "Value({v})")
        } else if let Some(v) = inner.downcast_ref::<i32>() {
            write!(f, "Value({v})")
        } else if let Some(v) = inner.downcast_ref::<u64>() {
            write!(f, "Value({v})")
        } else if let Some(v) = inner.downcast_ref::<bool>() {
            write!(f, "Value({v})")
        } else if let Some(v) = inner.downcast_ref::<String>() {
            write!(f, "Value({v:?})")
        } else if let Some(v) = inner.downcast_ref::<&'static str>() {
            write!(f, "Value({v:?})")
        } else {
            write!(f, "Value({:p})", Arc::as_ptr(&self.0))
        }
    }
}
