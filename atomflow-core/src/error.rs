//! Error types for the store engine.

use std::sync::Arc;

use thiserror::Error;

/// Error type returned by atom computations and effects.
///
/// Computations are authored outside the store, so any error type is
/// accepted at that boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared form of a computation error, cheap to clone into a
/// [`TransactionResult`](crate::store::TransactionResult).
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Malformed dispatch or subscribe arguments. Raised before any state is
    /// touched.
    #[error("invalid {0}")]
    InvalidInput(&'static str),

    /// An atom's computation failed; the whole transaction was discarded.
    #[error("atom `{atom}` failed to compute: {source}")]
    Computation {
        atom: String,
        #[source]
        source: SharedError,
    },

    /// A computation read an atom that is still being computed.
    #[error("dependency cycle through atom `{0}`")]
    Cycle(String),

    /// `dispatch` was called from inside an atom computation.
    #[error("dispatch called from inside the computation of atom `{0}`")]
    ReentrantDispatch(String),
}

impl StoreError {
    pub(crate) fn computation(atom: &str, source: BoxError) -> Self {
        Self::Computation {
            atom: atom.to_string(),
            source: Arc::from(source),
        }
    }

    /// Build a computation failure from a caught panic payload.
    pub(crate) fn panicked(atom: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        Self::computation(atom, panic_message(payload.as_ref()).into())
    }

    /// Whether this error came from a computation (including cycles).
    pub fn is_computation(&self) -> bool {
        matches!(self, Self::Computation { .. } | Self::Cycle(_))
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}
