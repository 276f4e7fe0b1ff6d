//! Fault-isolated listener calls.

use std::panic::{self, AssertUnwindSafe};

use crate::error::panic_message;

/// Which kind of listener is being called, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerKind {
    Transaction,
    Atom,
    Action,
}

impl ListenerKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Atom => "atom",
            Self::Action => "action",
        }
    }
}

/// Call a listener, logging and swallowing a panic.
///
/// Returns false if the listener panicked.
pub(crate) fn call_isolated<F: FnOnce()>(kind: ListenerKind, listener: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(listener)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                listener = kind.as_str(),
                panic = %panic_message(payload.as_ref()),
                "listener failed"
            );
            false
        }
    }
}
