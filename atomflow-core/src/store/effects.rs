//! Post-commit side effects.
//!
//! Computations queue effects through [`Ctx::schedule`](super::Ctx::schedule).
//! After a transaction commits and every listener has been notified, the
//! store starts the effects and hands the caller a [`Settled`] barrier.
//!
//! # Scheduling
//!
//! When a tokio runtime is available each effect is spawned as its own task,
//! so effects run even if the caller never waits. Without a runtime (or with
//! spawning disabled in the [`StoreBuilder`](super::StoreBuilder)) the effects
//! are held by the barrier and run when it is awaited.
//!
//! A barrier holding effects is never discarded silently. Detaching or
//! dropping it spawns the effects on the ambient runtime, or runs them to
//! completion on a temporary current-thread runtime when there is none.
//!
//! Each effect is isolated: an error or a panic is logged and swallowed, and
//! never fails the barrier or the other effects.

use std::future::IntoFuture;
use std::mem;
use std::panic::AssertUnwindSafe;

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{panic_message, BoxError};

use super::Store;

/// A queued side effect.
pub type Effect = Box<dyn FnOnce(Store) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

#[derive(Default)]
enum Pending {
    #[default]
    Done,
    Spawned(Vec<JoinHandle<()>>),
    Deferred(Vec<BoxFuture<'static, ()>>),
}

/// Completion barrier for the effects of one dispatch.
///
/// Await it (or call [`wait`](Settled::wait)) to know that every effect has
/// settled. Dropping it is the same as [`detach`](Settled::detach).
#[derive(Default)]
pub struct Settled {
    pending: Pending,
}

impl Settled {
    /// A barrier with nothing to wait for.
    pub fn done() -> Self {
        Self::default()
    }

    pub(crate) fn start(effects: Vec<Effect>, store: &Store, spawn: bool) -> Self {
        if effects.is_empty() {
            return Self::done();
        }

        let tasks: Vec<BoxFuture<'static, ()>> = effects
            .into_iter()
            .map(|effect| isolate(effect, store.clone()))
            .collect();

        let pending = match Handle::try_current() {
            Ok(handle) if spawn => {
                Pending::Spawned(tasks.into_iter().map(|task| handle.spawn(task)).collect())
            }
            _ => Pending::Deferred(tasks),
        };

        Self { pending }
    }

    /// Number of effects not yet known to have settled.
    pub fn pending(&self) -> usize {
        match &self.pending {
            Pending::Done => 0,
            Pending::Spawned(handles) => handles.iter().filter(|h| !h.is_finished()).count(),
            Pending::Deferred(tasks) => tasks.len(),
        }
    }

    /// Wait until every effect has settled.
    pub async fn wait(mut self) {
        match mem::take(&mut self.pending) {
            Pending::Done => {}
            Pending::Spawned(handles) => {
                for handle in handles {
                    if let Err(err) = handle.await {
                        tracing::warn!(error = %err, "effect task did not complete");
                    }
                }
            }
            Pending::Deferred(tasks) => {
                join_all(tasks).await;
            }
        }
    }

    /// Let the effects finish without waiting for them.
    ///
    /// Spawned effects keep running. Deferred effects are spawned on the
    /// ambient runtime, or run before this returns when the calling thread
    /// has no runtime.
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Pending::Deferred(tasks) = mem::take(&mut self.pending) {
            run_detached(tasks);
        }
    }
}

impl IntoFuture for Settled {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl Drop for Settled {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Settled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settled")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Start deferred effects that nobody will await.
fn run_detached(tasks: Vec<BoxFuture<'static, ()>>) {
    if let Ok(handle) = Handle::try_current() {
        for task in tasks {
            handle.spawn(task);
        }
        return;
    }

    tracing::debug!(effects = tasks.len(), "running detached effects in place");
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => {
            runtime.block_on(join_all(tasks));
        }
        Err(err) => tracing::warn!(
            error = %err,
            effects = tasks.len(),
            "no runtime for detached effects, dropping them"
        ),
    }
}

/// Wrap an effect so that neither its error nor its panic escapes.
fn isolate(effect: Effect, store: Store) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let outcome = AssertUnwindSafe(async move { effect(store).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "effect failed"),
            Err(payload) => {
                tracing::warn!(panic = %panic_message(payload.as_ref()), "effect panicked")
            }
        }
    })
}
