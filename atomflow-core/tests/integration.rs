//! Integration Tests for the Store
//!
//! These tests drive the store through its public API: dispatch, reads,
//! subscriptions and effects working together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use atomflow_core::store::TransactionResult;
use atomflow_core::{
    Action, ActionCreator, Atom, BoxError, Snapshot, Store, StoreError, Value,
};

fn counter_with_runs(id: &str, runs: Arc<AtomicUsize>) -> Atom {
    Atom::new(id, move |ctx| {
        runs.fetch_add(1, Ordering::SeqCst);
        let mut n = ctx.state_as::<i64>().copied().unwrap_or(0);
        ctx.on("inc", |_| n += 1);
        ctx.on("add", |action| n += action.payload_as::<i64>().copied().unwrap_or(0));
        Ok(Value::new(n))
    })
}

fn counter() -> Atom {
    counter_with_runs("counter", Arc::new(AtomicUsize::new(0)))
}

fn doubled(source: &Atom, runs: Arc<AtomicUsize>) -> Atom {
    let source = source.clone();
    Atom::new("doubled", move |ctx| {
        runs.fetch_add(1, Ordering::SeqCst);
        let n = *ctx.get(&source)?.get::<i64>().ok_or("not a number")?;
        Ok(Value::new(n * 2))
    })
}

fn recorder() -> (Arc<Mutex<Vec<i64>>>, impl Fn(&Value) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |value: &Value| {
        sink.lock().push(*value.get::<i64>().unwrap());
    })
}

/// Test that a mounted counter follows dispatched actions.
#[test]
fn mounted_counter_reacts_to_dispatch() {
    let store = Store::new();
    let counter = counter();
    let _mounted = store.init([&counter]).unwrap();

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(store.get_state_as::<i64>(&counter).unwrap(), Some(1));

    store
        .dispatch(Action::new("add").with_payload(Value::new(5i64)))
        .unwrap();
    assert_eq!(store.get_state_as::<i64>(&counter).unwrap(), Some(6));
}

/// Test that an atom nobody observes ignores actions.
#[test]
fn unobserved_atom_ignores_actions() {
    let store = Store::new();
    let counter = counter();

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(store.get_state_as::<i64>(&counter).unwrap(), Some(0));

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(store.get_state_as::<i64>(&counter).unwrap(), Some(0));
}

/// Test that a subscriber sees the first computation, then one call per
/// dispatch.
#[test]
fn subscriber_sees_each_change() {
    let store = Store::new();
    let counter = counter();
    let (seen, listener) = recorder();

    let _sub = store.subscribe_atom(&counter, listener).unwrap();
    assert_eq!(*seen.lock(), vec![0]);

    store.dispatch(Action::new("inc")).unwrap();
    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
}

/// Test that subscribing to an already computed atom does not replay its
/// state.
#[test]
fn warm_subscription_only_sees_dispatches() {
    let store = Store::new();
    let counter = counter();
    store.get_state(&counter).unwrap();

    let (seen, listener) = recorder();
    let _sub = store.subscribe_atom(&counter, listener).unwrap();
    assert!(seen.lock().is_empty());

    store.dispatch(Action::new("inc")).unwrap();
    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(*seen.lock(), vec![1, 2]);
}

/// Test that an empty or malformed batch is rejected before anyone hears
/// of it.
#[test]
fn invalid_batches_are_rejected() {
    let store = Store::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let _sub = store.subscribe_transaction({
        let calls = calls.clone();
        move |_: &TransactionResult| {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    });

    let err = store.dispatch(Vec::<Action>::new()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));

    let err = store
        .dispatch(vec![Action::new("inc"), Action::new("")])
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));

    let nameless = Atom::new("", |_| Ok(Value::new(0i64)));
    let err = store
        .dispatch(Action::new("inc").with_targets([nameless]))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Test that a failing computation leaves the graph untouched and reaches
/// transaction listeners before the caller.
#[test]
fn failed_batch_is_atomic() {
    let store = Store::new();
    let counter = counter();
    let fragile = Atom::new("fragile", |ctx| {
        let mut failed = false;
        ctx.on("boom", |_| failed = true);
        if failed {
            return Err("fragile atom exploded".into());
        }
        Ok(Value::new(0i64))
    });

    let (seen, listener) = recorder();
    let _counter_sub = store.subscribe_atom(&counter, listener).unwrap();
    let _fragile_sub = store.subscribe_atom(&fragile, |_| {}).unwrap();
    let before = store.get_cache(&counter).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let _tx_sub = store.subscribe_transaction({
        let events = events.clone();
        move |result: &TransactionResult| {
            let error = result.error().map(ToString::to_string);
            events.lock().push(format!("listener: {error:?}"));
        }
    });

    let err = store
        .dispatch([Action::new("inc"), Action::new("boom")])
        .unwrap_err();
    events.lock().push("returned".to_string());

    match &err {
        StoreError::Computation { atom, source } => {
            assert_eq!(atom, "fragile");
            assert_eq!(source.to_string(), "fragile atom exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert!(events[0].starts_with("listener: Some("));
    assert_eq!(events[1], "returned");

    assert!(Arc::ptr_eq(&store.get_cache(&counter).unwrap(), &before));
    assert_eq!(*seen.lock(), vec![0]);
}

/// Test that atoms untouched by the batch are not recomputed.
#[test]
fn unaffected_dependencies_are_memoized() {
    let store = Store::new();
    let a_runs = Arc::new(AtomicUsize::new(0));
    let b_runs = Arc::new(AtomicUsize::new(0));

    let a = {
        let runs = a_runs.clone();
        Atom::new("a", move |ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            let mut n = ctx.state_as::<i64>().copied().unwrap_or(0);
            ctx.on("a", |_| n += 1);
            Ok(Value::new(n))
        })
    };
    let b = {
        let runs = b_runs.clone();
        Atom::new("b", move |ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            let mut n = ctx.state_as::<i64>().copied().unwrap_or(0);
            ctx.on("b", |_| n += 1);
            Ok(Value::new(n))
        })
    };
    let sum = {
        let (a, b) = (a.clone(), b.clone());
        Atom::new("sum", move |ctx| {
            let a = *ctx.get(&a)?.get::<i64>().ok_or("a")?;
            let b = *ctx.get(&b)?.get::<i64>().ok_or("b")?;
            Ok(Value::new(a + b))
        })
    };

    let _sub = store.subscribe_atom(&sum, |_| {}).unwrap();
    assert_eq!((a_runs.load(Ordering::SeqCst), b_runs.load(Ordering::SeqCst)), (1, 1));

    let b_cache = store.get_cache(&b).unwrap();
    store.dispatch(Action::new("a")).unwrap();

    assert_eq!(a_runs.load(Ordering::SeqCst), 2);
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&store.get_cache(&b).unwrap(), &b_cache));
    assert_eq!(store.get_state_as::<i64>(&sum).unwrap(), Some(1));
}

/// Test that reading twice without a dispatch returns the same value.
#[test]
fn repeated_reads_return_the_same_value() {
    let store = Store::new();
    let counter = counter();

    let first = store.get_state(&counter).unwrap();
    let second = store.get_state(&counter).unwrap();
    assert!(first.same(&second));
}

/// Test that the reducer index follows mount and unmount.
#[test]
fn index_follows_subscriptions() {
    let store = Store::new();
    let doubled_runs = Arc::new(AtomicUsize::new(0));
    let counter = counter();
    let doubled = doubled(&counter, doubled_runs.clone());

    let sub = store.subscribe_atom(&doubled, |_| {}).unwrap();
    assert!(store.is_mounted(&doubled));
    assert!(!store.is_mounted(&counter));
    assert_eq!(store.indexed_atoms("inc"), vec![doubled.clone()]);

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(doubled_runs.load(Ordering::SeqCst), 2);
    assert_eq!(store.get_state_as::<i64>(&doubled).unwrap(), Some(2));

    sub.unsubscribe();
    assert!(!store.is_mounted(&doubled));
    assert!(store.indexed_atoms("inc").is_empty());

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(doubled_runs.load(Ordering::SeqCst), 2);
}

/// Test the fixed notification order of a successful dispatch.
#[test]
fn notifications_follow_merge_order() {
    let store = Store::new();
    let x = counter_with_runs("x", Arc::new(AtomicUsize::new(0)));
    let y = counter_with_runs("y", Arc::new(AtomicUsize::new(0)));
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let push = |label: &'static str| {
        let log = log.clone();
        move || log.lock().push(label.to_string())
    };

    let on_x = push("x");
    let on_y = push("y");
    let on_action = push("action");
    let on_tx = push("transaction");

    let _x = store.subscribe_atom(&x, move |_| on_x()).unwrap();
    let _y = store.subscribe_atom(&y, move |_| on_y()).unwrap();
    let _action = store
        .subscribe_action(&ActionCreator::new("inc"), move |_| on_action())
        .unwrap();
    let _tx = store.subscribe_transaction(move |_| on_tx());
    log.lock().clear();

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(*log.lock(), ["transaction", "x", "y", "action"]);
}

/// Test that a state returned unchanged by identity notifies nobody.
#[test]
fn identical_state_is_not_a_change() {
    let store = Store::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let sticky = {
        let runs = runs.clone();
        Atom::new("sticky", move |ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            ctx.on("touch", |_| {});
            Ok(ctx.state().cloned().unwrap_or_else(|| Value::new(7i64)))
        })
    };

    let (seen, listener) = recorder();
    let _sub = store.subscribe_atom(&sticky, listener).unwrap();
    store.dispatch(Action::new("touch")).unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock(), vec![7]);
}

/// Test that a snapshot seeds atoms that were never computed.
#[test]
fn snapshot_hydrates_cold_atoms() {
    let store = Store::with_snapshot(Snapshot::new().with("counter", Value::new(10i64)));
    let counter = counter();

    let (seen, listener) = recorder();
    let _sub = store.subscribe_atom(&counter, listener).unwrap();
    store.dispatch(Action::new("inc")).unwrap();

    assert_eq!(*seen.lock(), vec![10, 11]);
}

/// Test that the full state covers mounted atoms and their dependencies.
#[test]
fn all_states_cover_mounted_subtrees() {
    let store = Store::new();
    let counter = counter();
    let doubled = doubled(&counter, Arc::new(AtomicUsize::new(0)));
    let loose = Atom::new("loose", |_| Ok(Value::new(0i64)));

    let _sub = store.subscribe_atom(&doubled, |_| {}).unwrap();
    store.get_state(&loose).unwrap();
    store.dispatch(Action::new("inc")).unwrap();

    let states = store.get_all_states();
    let ids: Vec<_> = states.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["doubled", "counter"]);
    assert_eq!(states.get_as::<i64>("doubled"), Some(&2));
    assert_eq!(states.get_as::<i64>("counter"), Some(&1));

    // The record hydrates a second store.
    let restored = Store::with_snapshot(states);
    assert_eq!(restored.get_state_as::<i64>(&self::counter()).unwrap(), Some(1));
}

/// Test that init mounts every atom and releases them together.
#[test]
fn init_mounts_a_group() {
    let store = Store::new();
    let a = counter_with_runs("a", Arc::new(AtomicUsize::new(0)));
    let b = counter_with_runs("b", Arc::new(AtomicUsize::new(0)));

    let group = store.init([&a, &b]).unwrap();
    assert!(store.is_mounted(&a) && store.is_mounted(&b));
    assert_eq!(store.indexed_atoms("inc"), vec![a.clone(), b.clone()]);

    drop(group);
    assert!(!store.is_mounted(&a) && !store.is_mounted(&b));
    assert!(store.indexed_atoms("inc").is_empty());
}

/// Test that a failing first computation rolls the subscription back.
#[test]
fn failed_subscription_is_rolled_back() {
    let store = Store::new();
    let ok = counter();
    let broken = Atom::new("broken", |_| Err("no state".into()));

    let err = store.init([&ok, &broken]).unwrap_err();
    assert!(err.is_computation());
    assert!(!store.is_mounted(&ok));
    assert!(!store.is_mounted(&broken));
    assert!(store.get_cache(&broken).is_none());
}

/// Test that a panicking listener does not stop the others.
#[test]
fn listener_panics_are_isolated() {
    let store = Store::new();
    let counter = counter();

    let _bad = store
        .subscribe_atom(&counter, |value| {
            if value.get::<i64>() == Some(&1) {
                panic!("listener bug");
            }
        })
        .unwrap();
    let (seen, listener) = recorder();
    let _good = store.subscribe_atom(&counter, listener).unwrap();

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(*seen.lock(), vec![1]);
    assert_eq!(store.get_state_as::<i64>(&counter).unwrap(), Some(1));
}

/// Test that a computation cannot dispatch, while a listener can.
#[test]
fn dispatch_from_computation_is_rejected() {
    let store = Store::new();
    let inner_error = Arc::new(Mutex::new(None));

    let meddler = {
        let store = store.clone();
        let inner_error = inner_error.clone();
        Atom::new("meddler", move |_| {
            if let Err(err) = store.dispatch(Action::new("inc")) {
                *inner_error.lock() = Some(err);
            }
            Ok(Value::new(0i64))
        })
    };

    store.get_state(&meddler).unwrap();
    assert!(matches!(
        *inner_error.lock(),
        Some(StoreError::ReentrantDispatch(ref atom)) if atom == "meddler"
    ));

    let counter = counter();
    let _counter = store.subscribe_atom(&counter, |_| {}).unwrap();
    let _chain = store
        .subscribe_action(&ActionCreator::new("add"), {
            let store = store.clone();
            move |_| {
                store.dispatch(Action::new("inc")).unwrap();
            }
        })
        .unwrap();

    store
        .dispatch(Action::new("add").with_payload(Value::new(10i64)))
        .unwrap();
    assert_eq!(store.get_state_as::<i64>(&counter).unwrap(), Some(11));
}

fn with_effect(id: &str, hits: Arc<AtomicUsize>) -> Atom {
    Atom::new(id, move |ctx| {
        let mut fire = false;
        ctx.on("save", |_| fire = true);
        if fire {
            let hits = hits.clone();
            ctx.schedule(move |_store: Store| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            });
        }
        Ok(Value::new(fire))
    })
}

/// Test that effects run after commit and the barrier waits for them.
#[tokio::test]
async fn effects_settle_after_dispatch() {
    let store = Store::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let atom = with_effect("saver", hits.clone());
    let _sub = store.subscribe_atom(&atom, |_| {}).unwrap();

    store.dispatch(Action::new("save")).unwrap().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Test that effects can dispatch into the store and that failing effects
/// do not fail the barrier.
#[tokio::test]
async fn effects_can_dispatch() {
    let store = Store::new();
    let counter = counter();
    let _counter = store.subscribe_atom(&counter, |_| {}).unwrap();

    let trigger = Atom::new("trigger", |ctx| {
        let mut fire = false;
        ctx.on("kick", |_| fire = true);
        if fire {
            ctx.schedule(|store: Store| async move {
                store.dispatch(Action::new("inc"))?;
                Ok::<(), BoxError>(())
            });
            ctx.schedule(|_store: Store| async move {
                Err::<(), BoxError>("effect failed".into())
            });
        }
        Ok(Value::new(fire))
    });
    let _trigger = store.subscribe_atom(&trigger, |_| {}).unwrap();

    let settled = store.dispatch(Action::new("kick")).unwrap();
    settled.await;
    assert_eq!(store.get_state_as::<i64>(&counter).unwrap(), Some(1));
}

/// Test that effects of a failed batch never run.
#[tokio::test]
async fn effects_of_failed_batches_are_dropped() {
    let store = Store::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let saver = with_effect("saver", hits.clone());
    let failing = Atom::new("failing", |ctx| {
        let mut fail = false;
        ctx.on("save", |_| fail = true);
        if fail {
            return Err("rejected".into());
        }
        Ok(Value::new(()))
    });

    let _sub = store.init([&saver, &failing]).unwrap();
    assert!(store.dispatch(Action::new("save")).is_err());

    tokio::task::yield_now().await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

fn schedules_on_first_run(id: &str, hits: Arc<AtomicUsize>) -> Atom {
    Atom::new(id, move |ctx| {
        if ctx.state().is_none() {
            let hits = hits.clone();
            ctx.schedule(move |_store: Store| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            });
        }
        Ok(Value::new(0i64))
    })
}

/// Test that effects of a first computation run even with no runtime to
/// spawn them on.
#[test]
fn first_computation_effects_run_without_runtime() {
    let store = Store::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let greeter = schedules_on_first_run("greeter", hits.clone());

    let _sub = store.subscribe_atom(&greeter, |_| {}).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let other = schedules_on_first_run("other", hits.clone());
    let _group = store.init([&other]).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

/// Test that first computation effects run when spawning is disabled.
#[tokio::test]
async fn first_computation_effects_run_with_spawning_disabled() {
    let store = Store::builder().spawn_effects(false).build();
    let hits = Arc::new(AtomicUsize::new(0));
    let greeter = schedules_on_first_run("greeter", hits.clone());

    store.get_state(&greeter).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Test that a type picked up by a dependency re-indexes the mounted reader.
#[test]
fn dependency_type_change_reindexes_reader() {
    let store = Store::new();
    let listening = Arc::new(AtomicUsize::new(0));

    let child = {
        let listening = listening.clone();
        Atom::new("child", move |ctx| {
            let mut n = ctx.state_as::<i64>().copied().unwrap_or(1);
            ctx.on("flip", |_| {});
            if listening.load(Ordering::SeqCst) == 1 {
                ctx.on("late", |_| n += 100);
            }
            Ok(Value::new(n))
        })
    };
    let parent = {
        let child = child.clone();
        Atom::new("parent", move |ctx| ctx.get(&child))
    };

    let _sub = store.subscribe_atom(&parent, |_| {}).unwrap();
    assert!(store.indexed_atoms("late").is_empty());
    assert_eq!(store.indexed_atoms("flip"), vec![parent.clone()]);

    listening.store(1, Ordering::SeqCst);
    store.dispatch(Action::new("flip")).unwrap();
    assert_eq!(store.indexed_atoms("late"), vec![parent.clone()]);

    store.dispatch(Action::new("late")).unwrap();
    assert_eq!(store.get_state_as::<i64>(&parent).unwrap(), Some(101));

    listening.store(0, Ordering::SeqCst);
    store.dispatch(Action::new("flip")).unwrap();
    assert!(store.indexed_atoms("late").is_empty());
    assert_eq!(store.indexed_atoms("flip"), vec![parent]);
}

/// Test that a computation may cold-read an atom of another store.
#[test]
fn computation_can_read_another_store() {
    let remote_store = Store::new();
    let remote = counter();

    let local_store = Store::new();
    let bridge = {
        let remote_store = remote_store.clone();
        let remote = remote.clone();
        Atom::new("bridge", move |_| {
            let n = remote_store.get_state_as::<i64>(&remote)?.unwrap_or(-1);
            Ok(Value::new(n + 1))
        })
    };

    assert_eq!(local_store.get_state_as::<i64>(&bridge).unwrap(), Some(1));
    assert!(remote_store.get_cache(&remote).is_some());
}
