//! Integration Tests for the single-output switch-map.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchmap_core::{
    switch_map, switch_map_with, Cell, CleanupRegistrar, Effect, Equality, Memo, SwitchMapOptions,
};
use tokio::time::{interval, sleep};

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

#[test]
fn escape_hatch_scenario() {
    let source = Cell::new(10);
    let derived = switch_map(&source, |v, _| Cell::new(v));
    assert_eq!(derived.get(), 10);

    source.set(11);
    assert_eq!(derived.get(), 11);

    derived.set(99);
    assert_eq!(derived.get(), 99);

    source.set(12);
    assert_eq!(derived.get(), 12);
}

#[test]
fn projection_called_once_per_change() {
    let source = Cell::new(0);
    let (calls, sink) = counter();

    let derived = switch_map(&source, move |v: i32, _: &CleanupRegistrar<'_>| {
        sink.fetch_add(1, Ordering::SeqCst);
        Cell::new(format!("{v} is now a string"))
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    for v in 1..=5 {
        source.set(v);
        assert_eq!(derived.get(), format!("{v} is now a string"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(derived.generation().get(), 6);
}

#[test]
fn cleanup_runs_exactly_once_before_next_projection() {
    let source = Cell::new(0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();

    let derived = switch_map(&source, move |v: i32, cleanup: &CleanupRegistrar<'_>| {
        sink.lock().unwrap().push(format!("project {v}"));
        let sink = sink.clone();
        cleanup.register(move || sink.lock().unwrap().push(format!("cleanup {v}")));
        Cell::new(v)
    });

    source.set(1);
    drop(derived);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["project 0", "cleanup 0", "project 1", "cleanup 1"]
    );
}

#[test]
fn memo_chain_over_output() {
    let source = Cell::new(10);
    let derived = switch_map(&source, |v, _| Cell::new(v));

    let output = derived.cell().clone();
    let doubled = Memo::new(move || output.get() * 2);
    assert_eq!(doubled.get(), 20);

    source.set(9);
    assert_eq!(doubled.get(), 18);

    derived.set(11);
    assert_eq!(doubled.get(), 22);

    source.set(10);
    assert_eq!(doubled.get(), 20);
}

#[test]
fn effect_reruns_on_target_writes() {
    let source = Cell::new(1);
    let targets = Arc::new(Mutex::new(Vec::new()));
    let stash = targets.clone();

    let derived = switch_map(&source, move |v: i32, _: &CleanupRegistrar<'_>| {
        let target = Cell::new(v);
        stash.lock().unwrap().push(target.clone());
        target
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (output, sink) = (derived.cell().clone(), seen.clone());
    let _effect = Effect::new(move || sink.lock().unwrap().push(output.get()));

    let first = targets.lock().unwrap()[0].clone();
    first.set(5);
    source.set(2);
    first.set(6);

    assert_eq!(*seen.lock().unwrap(), vec![1, 5, 2]);
}

#[test]
fn deep_compare_on_structured_values() {
    let source = Cell::new(vec![1, 2]);
    let (calls, sink) = counter();

    let derived = switch_map(&source, move |v: Vec<i32>, _: &CleanupRegistrar<'_>| {
        sink.fetch_add(1, Ordering::SeqCst);
        Cell::new(v.iter().sum::<i32>())
    });

    source.set(vec![1, 2]);
    source.update(|v| v.push(3));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(derived.get(), 6);
}

#[test]
fn custom_target_equality_filters_output_writes() {
    let source = Cell::new(0);
    let target = Cell::new(0);
    let shared = target.clone();

    let options = SwitchMapOptions::new(
        Equality::deep(),
        Equality::custom(|a: &i32, b: &i32| a / 10 == b / 10),
    );
    let derived = switch_map_with(&source, options, move |_, _| shared.clone());

    target.set(5);
    assert_eq!(derived.get(), 0);
    target.set(12);
    assert_eq!(derived.get(), 12);
}

#[test]
fn teardown_on_drop() {
    let source = Cell::new(0);
    let target = Cell::new(0);
    let shared = target.clone();
    let (cleanups, sink) = counter();

    let derived = switch_map(&source, move |_: i32, cleanup: &CleanupRegistrar<'_>| {
        let sink = sink.clone();
        cleanup.register(move || {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        shared.clone()
    });
    let output = derived.cell().clone();
    assert_eq!(target.subscriber_count(), 1);

    drop(derived);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(source.subscriber_count(), 0);
    assert_eq!(target.subscriber_count(), 0);

    target.set(7);
    source.set(1);
    assert_eq!(output.get(), 0);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn panic_in_projection_propagates_after_cleanup() {
    let source = Cell::new(0);
    let (cleanups, sink) = counter();

    let derived = switch_map(&source, move |v: i32, cleanup: &CleanupRegistrar<'_>| {
        assert!(v != 1, "refusing to project 1");
        let sink = sink.clone();
        cleanup.register(move || {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        Cell::new(v)
    });

    assert!(catch_unwind(AssertUnwindSafe(|| source.set(1))).is_err());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert!(!derived.has_pending_cleanup());

    source.set(2);
    assert_eq!(derived.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn timer_driven_target_reaches_output() {
    let source = Cell::new(0);
    let (cleanups, sink) = counter();

    let derived = switch_map(&source, move |v: i32, cleanup: &CleanupRegistrar<'_>| {
        let target = Cell::new(format!("{v} is now a string"));
        let ticker = target.clone();
        let task = tokio::spawn(async move {
            let mut ticks = interval(Duration::from_millis(1000));
            ticks.tick().await;
            loop {
                ticks.tick().await;
                ticker.update(|s| s.push('!'));
            }
        });

        let sink = sink.clone();
        cleanup.register(move || {
            task.abort();
            sink.fetch_add(1, Ordering::SeqCst);
        });
        target
    });

    sleep(Duration::from_millis(3200)).await;
    assert_eq!(derived.get(), "0 is now a string!!!");
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn source_changes_cancel_previous_timers() {
    let source = Cell::new(0);
    let (cleanups, sink) = counter();

    let derived = switch_map(&source, move |v: i32, cleanup: &CleanupRegistrar<'_>| {
        let target = Cell::new(v * 100);
        let ticker = target.clone();
        let task = tokio::spawn(async move {
            let mut ticks = interval(Duration::from_millis(100));
            ticks.tick().await;
            loop {
                ticks.tick().await;
                ticker.update(|n| *n += 1);
            }
        });

        let sink = sink.clone();
        cleanup.register(move || {
            task.abort();
            sink.fetch_add(1, Ordering::SeqCst);
        });
        target
    });

    for v in 1..=4 {
        sleep(Duration::from_millis(250)).await;
        source.set(v);
    }
    assert_eq!(cleanups.load(Ordering::SeqCst), 4);
    assert_eq!(derived.get(), 400);

    sleep(Duration::from_millis(350)).await;
    assert_eq!(derived.get(), 403);
}
