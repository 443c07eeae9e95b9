//! Integration Tests for Reactive System
//!
//! These tests verify that cells, memos, effects and watchers work together
//! correctly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use switchmap_core::reactive::{
    untracked, Cell, Effect, Memo, MemoState, ReactiveContext, Source, SubscriberId, WatchOptions,
};

/// A memo tracks cell dependencies and recomputes on change.
#[test]
fn memo_tracks_cell_dependency() {
    let cell = Cell::new(10);

    let cell_clone = cell.clone();
    let memo = Memo::new(move || cell_clone.get() * 2);

    assert_eq!(memo.get(), 20);
    assert_eq!(memo.dependency_count(), 1);

    cell.set(5);
    assert_eq!(memo.state(), MemoState::Dirty);
    assert_eq!(memo.get(), 10);
}

/// An effect re-runs when a cell it read changes.
#[test]
fn effect_tracks_cell_dependency() {
    let cell = Cell::new(0);
    let observed_value = Arc::new(AtomicI32::new(-1));
    let observed_clone = observed_value.clone();

    let cell_clone = cell.clone();
    let _effect = Effect::new(move || {
        observed_clone.store(cell_clone.get(), Ordering::SeqCst);
    });

    assert_eq!(observed_value.load(Ordering::SeqCst), 0);

    cell.set(42);
    assert_eq!(observed_value.load(Ordering::SeqCst), 42);
}

/// Memos cache values between accesses.
#[test]
fn memo_caches_expensive_computation() {
    let compute_count = Arc::new(AtomicI32::new(0));
    let compute_clone = compute_count.clone();

    let memo = Memo::new(move || {
        compute_clone.fetch_add(1, Ordering::SeqCst);
        42
    });

    assert_eq!(memo.get(), 42);
    assert_eq!(memo.get(), 42);
    assert_eq!(memo.get(), 42);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);
}

/// Memos can depend on other memos; invalidation propagates down the chain.
#[test]
fn memo_depends_on_memo() {
    let base = Cell::new(5);

    let base_clone = base.clone();
    let doubled = Memo::new(move || base_clone.get() * 2);

    let doubled_clone = doubled.clone();
    let plus_ten = Memo::new(move || doubled_clone.get() + 10);

    assert_eq!(doubled.get(), 10);
    assert_eq!(plus_ten.get(), 20);

    base.set(10);

    assert_eq!(plus_ten.state(), MemoState::Dirty);
    assert_eq!(plus_ten.get(), 30);
    assert_eq!(doubled.get(), 20);
}

/// A disposed effect never runs again.
#[test]
fn disposed_effect_does_not_run() {
    let cell = Cell::new(0);
    let run_count = Arc::new(AtomicI32::new(0));
    let run_clone = run_count.clone();

    let cell_clone = cell.clone();
    let effect = Effect::new(move || {
        let _ = cell_clone.get();
        run_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(run_count.load(Ordering::SeqCst), 1);

    effect.dispose();
    cell.set(1);
    effect.execute();

    assert_eq!(run_count.load(Ordering::SeqCst), 1);
    assert_eq!(cell.subscriber_count(), 0);
}

/// Nested contexts keep their own dependency sets.
#[test]
fn nested_reactive_contexts() {
    let (a, b, c) = (Cell::new(1), Cell::new(2), Cell::new(3));

    let _outer_ctx = ReactiveContext::enter(SubscriberId::new());
    let _ = a.get();

    {
        let _inner_ctx = ReactiveContext::enter(SubscriberId::new());
        let _ = b.get();
        let _ = c.get();

        let inner = ReactiveContext::tracked_ids();
        assert_eq!(inner.len(), 2);
        assert!(inner.contains(&b.id()));
        assert!(inner.contains(&c.id()));
    }

    let outer = ReactiveContext::tracked_ids();
    assert_eq!(outer, vec![a.id()]);
}

/// Reads inside `untracked` are invisible to the enclosing context.
#[test]
fn untracked_reads_are_not_dependencies() {
    let tracked = Cell::new(1);
    let hidden = Cell::new(2);

    let _ctx = ReactiveContext::enter(SubscriberId::new());
    let _ = tracked.get();
    let _ = untracked(|| hidden.get());

    assert_eq!(ReactiveContext::tracked_ids(), vec![tracked.id()]);
}

/// The full chain: cell -> memo -> effect, with a watcher alongside.
#[test]
fn full_reactive_chain() {
    let cell = Cell::new(100);

    let cell_clone = cell.clone();
    let tripled = Memo::new(move || cell_clone.get() * 3);

    let seen = Arc::new(AtomicI32::new(0));
    let (memo_clone, seen_clone) = (tripled.clone(), seen.clone());
    let effect = Effect::new(move || {
        seen_clone.store(memo_clone.get(), Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 300);

    let watched = Arc::new(AtomicI32::new(0));
    let watched_clone = watched.clone();
    let _handle = cell.watch(WatchOptions::new().deep(), move |v| {
        watched_clone.store(*v, Ordering::SeqCst);
    });

    cell.set(50);
    assert_eq!(seen.load(Ordering::SeqCst), 150);
    assert_eq!(watched.load(Ordering::SeqCst), 50);
    assert_eq!(effect.run_count(), 2);
    assert_eq!(tripled.dependent_count(), 1);
    assert_eq!(cell.subscriber_count(), 2);
}

/// Cells are usable as type-erased sources.
#[test]
fn cell_as_dyn_source() {
    let cell = Cell::new(0);
    let fired = Arc::new(AtomicI32::new(0));
    let fired_clone = fired.clone();

    let _ctx = ReactiveContext::enter(SubscriberId::new());
    let _ = cell.get();
    let sources = ReactiveContext::take_sources();
    assert_eq!(sources.len(), 1);

    let source: &Arc<dyn Source> = &sources[0];
    let id = SubscriberId::new();
    source.subscribe(
        id,
        Arc::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );

    cell.set(1);
    source.unsubscribe(id);
    cell.set(2);

    assert_eq!(source.source_id(), cell.id());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
