//! The projection cycle shared by both engines.
//!
//! One cycle, in order: start a new generation, drop the previous
//! generation's target subscriptions, run the previous cleanup, then call
//! the projection in an isolated tracking scope. Subscribing to whatever the
//! projection returned is left to the engine.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::cleanup::{CleanupRegistrar, CleanupSlot};
use super::generation::{Generation, GenerationGuard, Generations, Subscriptions};
use crate::reactive::{untracked, Cell, Equality, WatchHandle, WatchOptions};

pub(crate) struct Projector<F> {
    project: F,
    generations: Generations,
    cleanup: CleanupSlot,
}

impl<F> Projector<F> {
    pub(crate) fn new(project: F) -> Self {
        Self {
            project,
            generations: Generations::new(),
            cleanup: CleanupSlot::default(),
        }
    }

    pub(crate) fn cycle<T, R>(&self, value: T) -> (Generation, R)
    where
        F: Fn(T, &CleanupRegistrar<'_>) -> R,
    {
        let (generation, superseded) = self.generations.advance();
        trace!(%generation, superseded = superseded.len(), "switching target");
        drop(superseded);

        // Must complete before the projection runs, even if it panics.
        self.cleanup.run();

        let registrar = CleanupRegistrar::new(&self.cleanup, self.generations.guard(generation));
        let projected = untracked(|| (self.project)(value, &registrar));
        (generation, projected)
    }

    pub(crate) fn guard(&self, generation: Generation) -> GenerationGuard {
        self.generations.guard(generation)
    }

    pub(crate) fn install(&self, generation: Generation, subscriptions: Subscriptions) {
        if !self.generations.install(generation, subscriptions) {
            trace!(%generation, "target superseded while subscribing; discarded");
        }
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generations.current()
    }

    pub(crate) fn active_subscriptions(&self) -> usize {
        self.generations.active_len()
    }

    pub(crate) fn has_cleanup(&self) -> bool {
        self.cleanup.is_armed()
    }
}

/// Engine teardown: drop the active subscriptions, then run the pending
/// cleanup. Also runs while unwinding from a panicking first projection.
impl<F> Drop for Projector<F> {
    fn drop(&mut self) {
        let generation = self.generations.current();
        drop(self.generations.take());
        self.cleanup.run();
        debug!(%generation, "switch-map torn down");
    }
}

/// Mirror `target` into `output` for as long as `guard`'s generation is
/// current. Fires immediately so the output picks up the new target's value.
pub(crate) fn follow<U>(
    target: &Cell<U>,
    output: Cell<U>,
    equality: Equality<U>,
    guard: GenerationGuard,
) -> WatchHandle
where
    U: Clone + Send + Sync + 'static,
{
    target.watch(WatchOptions::new().immediate().equality(equality), move |value: &U| {
        if !guard.run_if_current(|| output.set(value.clone())) {
            trace!(generation = %guard.generation(), "ignoring stale target notification");
        }
    })
}

/// Records source writes made while the first projection runs, before the
/// engine's own source watch exists.
pub(crate) struct EarlyWrites<T> {
    latest: Arc<Mutex<Option<T>>>,
    _watch: WatchHandle,
}

impl<T> EarlyWrites<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn watch(source: &Cell<T>, equality: Equality<T>) -> Self {
        let latest = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&latest);
        let watch = source.watch(WatchOptions::new().equality(equality), move |value: &T| {
            *sink.lock() = Some(value.clone());
        });
        Self {
            latest,
            _watch: watch,
        }
    }

    /// Stop recording. Returns the last write seen, if any.
    pub(crate) fn finish(self) -> Option<T> {
        let latest = self.latest.lock().take();
        latest
    }
}
