//! Single-output switch-map.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use smallvec::smallvec;
use tracing::trace;

use super::cleanup::CleanupRegistrar;
use super::generation::{Generation, Subscriptions};
use super::options::SwitchMapOptions;
use super::projector::{follow, EarlyWrites, Projector};
use super::Engine;
use crate::reactive::{Cell, Equality, WatchHandle, WatchOptions};

/// A cell that always mirrors the target selected by the latest source value.
///
/// The switch stays live for as long as this handle exists. Dropping it
/// unsubscribes from the source and the current target and runs the pending
/// cleanup; clones of [`SwitchMap::cell`] keep their last value.
pub struct SwitchMap<U>
where
    U: Clone + Send + Sync + 'static,
{
    output: Cell<U>,
    engine: Arc<dyn Engine>,
}

impl<U> SwitchMap<U>
where
    U: Clone + Send + Sync + 'static,
{
    /// Read the current value, recording a dependency in the current
    /// tracking scope.
    pub fn get(&self) -> U {
        self.output.get()
    }

    pub fn get_untracked(&self) -> U {
        self.output.get_untracked()
    }

    /// Overwrite the output and notify its dependents.
    ///
    /// This is transient: the next source or target change replaces it.
    pub fn set(&self, value: U) {
        self.output.set(value);
    }

    /// Mutate the output in place. Transient, like [`SwitchMap::set`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut U),
    {
        self.output.update(f);
    }

    /// The output cell, for consumers that take cells.
    pub fn cell(&self) -> &Cell<U> {
        &self.output
    }

    /// The source-change cycle currently in effect.
    pub fn generation(&self) -> Generation {
        self.engine.generation()
    }

    /// Whether the current projection registered a cleanup that has not run.
    pub fn has_pending_cleanup(&self) -> bool {
        self.engine.has_cleanup()
    }

    /// Number of target watchers currently installed.
    pub fn active_subscriptions(&self) -> usize {
        self.engine.active_subscriptions()
    }
}

impl<U> AsRef<Cell<U>> for SwitchMap<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn as_ref(&self) -> &Cell<U> {
        &self.output
    }
}

impl<U> Debug for SwitchMap<U>
where
    U: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchMap")
            .field("generation", &self.generation())
            .field("value", &self.get_untracked())
            .finish()
    }
}

impl<U> Serialize for SwitchMap<U>
where
    U: Clone + Send + Sync + Serialize + 'static,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.output.serialize(serializer)
    }
}

struct SingleEngine<U, F>
where
    U: Clone + Send + Sync + 'static,
{
    // Declared first so the source watch goes before the projector's
    // teardown runs the final cleanup.
    source: Mutex<Option<WatchHandle>>,
    projector: Projector<F>,
    output: Cell<U>,
    target_equality: Equality<U>,
}

impl<U, F> SingleEngine<U, F>
where
    U: Clone + Send + Sync + 'static,
{
    fn switch<T>(&self, value: T)
    where
        F: Fn(T, &CleanupRegistrar<'_>) -> Cell<U>,
    {
        let (generation, target) = self.projector.cycle(value);
        self.attach(generation, &target);
    }

    fn attach(&self, generation: Generation, target: &Cell<U>) {
        let handle = follow(
            target,
            self.output.clone(),
            self.target_equality.clone(),
            self.projector.guard(generation),
        );
        self.projector.install(generation, Subscriptions::new(smallvec![handle]));
    }
}

impl<U, F> Engine for SingleEngine<U, F>
where
    U: Clone + Send + Sync + 'static,
    F: Send + Sync,
{
    fn generation(&self) -> Generation {
        self.projector.generation()
    }

    fn active_subscriptions(&self) -> usize {
        self.projector.active_subscriptions()
    }

    fn has_cleanup(&self) -> bool {
        self.projector.has_cleanup()
    }
}

/// Switch-map with deep comparison on both the source and the target.
///
/// `project` runs once now for the source's current value and again after
/// every source change. Before each re-run, the cleanup registered by the
/// previous run is invoked.
///
/// # Example
///
/// ```rust
/// use switchmap_core::{switch_map, Cell};
///
/// let source = Cell::new(10);
/// let output = switch_map(&source, |v, _cleanup| Cell::new(v.to_string()));
/// assert_eq!(output.get(), "10");
///
/// source.set(11);
/// assert_eq!(output.get(), "11");
/// ```
///
/// # Panics
///
/// Panics raised by `project` are not caught. They unwind out of this call
/// or out of the `set` that changed the source.
pub fn switch_map<T, U, F>(source: &Cell<T>, project: F) -> SwitchMap<U>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    U: Clone + Send + Sync + PartialEq + 'static,
    F: Fn(T, &CleanupRegistrar<'_>) -> Cell<U> + Send + Sync + 'static,
{
    switch_map_with(source, SwitchMapOptions::default(), project)
}

/// Switch-map with explicit compare strategies.
pub fn switch_map_with<T, U, F>(
    source: &Cell<T>,
    options: SwitchMapOptions<T, U>,
    project: F,
) -> SwitchMap<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(T, &CleanupRegistrar<'_>) -> Cell<U> + Send + Sync + 'static,
{
    let SwitchMapOptions {
        source: source_equality,
        target: target_equality,
    } = options;

    let early = EarlyWrites::watch(source, source_equality.clone());
    let projector = Projector::new(project);
    let (generation, target) = projector.cycle(source.get_untracked());

    let engine = Arc::new(SingleEngine {
        source: Mutex::new(None),
        projector,
        output: Cell::new(target.get_untracked()),
        target_equality,
    });
    engine.attach(generation, &target);

    let weak = Arc::downgrade(&engine);
    let handle = source.watch(WatchOptions::new().equality(source_equality), move |value: &T| {
        if let Some(engine) = weak.upgrade() {
            engine.switch(value.clone());
        }
    });
    *engine.source.lock() = Some(handle);

    if let Some(value) = early.finish() {
        trace!("source written during the first projection; switching again");
        engine.switch(value);
    }

    SwitchMap {
        output: engine.output.clone(),
        engine,
    }
}
