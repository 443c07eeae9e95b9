//! Multi-output switch-map.
//!
//! The projection returns a keyed map whose entries are either target cells
//! or plain values. Each reactive key gets its own output cell, so a write
//! to one key's target only notifies consumers of that key.
//!
//! The first projection fixes the shape: its reactive keys are the keys that
//! get output cells, and its plain values are the plain values the handle
//! exposes. Later projections are only consulted for those reactive keys.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::{Equivalent, IndexMap};
use parking_lot::Mutex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::cleanup::CleanupRegistrar;
use super::generation::{Generation, Subscriptions};
use super::options::SwitchMapOptions;
use super::projector::{follow, EarlyWrites, Projector};
use super::Engine;
use crate::error::{Error, Result};
use crate::reactive::{Cell, Equality, WatchHandle, WatchOptions};

/// One entry of a projected map.
pub enum Projected<U, P = serde_json::Value>
where
    U: Clone + Send + Sync + 'static,
{
    /// A reactive entry; followed by the engine.
    Cell(Cell<U>),
    /// A plain value, passed through as-is.
    Plain(P),
}

/// What an object projection returns.
pub type ProjectedMap<K, U, P = serde_json::Value> = IndexMap<K, Projected<U, P>>;

impl<U, P> Projected<U, P>
where
    U: Clone + Send + Sync + 'static,
{
    pub fn is_cell(&self) -> bool {
        matches!(self, Projected::Cell(_))
    }

    pub fn as_cell(&self) -> Option<&Cell<U>> {
        match self {
            Projected::Cell(cell) => Some(cell),
            Projected::Plain(_) => None,
        }
    }

    pub fn as_plain(&self) -> Option<&P> {
        match self {
            Projected::Cell(_) => None,
            Projected::Plain(value) => Some(value),
        }
    }

    pub fn into_cell(self) -> Option<Cell<U>> {
        match self {
            Projected::Cell(cell) => Some(cell),
            Projected::Plain(_) => None,
        }
    }
}

impl<U, P> From<Cell<U>> for Projected<U, P>
where
    U: Clone + Send + Sync + 'static,
{
    fn from(cell: Cell<U>) -> Self {
        Projected::Cell(cell)
    }
}

impl<U, P> Clone for Projected<U, P>
where
    U: Clone + Send + Sync + 'static,
    P: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Projected::Cell(cell) => Projected::Cell(cell.clone()),
            Projected::Plain(value) => Projected::Plain(value.clone()),
        }
    }
}

impl<U, P> Debug for Projected<U, P>
where
    U: Clone + Send + Sync + Debug + 'static,
    P: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Projected::Cell(cell) => f.debug_tuple("Cell").field(cell).finish(),
            Projected::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
        }
    }
}

/// Cells serialize as their current value, plain values as themselves.
impl<U, P> Serialize for Projected<U, P>
where
    U: Clone + Send + Sync + Serialize + 'static,
    P: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Projected::Cell(cell) => cell.serialize(serializer),
            Projected::Plain(value) => value.serialize(serializer),
        }
    }
}

/// Handle to a multi-output switch-map.
///
/// Reactive keys map to output cells owned by the engine; plain keys map to
/// the values of the first projection. Dropping the handle tears the engine
/// down the same way dropping a [`SwitchMap`](super::SwitchMap) does.
pub struct SwitchMapObject<K, U, P = serde_json::Value>
where
    U: Clone + Send + Sync + 'static,
{
    entries: ProjectedMap<K, U, P>,
    engine: Arc<dyn Engine>,
}

impl<K, U, P> SwitchMapObject<K, U, P>
where
    K: Hash + Eq,
    U: Clone + Send + Sync + 'static,
{
    pub fn get<Q>(&self, key: &Q) -> Option<&Projected<U, P>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.entries.get(key)
    }

    /// The output cell for a reactive key.
    pub fn cell<Q>(&self, key: &Q) -> Result<&Cell<U>>
    where
        Q: ?Sized + Hash + Equivalent<K> + Debug,
    {
        match self.entries.get(key) {
            Some(Projected::Cell(cell)) => Ok(cell),
            Some(Projected::Plain(_)) => Err(Error::NotReactive(format!("{key:?}"))),
            None => Err(Error::UnknownKey(format!("{key:?}"))),
        }
    }

    /// The value of a plain key.
    pub fn plain<Q>(&self, key: &Q) -> Result<&P>
    where
        Q: ?Sized + Hash + Equivalent<K> + Debug,
    {
        match self.entries.get(key) {
            Some(Projected::Plain(value)) => Ok(value),
            Some(Projected::Cell(_)) => Err(Error::NotPlain(format!("{key:?}"))),
            None => Err(Error::UnknownKey(format!("{key:?}"))),
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.entries.contains_key(key)
    }

    /// Keys in the order the first projection returned them.
    pub fn keys(&self) -> indexmap::map::Keys<'_, K, Projected<U, P>> {
        self.entries.keys()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, K, Projected<U, P>> {
        self.entries.iter()
    }

    /// Only the reactive entries.
    pub fn cells(&self) -> impl Iterator<Item = (&K, &Cell<U>)> + '_ {
        self.entries
            .iter()
            .filter_map(|(key, entry)| entry.as_cell().map(|cell| (key, cell)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> Generation {
        self.engine.generation()
    }

    pub fn has_pending_cleanup(&self) -> bool {
        self.engine.has_cleanup()
    }

    /// Number of target watchers currently installed, one per followed key.
    pub fn active_subscriptions(&self) -> usize {
        self.engine.active_subscriptions()
    }
}

impl<'a, K, U, P> IntoIterator for &'a SwitchMapObject<K, U, P>
where
    U: Clone + Send + Sync + 'static,
{
    type Item = (&'a K, &'a Projected<U, P>);
    type IntoIter = indexmap::map::Iter<'a, K, Projected<U, P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K, U, P> Debug for SwitchMapObject<K, U, P>
where
    K: Hash + Eq + Debug,
    U: Clone + Send + Sync + Debug + 'static,
    P: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchMapObject")
            .field("generation", &self.generation())
            .field("entries", &self.entries)
            .finish()
    }
}

impl<K, U, P> Serialize for SwitchMapObject<K, U, P>
where
    K: Serialize,
    U: Clone + Send + Sync + Serialize + 'static,
    P: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, entry) in &self.entries {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

struct ObjectEngine<K, U, F>
where
    U: Clone + Send + Sync + 'static,
{
    source: Mutex<Option<WatchHandle>>,
    projector: Projector<F>,
    /// Output cells of the reactive keys, fixed by the first projection.
    outputs: IndexMap<K, Cell<U>>,
    target_equality: Equality<U>,
}

impl<K, U, F> ObjectEngine<K, U, F>
where
    K: Hash + Eq + Debug,
    U: Clone + Send + Sync + 'static,
{
    fn switch<T, P>(&self, value: T)
    where
        F: Fn(T, &CleanupRegistrar<'_>) -> ProjectedMap<K, U, P>,
    {
        let (generation, projected) = self.projector.cycle(value);
        self.attach(generation, &projected);
    }

    fn attach<P>(&self, generation: Generation, projected: &ProjectedMap<K, U, P>) {
        let guard = self.projector.guard(generation);
        let mut handles = SmallVec::new();

        for (key, output) in &self.outputs {
            match projected.get(key) {
                Some(Projected::Cell(target)) => handles.push(follow(
                    target,
                    output.clone(),
                    self.target_equality.clone(),
                    guard.clone(),
                )),
                Some(Projected::Plain(_)) => {
                    warn!(?key, %generation, "reactive key projected as a plain value; keeping last value")
                }
                None => warn!(?key, %generation, "reactive key missing from projection; keeping last value"),
            }
        }

        for (key, entry) in projected {
            if entry.is_cell() && !self.outputs.contains_key(key) {
                warn!(?key, %generation, "new reactive key ignored");
            }
        }

        self.projector.install(generation, Subscriptions::new(handles));
    }
}

impl<K, U, F> Engine for ObjectEngine<K, U, F>
where
    K: Send + Sync,
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

/// Multi-output switch-map with deep comparison on both layers.
///
/// # Example
///
/// ```rust
/// use indexmap::IndexMap;
/// use serde_json::json;
/// use switchmap_core::{switch_map_object, Cell, Projected};
///
/// let source = Cell::new(1);
/// let view = switch_map_object(&source, |v: i32, _cleanup| {
///     IndexMap::from([
///         ("value", Projected::Cell(Cell::new(v))),
///         ("label", Projected::Plain(json!("counter"))),
///     ])
/// });
///
/// source.set(2);
/// assert_eq!(view.cell("value").unwrap().get(), 2);
/// assert_eq!(view.plain("label").unwrap(), &json!("counter"));
/// ```
pub fn switch_map_object<T, K, U, P, F>(source: &Cell<T>, project: F) -> SwitchMapObject<K, U, P>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    U: Clone + Send + Sync + PartialEq + 'static,
    P: 'static,
    F: Fn(T, &CleanupRegistrar<'_>) -> ProjectedMap<K, U, P> + Send + Sync + 'static,
{
    switch_map_object_with(source, SwitchMapOptions::default(), project)
}

/// Multi-output switch-map with explicit compare strategies.
pub fn switch_map_object_with<T, K, U, P, F>(
    source: &Cell<T>,
    options: SwitchMapOptions<T, U>,
    project: F,
) -> SwitchMapObject<K, U, P>
where
    T: Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    P: 'static,
    F: Fn(T, &CleanupRegistrar<'_>) -> ProjectedMap<K, U, P> + Send + Sync + 'static,
{
    let SwitchMapOptions {
        source: source_equality,
        target: target_equality,
    } = options;

    let early = EarlyWrites::watch(source, source_equality.clone());
    let projector = Projector::new(project);
    let (generation, projected) = projector.cycle(source.get_untracked());

    let mut entries = IndexMap::with_capacity(projected.len());
    let mut outputs = IndexMap::new();
    let mut targets: ProjectedMap<K, U, P> = IndexMap::new();
    for (key, entry) in projected {
        match entry {
            Projected::Cell(target) => {
                let output = Cell::new(target.get_untracked());
                outputs.insert(key.clone(), output.clone());
                entries.insert(key.clone(), Projected::Cell(output));
                targets.insert(key, Projected::Cell(target));
            }
            Projected::Plain(value) => {
                entries.insert(key, Projected::Plain(value));
            }
        }
    }

    let engine = Arc::new(ObjectEngine {
        source: Mutex::new(None),
        projector,
        outputs,
        target_equality,
    });
    engine.attach(generation, &targets);

    let weak = Arc::downgrade(&engine);
    let handle = source.watch(WatchOptions::new().equality(source_equality), move |value: &T| {
        if let Some(engine) = weak.upgrade() {
            engine.switch::<T, P>(value.clone());
        }
    });
    *engine.source.lock() = Some(handle);

    if let Some(value) = early.finish() {
        trace!("source written during the first projection; switching again");
        engine.switch::<T, P>(value);
    }

    SwitchMapObject { entries, engine }
}
