//! Watchers
//!
//! A watcher is a value-carrying subscription on a single cell. It adds two
//! things on top of raw notification:
//!
//! - **immediate**: fire once, synchronously, at registration;
//! - **equality**: a pluggable compare strategy deciding whether a write is
//!   a change. [`Equality::shallow`] treats every write as a change,
//!   [`Equality::deep`] compares the new value structurally against the last
//!   value the watcher saw, [`Equality::custom`] takes any predicate.
//!
//! Callbacks run in an isolated tracking scope, so whatever they read is
//! never attributed to the computation that caused the write.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::cell::Cell;
use super::context::untracked;
use super::subscriber::{Source, SubscriberId};

type EqFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Compare strategy used to decide whether a write is a change.
pub struct Equality<T> {
    eq: Option<EqFn<T>>,
}

impl<T> Equality<T> {
    /// Every write is a change.
    pub fn shallow() -> Self {
        Self { eq: None }
    }

    /// Writes are changes when `eq(previous, next)` is false.
    pub fn custom<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            eq: Some(Arc::new(eq)),
        }
    }

    pub fn is_shallow(&self) -> bool {
        self.eq.is_none()
    }

    pub(crate) fn changed(&self, previous: &T, next: &T) -> bool {
        match &self.eq {
            Some(eq) => !eq(previous, next),
            None => true,
        }
    }
}

impl<T> Equality<T>
where
    T: PartialEq + 'static,
{
    /// Structural comparison through `PartialEq`, which recurses into
    /// nested fields and collections.
    pub fn deep() -> Self {
        Self::custom(|a: &T, b: &T| a == b)
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            eq: self.eq.clone(),
        }
    }
}

impl<T> Debug for Equality<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strategy = if self.is_shallow() { "shallow" } else { "compare" };
        f.debug_tuple("Equality").field(&strategy).finish()
    }
}

/// Options for [`Cell::watch`].
///
/// ```rust
/// use switchmap_core::reactive::WatchOptions;
///
/// let options = WatchOptions::<Vec<u8>>::new().immediate().deep();
/// assert!(options.immediate);
/// ```
pub struct WatchOptions<T> {
    pub immediate: bool,
    pub equality: Equality<T>,
}

impl<T> WatchOptions<T> {
    pub fn new() -> Self {
        Self {
            immediate: false,
            equality: Equality::shallow(),
        }
    }

    /// Fire once at registration.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }
}

impl<T> WatchOptions<T>
where
    T: PartialEq + 'static,
{
    pub fn deep(self) -> Self {
        self.equality(Equality::deep())
    }
}

impl<T> Default for WatchOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WatchOptions<T> {
    fn clone(&self) -> Self {
        Self {
            immediate: self.immediate,
            equality: self.equality.clone(),
        }
    }
}

impl<T> Debug for WatchOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchOptions")
            .field("immediate", &self.immediate)
            .field("equality", &self.equality)
            .finish()
    }
}

/// Handle to a registered watcher.
///
/// Dropping this handle unsubscribes the watcher.
pub struct WatchHandle {
    source: Weak<dyn Source>,
    subscriber_id: SubscriberId,
}

impl WatchHandle {
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    /// Whether the watched cell is still alive.
    pub fn is_live(&self) -> bool {
        self.source.strong_count() > 0
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.unsubscribe(self.subscriber_id);
        }
    }
}

impl Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("subscriber_id", &self.subscriber_id)
            .field("live", &self.is_live())
            .finish()
    }
}

struct Watcher<T, F> {
    equality: Equality<T>,
    /// Last value delivered; only kept when a compare is configured.
    last_seen: Mutex<Option<T>>,
    callback: F,
}

impl<T, F> Watcher<T, F>
where
    T: Clone,
    F: Fn(&T),
{
    fn fire(&self, current: T) {
        if !self.equality.is_shallow() {
            let mut last_seen = self.last_seen.lock();
            if let Some(previous) = last_seen.as_ref() {
                if !self.equality.changed(previous, &current) {
                    return;
                }
            }
            *last_seen = Some(current.clone());
        }

        untracked(|| (self.callback)(&current));
    }
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Invoke `callback` with the new value whenever this cell changes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::{Arc, Mutex};
    /// use switchmap_core::reactive::{Cell, WatchOptions};
    ///
    /// let cell = Cell::new(1);
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = seen.clone();
    ///
    /// let _handle = cell.watch(WatchOptions::new().immediate().deep(), move |v| {
    ///     sink.lock().unwrap().push(*v);
    /// });
    ///
    /// cell.set(1); // equal, skipped
    /// cell.set(2);
    /// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    /// ```
    pub fn watch<F>(&self, options: WatchOptions<T>, callback: F) -> WatchHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let WatchOptions {
            immediate,
            equality,
        } = options;

        let last_seen = if equality.is_shallow() {
            None
        } else {
            Some(self.get_untracked())
        };

        let watcher = Arc::new(Watcher {
            equality,
            last_seen: Mutex::new(last_seen),
            callback,
        });

        let subscriber_id = SubscriberId::new();
        let cell = Arc::downgrade(&self.inner);
        let notified = Arc::clone(&watcher);
        self.subscribe(subscriber_id, move || {
            if let Some(cell) = cell.upgrade() {
                notified.fire(cell.snapshot());
            }
        });

        if immediate {
            let current = self.get_untracked();
            untracked(|| (watcher.callback)(&current));
        }

        let source: Arc<dyn Source> = self.inner.clone();
        WatchHandle {
            source: Arc::downgrade(&source),
            subscriber_id,
        }
    }
}
