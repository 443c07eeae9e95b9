//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and
//! notifies subscribers whenever the value is written.
//!
//! # How Cells Work
//!
//! 1. When a cell is read with [`Cell::get`] inside a tracking scope (an
//!    effect or memo), the scope records the cell as a dependency.
//!
//! 2. When the cell is written with [`Cell::set`] or [`Cell::update`], every
//!    subscriber is notified synchronously.
//!
//! 3. Watchers ([`Cell::watch`]) layer change detection on top of the raw
//!    notification.
//!
//! # Thread Safety
//!
//! The value sits behind a `parking_lot::RwLock` and clones share state, so
//! cells can be moved into tasks. No lock is held while subscribers run.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use super::context::ReactiveContext;
use super::subscriber::{Notify, Source, SourceId, SubscriberId, Subscribers};

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use switchmap_core::reactive::Cell;
///
/// let count = Cell::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// count.update(|n| *n += 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) inner: Arc<CellInner<T>>,
}

pub(crate) struct CellInner<T> {
    id: SourceId,
    value: RwLock<T>,
    subscribers: Subscribers,
}

impl<T> CellInner<T>
where
    T: Clone,
{
    pub(crate) fn snapshot(&self) -> T {
        self.value.read().clone()
    }
}

impl<T> Source for CellInner<T>
where
    T: Send + Sync + 'static,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn subscribe(&self, subscriber_id: SubscriberId, notify: Notify) {
        self.subscribers.insert(subscriber_id, notify);
    }

    fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.subscribers.remove(subscriber_id);
    }
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id: SourceId::new(),
                value: RwLock::new(value),
                subscribers: Subscribers::new(),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a tracking scope, the scope's computation will be
    /// re-run when this cell changes.
    pub fn get(&self) -> T {
        if ReactiveContext::is_active() {
            let source: Arc<dyn Source> = self.inner.clone();
            ReactiveContext::track(source);
        }

        self.inner.snapshot()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.snapshot()
    }

    /// Borrow the current value without cloning or tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.notify();
    }

    /// Mutate the value in place and notify subscribers.
    ///
    /// This is how nested structure changes; deep watchers compare the
    /// result against what they last saw.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.inner.value.write());
        self.notify();
    }

    /// Fire the dependency trigger without writing.
    pub fn notify(&self) {
        self.inner.subscribers.notify();
    }

    /// Register a raw notification callback for a subscriber.
    ///
    /// The callback receives no value; see [`Cell::watch`] for a
    /// value-carrying subscription with change detection.
    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribers.insert(subscriber_id, Arc::new(notify));
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner.subscribers.remove(subscriber_id);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Whether two handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Serializes an untracked snapshot of the current value.
impl<T> Serialize for Cell<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.inner.value.read().serialize(serializer)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
