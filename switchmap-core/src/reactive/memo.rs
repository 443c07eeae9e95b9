//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation inside a tracking
//!    scope, caches the result, and subscribes to everything it read.
//!
//! 2. When accessed again while clean, the cached value is returned.
//!
//! 3. When a dependency changes, the memo is marked dirty and notifies its
//!    own dependents, so an effect reading the memo re-runs and pulls the
//!    fresh value.
//!
//! 4. Recomputation happens lazily, on the next read. A change that lands
//!    while the computation is still running leaves the memo dirty, so the
//!    next read computes again.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::subscriber::{Notify, Source, SourceId, SubscriberId, Subscribers};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed since the last computation.
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use switchmap_core::reactive::{Cell, Memo};
///
/// let count = Cell::new(2);
/// let reader = count.clone();
/// let doubled = Memo::new(move || reader.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T> {
    id: SourceId,
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    state: Mutex<MemoState>,
    /// Bumped on every invalidation, under the state lock.
    epoch: AtomicU64,
    /// Sources read by the last computation.
    sources: Mutex<Vec<Arc<dyn Source>>>,
    dependents: Subscribers,
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn current(self: &Arc<Self>) -> T {
        if *self.state.lock() == MemoState::Clean {
            if let Some(value) = self.value.read().clone() {
                return value;
            }
        }
        self.recompute()
    }

    fn recompute(self: &Arc<Self>) -> T {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let (value, sources) = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            let value = (self.compute)();
            (value, ReactiveContext::take_sources())
        };

        self.detach();
        self.attach(sources);

        *self.value.write() = Some(value.clone());
        let mut state = self.state.lock();
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *state = MemoState::Clean;
        }
        drop(state);

        value
    }

    fn attach(self: &Arc<Self>, sources: Vec<Arc<dyn Source>>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let notify: Notify = Arc::new(move || {
            if let Some(memo) = weak.upgrade() {
                memo.invalidate();
            }
        });

        for source in &sources {
            source.subscribe(self.subscriber_id, Arc::clone(&notify));
        }
        *self.sources.lock() = sources;
    }

    fn detach(&self) {
        let sources = std::mem::take(&mut *self.sources.lock());
        for source in sources {
            source.unsubscribe(self.subscriber_id);
        }
    }

    fn invalidate(&self) {
        let was_clean = {
            let mut state = self.state.lock();
            let was_clean = *state == MemoState::Clean;
            *state = MemoState::Dirty;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            was_clean
        };

        // Dependents that have not read us since the last change were
        // already told.
        if was_clean {
            self.dependents.notify();
        }
    }
}

impl<T> Source for MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn subscribe(&self, subscriber_id: SubscriberId, notify: Notify) {
        self.dependents.insert(subscriber_id, notify);
    }

    fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.dependents.remove(subscriber_id);
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        for source in self.sources.get_mut().drain(..) {
            source.unsubscribe(self.subscriber_id);
        }
    }
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(MemoInner {
                id: SourceId::new(),
                subscriber_id: SubscriberId::new(),
                compute: Box::new(compute),
                value: RwLock::new(None),
                state: Mutex::new(MemoState::Dirty),
                epoch: AtomicU64::new(0),
                sources: Mutex::new(Vec::new()),
                dependents: Subscribers::new(),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a tracking scope the memo is recorded as a dependency.
    pub fn get(&self) -> T {
        if ReactiveContext::is_active() {
            let source: Arc<dyn Source> = self.inner.clone();
            ReactiveContext::track(source);
        }
        self.inner.current()
    }

    pub fn get_untracked(&self) -> T {
        self.inner.current()
    }

    /// Force recomputation on next access.
    pub fn mark_dirty(&self) {
        self.inner.invalidate();
    }

    pub fn state(&self) -> MemoState {
        *self.inner.state.lock()
    }

    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.len()
    }

    /// Number of sources read by the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
