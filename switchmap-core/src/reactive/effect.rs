//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. Every cell or memo read during the run is collected by the reactive
//!    context, and the effect subscribes to each of them.
//!
//! 3. When any dependency changes, the effect runs again and swaps its
//!    subscriptions for the freshly collected set.
//!
//! A change that arrives while the effect is already running (the effect
//! writes a cell it reads) is coalesced into one extra run after the current
//! one finishes, instead of recursing.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::{Notify, Source, SubscriberId};

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use switchmap_core::reactive::{Cell, Effect};
///
/// let count = Cell::new(0);
/// let seen = Arc::new(AtomicI32::new(-1));
///
/// let (reader, sink) = (count.clone(), seen.clone());
/// let _effect = Effect::new(move || sink.store(reader.get(), Ordering::SeqCst));
///
/// count.set(5);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    id: u64,
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    /// Sources read during the last run.
    sources: Mutex<Vec<Arc<dyn Source>>>,
    disposed: AtomicBool,
    running: AtomicBool,
    /// Set when a dependency changes mid-run.
    pending: AtomicBool,
    run_count: AtomicUsize,
}

/// Clears the running flag even if the effect body panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl EffectInner {
    fn execute(self: &Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        if self.running.swap(true, Ordering::SeqCst) {
            trace!(effect = self.id, "effect re-triggered while running; deferring");
            self.pending.store(true, Ordering::SeqCst);
            return;
        }
        let _running = RunningGuard(&self.running);

        loop {
            self.pending.store(false, Ordering::SeqCst);

            // Old subscriptions stay live during the run so a mid-run change
            // marks the effect pending instead of being lost.
            let sources = {
                let _ctx = ReactiveContext::enter(self.subscriber_id);
                (self.run)();
                ReactiveContext::take_sources()
            };

            self.run_count.fetch_add(1, Ordering::SeqCst);
            self.detach();
            self.attach(sources);

            if !self.pending.load(Ordering::SeqCst) || self.disposed.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    fn attach(self: &Arc<Self>, sources: Vec<Arc<dyn Source>>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let notify: Notify = Arc::new(move || {
            if let Some(effect) = weak.upgrade() {
                effect.execute();
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
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        for source in self.sources.get_mut().drain(..) {
            source.unsubscribe(self.subscriber_id);
        }
    }
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// The effect has no dependencies until the first [`Effect::execute`].
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(EffectInner {
                id: next_effect_id(),
                subscriber_id: SubscriberId::new(),
                run: Box::new(run),
                sources: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                running: AtomicBool::new(false),
                pending: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Run the effect now, re-collecting its dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// After disposal the effect will not run again and holds no
    /// subscriptions.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.detach();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies collected by the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
