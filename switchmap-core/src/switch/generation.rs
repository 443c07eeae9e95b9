//! Generations of target subscriptions.
//!
//! Every source change starts a new generation. The generation owns the
//! watch handles on that cycle's target cells; advancing hands back the
//! previous generation's handles so the caller drops them, and every target
//! callback carries a [`GenerationGuard`] so a notification that still
//! reaches a superseded callback is ignored instead of reaching the output.
//!
//! Advancing and guarded writes share a reentrant gate: a target written from
//! another thread either lands before the next generation starts or not at
//! all. The same thread may re-enter, so a guarded write whose subscribers
//! change the source still advances.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use smallvec::SmallVec;

use crate::reactive::WatchHandle;

/// Identifies one source-change cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Watch handles owned by one generation.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    handles: SmallVec<[WatchHandle; 4]>,
}

impl Subscriptions {
    pub(crate) fn new(handles: SmallVec<[WatchHandle; 4]>) -> Self {
        Self { handles }
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Cheap check for whether a generation is still the current one.
#[derive(Debug, Clone)]
pub(crate) struct GenerationGuard {
    counter: Arc<AtomicU64>,
    gate: Arc<ReentrantMutex<()>>,
    generation: Generation,
}

impl GenerationGuard {
    pub(crate) fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation.0
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    /// Run `f` only if this generation is still current, holding the gate so
    /// no other thread can advance in between. Returns whether `f` ran.
    pub(crate) fn run_if_current(&self, f: impl FnOnce()) -> bool {
        let _gate = self.gate.lock();
        if !self.is_current() {
            return false;
        }
        f();
        true
    }
}

pub(crate) struct Generations {
    counter: Arc<AtomicU64>,
    gate: Arc<ReentrantMutex<()>>,
    active: Mutex<Subscriptions>,
}

impl Generations {
    pub(crate) fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(ReentrantMutex::new(())),
            active: Mutex::new(Subscriptions::default()),
        }
    }

    pub(crate) fn current(&self) -> Generation {
        Generation(self.counter.load(Ordering::SeqCst))
    }

    /// Start a new generation, returning it together with the superseded
    /// subscriptions. Dropping those unsubscribes them.
    pub(crate) fn advance(&self) -> (Generation, Subscriptions) {
        let generation = {
            let _gate = self.gate.lock();
            Generation(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        };
        let superseded = std::mem::take(&mut *self.active.lock());
        (generation, superseded)
    }

    pub(crate) fn guard(&self, generation: Generation) -> GenerationGuard {
        GenerationGuard {
            counter: Arc::clone(&self.counter),
            gate: Arc::clone(&self.gate),
            generation,
        }
    }

    /// Make `subscriptions` the active set if `generation` is still current.
    ///
    /// Returns false, and drops the subscriptions, if a newer generation
    /// started in the meantime.
    pub(crate) fn install(&self, generation: Generation, subscriptions: Subscriptions) -> bool {
        let rejected = {
            let mut active = self.active.lock();
            if self.current() == generation {
                *active = subscriptions;
                None
            } else {
                Some(subscriptions)
            }
        };

        let installed = rejected.is_none();
        drop(rejected);
        installed
    }

    /// Take the active subscriptions for good. Used at teardown.
    pub(crate) fn take(&self) -> Subscriptions {
        std::mem::take(&mut *self.active.lock())
    }

    pub(crate) fn active_len(&self) -> usize {
        self.active.lock().len()
    }
}
