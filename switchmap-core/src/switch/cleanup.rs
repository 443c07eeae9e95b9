//! Cleanup registration.
//!
//! A projection that allocates resources for its target (timers, sockets,
//! spawned tasks) registers a [`Cleanup`] through the [`CleanupRegistrar`]
//! it is handed. The engine keeps exactly one cleanup: registering again
//! replaces the previous one without running it, and the one in effect runs
//! right before the next projection or at teardown.

use std::fmt::Debug;

use parking_lot::Mutex;
use tracing::debug;

use super::generation::GenerationGuard;

/// A teardown procedure for resources allocated by one projection call.
///
/// `FnOnce` makes a double invocation unrepresentable.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// The engine-owned slot holding the active cleanup.
#[derive(Default)]
pub(crate) struct CleanupSlot {
    current: Mutex<Option<Cleanup>>,
}

impl CleanupSlot {
    /// Run and clear the active cleanup, if any.
    pub(crate) fn run(&self) {
        let pending = self.current.lock().take();
        if let Some(cleanup) = pending {
            debug!("running projection cleanup");
            cleanup.run();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.current.lock().is_some()
    }

    fn replace(&self, cleanup: Option<Cleanup>) {
        let previous = std::mem::replace(&mut *self.current.lock(), cleanup);
        drop(previous);
    }
}

/// Handed to the projection so it can register its cleanup.
///
/// Only usable for the duration of the projection call.
pub struct CleanupRegistrar<'a> {
    slot: &'a CleanupSlot,
    guard: GenerationGuard,
}

impl<'a> CleanupRegistrar<'a> {
    pub(crate) fn new(slot: &'a CleanupSlot, guard: GenerationGuard) -> Self {
        Self { slot, guard }
    }

    /// Register `f` as the cleanup for this projection, replacing any
    /// cleanup registered earlier.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.replace(Some(Cleanup::new(f)));
    }

    /// Replace the active cleanup. `None` leaves a no-op in place.
    ///
    /// If a newer source change already superseded this projection while it
    /// was running, the cleanup runs immediately instead: nothing would ever
    /// run it otherwise.
    pub fn replace(&self, cleanup: Option<Cleanup>) {
        if self.guard.is_current() {
            self.slot.replace(cleanup);
        } else if let Some(cleanup) = cleanup {
            debug!(
                generation = %self.guard.generation(),
                "cleanup registered by a superseded projection; running it now"
            );
            cleanup.run();
        }
    }
}

impl Debug for CleanupRegistrar<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistrar")
            .field("generation", &self.guard.generation())
            .field("armed", &self.slot.is_armed())
            .finish()
    }
}
