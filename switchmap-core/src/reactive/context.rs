//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read, the
//! innermost tracking scope records it as a dependency.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a computation (an effect run or a
//! memo recompute) pushes an entry owned by that computation's subscriber.
//! Watcher callbacks push an *isolated* entry instead: reads inside it are
//! swallowed, so a callback never leaks dependencies into whatever outer
//! computation happened to trigger the write it is reacting to.

use std::cell::RefCell;
use std::sync::Arc;

use super::subscriber::{Source, SourceId, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// Owner of the scope, `None` for an isolated scope.
    subscriber_id: Option<SubscriberId>,
    /// Sources read in this scope, deduplicated.
    sources: Vec<Arc<dyn Source>>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new tracking scope for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a scope in which reads are not tracked by anyone.
    pub fn isolate() -> Self {
        Self::push(None)
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                sources: Vec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the subscriber owning the innermost scope, if it tracks.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack.borrow().last().and_then(|entry| entry.subscriber_id)
        })
    }

    /// Record a dependency on the given source.
    ///
    /// Called by cells and memos when they are read.
    pub fn track(source: Arc<dyn Source>) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let Some(entry) = stack.last_mut() else {
                return;
            };
            if entry.subscriber_id.is_none() {
                return;
            }
            let id = source.source_id();
            if !entry.sources.iter().any(|s| s.source_id() == id) {
                entry.sources.push(source);
            }
        });
    }

    /// IDs of the sources read so far in the innermost scope.
    pub fn tracked_ids() -> Vec<SourceId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.sources.iter().map(|s| s.source_id()).collect())
                .unwrap_or_default()
        })
    }

    /// Take the sources collected in the innermost scope.
    pub fn take_sources() -> Vec<Arc<dyn Source>> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.sources))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // Sources are dropped after the stack borrow is released.
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.subscriber_id, self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id, entry.subscriber_id
            );
        }
    }
}

/// Run `f` with dependency tracking switched off.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _scope = ReactiveContext::isolate();
    f()
}
