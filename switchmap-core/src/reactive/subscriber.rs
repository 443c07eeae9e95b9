//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that wants to hear about changes to a
//! reactive source: effects, memos, and watchers all register one. A source
//! keeps its subscribers in a [`Subscribers`] list, which doubles as the
//! source's dependency trigger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo, effect, or watcher) gets a unique ID when created.
/// The ID is how a source finds the subscription again to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a trackable source (a cell or a memo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback invoked when a source changes.
pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// Anything a tracking scope can depend on.
///
/// Cells and memos implement this so that effects and memos reading them
/// can subscribe without knowing the value type.
pub trait Source: Send + Sync {
    /// Identity used to deduplicate repeated reads in one scope.
    fn source_id(&self) -> SourceId;

    /// Register `notify` to run whenever this source changes.
    ///
    /// Subscribing again with the same ID replaces the previous callback.
    fn subscribe(&self, subscriber_id: SubscriberId, notify: Notify);

    /// Remove a subscription. Unknown IDs are ignored.
    fn unsubscribe(&self, subscriber_id: SubscriberId);
}

/// The callbacks a source fires when it changes.
#[derive(Default)]
pub struct Subscribers {
    entries: Mutex<SmallVec<[(SubscriberId, Notify); 4]>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subscriber_id: SubscriberId, notify: Notify) {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|(id, _)| *id == subscriber_id) {
            Some(entry) => entry.1 = notify,
            None => entries.push((subscriber_id, notify)),
        }
    }

    pub fn remove(&self, subscriber_id: SubscriberId) {
        // Dropped outside the lock: a callback may own handles that unsubscribe.
        let removed: SmallVec<[Notify; 1]> = {
            let mut entries = self.entries.lock();
            let mut removed = SmallVec::new();
            entries.retain(|(id, notify)| {
                if *id == subscriber_id {
                    removed.push(Arc::clone(notify));
                    false
                } else {
                    true
                }
            });
            removed
        };
        drop(removed);
    }

    /// Run every callback.
    ///
    /// The list is snapshotted first so callbacks are free to subscribe,
    /// unsubscribe, or write the source that is notifying them.
    pub fn notify(&self) {
        let snapshot: SmallVec<[Notify; 4]> = self
            .entries
            .lock()
            .iter()
            .map(|(_, notify)| Arc::clone(notify))
            .collect();

        for notify in snapshot {
            notify();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, Notify) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        (count, Arc::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn notify_calls_every_callback() {
        let subscribers = Subscribers::new();
        let (first, notify_first) = counter();
        let (second, notify_second) = counter();

        subscribers.insert(SubscriberId::new(), notify_first);
        subscribers.insert(SubscriberId::new(), notify_second);
        subscribers.notify();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn insert_with_same_id_replaces() {
        let subscribers = Subscribers::new();
        let id = SubscriberId::new();
        let (old, notify_old) = counter();
        let (new, notify_new) = counter();

        subscribers.insert(id, notify_old);
        subscribers.insert(id, notify_new);
        subscribers.notify();

        assert_eq!(subscribers.len(), 1);
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_subscriber_is_not_notified() {
        let subscribers = Subscribers::new();
        let id = SubscriberId::new();
        let (count, notify) = counter();

        subscribers.insert(id, notify);
        subscribers.remove(id);
        subscribers.notify();

        assert!(subscribers.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let subscribers = Arc::new(Subscribers::new());
        let id = SubscriberId::new();
        let weak = Arc::downgrade(&subscribers);

        subscribers.insert(id, Arc::new(move || {
            if let Some(subscribers) = weak.upgrade() {
                subscribers.remove(id);
            }
        }));

        subscribers.notify();
        assert!(subscribers.is_empty());
    }
}
