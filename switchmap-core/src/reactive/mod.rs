//! Reactive Primitives
//!
//! This module implements the host reactivity the switch-map engines are
//! built on: cells, watchers, memos, and effects.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state. When a cell is read within a
//! tracking scope (a memo or effect), the scope registers a dependency on
//! it. When the cell is written, all subscribers are notified synchronously.
//!
//! ## Watchers
//!
//! [`Cell::watch`] invokes a callback with the new value whenever the cell
//! changes, optionally firing once at registration and filtering writes
//! through an [`Equality`] compare strategy.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result and recomputes
//! lazily after one of its dependencies changed.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs eagerly
//! whenever its dependencies change.
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local stack of scopes
//! ([`ReactiveContext`]). Watcher callbacks run in isolated scopes, so two
//! layers of subscriptions never collect each other's reads.

mod cell;
mod context;
mod effect;
mod memo;
mod subscriber;
mod watch;

pub use cell::Cell;
pub use context::{untracked, ReactiveContext};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use subscriber::{Notify, Source, SourceId, SubscriberId, Subscribers};
pub use watch::{Equality, WatchHandle, WatchOptions};
