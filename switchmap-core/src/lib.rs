//! Switchmap Core
//!
//! A switch-map combinator over reactive cells. A source cell's value picks a
//! target cell through a projection; the combinator exposes an output cell
//! that always mirrors the current target, and switches targets whenever the
//! source changes.
//!
//! The crate provides:
//!
//! - Reactive primitives (cells, watchers, memos, effects) with automatic
//!   dependency tracking
//! - The single-output switch-map and its multi-output object variant
//! - Cleanup registration for resources a projection allocates
//!
//! # Architecture
//!
//! - `reactive`: cells, tracking context, watchers, memos and effects
//! - `switch`: the switch-map engines, their options and cleanup protocol
//!
//! # Example
//!
//! ```rust
//! use switchmap_core::{switch_map, Cell, Effect};
//!
//! let user_id = Cell::new(1u32);
//! let name = switch_map(&user_id, |id, _cleanup| Cell::new(format!("user-{id}")));
//!
//! let output = name.cell().clone();
//! let _log = Effect::new(move || {
//!     println!("now showing {}", output.get());
//! });
//!
//! user_id.set(2);
//! assert_eq!(name.get(), "user-2");
//! ```

pub mod reactive;
pub mod switch;

mod error;

pub use error::{Error, Result};
pub use reactive::{untracked, Cell, Effect, Equality, Memo, WatchHandle, WatchOptions};
pub use switch::{
    switch_map, switch_map_object, switch_map_object_with, switch_map_with, Cleanup,
    CleanupRegistrar, Generation, Projected, ProjectedMap, SwitchMap, SwitchMapObject,
    SwitchMapOptions,
};
