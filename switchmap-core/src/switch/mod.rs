//! Switch-map engines.
//!
//! Both engines follow the same cycle. A source change starts a new
//! generation, drops the previous target subscriptions, runs the cleanup the
//! previous projection registered, and calls the projection again. The
//! engine then watches whatever target cells came back and mirrors them into
//! output cells it owns. Consumers only ever subscribe to those output
//! cells, so replacing targets never disturbs them.
//!
//! - [`switch_map`]: one target cell, one output cell.
//! - [`switch_map_object`]: a keyed map of target cells and plain values;
//!   one output cell per reactive key.

mod cleanup;
mod generation;
mod object;
mod options;
mod projector;
mod single;

pub use cleanup::{Cleanup, CleanupRegistrar};
pub use generation::Generation;
pub use object::{
    switch_map_object, switch_map_object_with, Projected, ProjectedMap, SwitchMapObject,
};
pub use options::SwitchMapOptions;
pub use single::{switch_map, switch_map_with, SwitchMap};

/// Introspection over a live engine, independent of its source and
/// projection types.
pub(crate) trait Engine: Send + Sync {
    fn generation(&self) -> Generation;

    /// Number of target watchers currently installed.
    fn active_subscriptions(&self) -> usize;

    fn has_cleanup(&self) -> bool;
}
