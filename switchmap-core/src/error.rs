//! Error types.
//!
//! The engines themselves are infallible: projection panics unwind to the
//! writer of the source cell. Errors only come from looking up keys in a
//! [`SwitchMapObject`](crate::SwitchMapObject).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no projected key {0}")]
    UnknownKey(String),

    #[error("projected key {0} is a plain value, not a cell")]
    NotReactive(String),

    #[error("projected key {0} is a cell, not a plain value")]
    NotPlain(String),
}

pub type Result<T> = std::result::Result<T, Error>;
