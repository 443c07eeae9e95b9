use std::fmt::Debug;

use crate::reactive::Equality;

/// Compare strategies for the two subscription layers of a switch-map.
///
/// `source` decides which source writes re-run the projection; `target`
/// decides which target writes reach the output. The default compares
/// both deeply.
pub struct SwitchMapOptions<T, U> {
    pub source: Equality<T>,
    pub target: Equality<U>,
}

impl<T, U> SwitchMapOptions<T, U> {
    pub fn new(source: Equality<T>, target: Equality<U>) -> Self {
        Self { source, target }
    }

    /// Every write on either layer counts as a change.
    pub fn shallow() -> Self {
        Self::new(Equality::shallow(), Equality::shallow())
    }
}

impl<T, U> Default for SwitchMapOptions<T, U>
where
    T: PartialEq + 'static,
    U: PartialEq + 'static,
{
    fn default() -> Self {
        Self::new(Equality::deep(), Equality::deep())
    }
}

impl<T, U> Clone for SwitchMapOptions<T, U> {
    fn clone(&self) -> Self {
        Self::new(self.source.clone(), self.target.clone())
    }
}

impl<T, U> Debug for SwitchMapOptions<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchMapOptions")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}
