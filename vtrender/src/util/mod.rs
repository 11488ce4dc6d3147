//! Utils which are used internally

use std::ops::{Deref, DerefMut};

pub mod math;

/// Comparison with a tolerance, for values which jitter between frames.
pub trait Tolerance {
    type Epsilon: Copy;

    /// Whether `self` and `other` are further apart than `epsilon`.
    fn differs(&self, other: &Self, epsilon: Self::Epsilon) -> bool;
}

/// A value together with the copy it had when it was last acknowledged.
///
/// Writes go through [`DerefMut`]. [`ChangeObserver::did_change`] compares against the
/// acknowledged copy and reports a change until [`ChangeObserver::update_reference`] is called.
/// A value which was never acknowledged always counts as changed.
#[derive(Debug, Clone, Default)]
pub struct ChangeObserver<T> {
    current: T,
    acknowledged: Option<T>,
}

impl<T: Clone + Tolerance> ChangeObserver<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: value,
            acknowledged: None,
        }
    }

    pub fn update_reference(&mut self) {
        self.acknowledged = Some(self.current.clone());
    }

    pub fn did_change(&self, epsilon: T::Epsilon) -> bool {
        self.acknowledged
            .as_ref()
            .map_or(true, |acknowledged| acknowledged.differs(&self.current, epsilon))
    }

    /// Forgets the acknowledged copy, the next [`ChangeObserver::did_change`] reports a change.
    pub fn invalidate(&mut self) {
        self.acknowledged = None;
    }
}

impl<T> Deref for ChangeObserver<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.current
    }
}

impl<T> DerefMut for ChangeObserver<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.current
    }
}
