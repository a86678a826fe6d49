//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl Interval<f64> {
    /// Linearly interpolates from `min` (at 0) to `max` (at 1).
    /// The bounds need not be ordered.
    pub fn lerp(&self, t: f64) -> f64 {
        self.min + t * (self.max - self.min)
    }

    /// The inverse of [lerp](Self::lerp).
    pub fn inv_lerp(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Clamps a value to the unit interval.
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
