// src/pid.rs

//! # Feedback Control Module
//!
//! This module provides the compute callbacks and control data structures
//! used by the guidance laws. The generic PID is a `piddiy` controller
//! driven by [`compute_feedback`], and the vision tracker uses the
//! proportional-only [`PredictiveProportional`] controller.

use piddiy::Number as PiddiyNumber;

pub mod feedback;
pub use feedback::*;
pub mod predictive;
pub use predictive::*;

/// Custom trait to encapsulate base number requirements.
pub trait Number: PiddiyNumber {
    /// Clamps generic PartialOrd values within a given range.
    fn clamp(self, min: Self, max: Self) -> Self {
        if self < min {
            min
        } else if max < self {
            max
        } else {
            self
        }
    }
}

impl<T: PiddiyNumber> Number for T {}
