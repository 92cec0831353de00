// src/pid/predictive.rs

//! # Predicted-Error Proportional Control Module
//!
//! Vision offsets arrive already lagged and roughly every 100 to 200 ms, so
//! the tracker is driven by a proportional-only controller acting on the
//! extrapolated ("future") error rather than the last observed one. There is
//! no integral term.

use super::Number;

/// Proportional controller acting on a predicted normalized error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictiveProportional<T: Number> {
    /// Proportional gain.
    pub kp: T,
}

impl<T: Number> PredictiveProportional<T> {
    /// Creates a new controller with the given gain.
    pub fn new(kp: T) -> Self {
        Self { kp }
    }

    /// Computes `clamp(-kp * future_error, -1, 1) * max_stick_magnitude`.
    ///
    /// `future_error` is a normalized image offset, so the unclamped
    /// response is already expressed as a fraction of full stick.
    pub fn output(&self, future_error: T, max_stick_magnitude: T) -> T {
        let ratio = Number::clamp(-(self.kp * future_error), -T::one(), T::one());
        ratio * max_stick_magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    /// Target below the image centre drives the stick negative.
    #[test]
    fn test_predictive_sign_and_scale() {
        let controller = PredictiveProportional::new(1.5);
        let output = controller.output(0.2, 100.0);
        assert!(value_close(-30.0, output), "Expected -1.5 * 0.2 * 100.");
    }

    /// The normalized response saturates at full magnitude.
    #[test]
    fn test_predictive_saturation() {
        let controller = PredictiveProportional::new(2.0);
        assert!(value_close(-35.0, controller.output(0.9, 35.0)));
        assert!(value_close(35.0, controller.output(-0.9, 35.0)));
    }

    /// No error, no command.
    #[test]
    fn test_predictive_zero_error() {
        let controller = PredictiveProportional::new(1.25);
        assert!(value_close(0.0, controller.output(0.0, 660.0)));
    }
}
