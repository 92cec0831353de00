// src/pid/feedback.rs

//! # Generic PID Feedback Module
//!
//! This module provides a compute function and control data structure
//! for a textbook PID controller, `kp*e + ki*∫e·dt + kd*(e - e_prev)/dt`
//! with `e = setpoint - measured`, plus a [`FeedbackController`] wrapper
//! that owns the `piddiy` controller and exposes `calculate` and `reset`.
//!
//! Non-positive (or NaN) time steps are treated as "no time has passed":
//! the proportional term still applies, the integral does not accumulate
//! and no derivative is produced.

use super::Number;
use piddiy::PidController;

/// Control data for the generic PID compute callback.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedbackControlData<T> {
    /// The measured value of the controlled quantity.
    pub measurement: T,
    /// The time delta since the last computation, in seconds.
    pub dt: T,
    /// Symmetric bound on the accumulated integral, if any.
    pub integral_limit: Option<T>,
}

/// Generic PID compute callback.
pub fn compute_feedback<T: Number>(
    pid: &mut PidController<T, FeedbackControlData<T>>,
    data: FeedbackControlData<T>,
) -> (T, T, T) {
    let error = pid.set_point - data.measurement;
    if !(data.dt > T::zero()) {
        return (error, pid.integral, T::zero());
    }

    let mut integral = pid.integral + error * data.dt;
    if let Some(limit) = data.integral_limit {
        integral = Number::clamp(integral, -limit, limit);
    }
    let derivative = (error - pid.error) / data.dt;

    (error, integral, derivative)
}

/// PID gains for one controlled axis.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PidGains<T> {
    /// Proportional gain.
    pub kp: T,
    /// Integral gain.
    pub ki: T,
    /// Derivative gain.
    pub kd: T,
    /// Symmetric bound on the accumulated integral, if any.
    #[serde(default)]
    pub integral_limit: Option<T>,
}

impl<T: Number> PidGains<T> {
    /// Gains with no integral limit.
    pub fn new(kp: T, ki: T, kd: T) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_limit: None,
        }
    }
}

/// Stateful PID controller for one axis.
pub struct FeedbackController<T: Number> {
    pid: PidController<T, FeedbackControlData<T>>,
    integral_limit: Option<T>,
}

impl<T: Number> FeedbackController<T> {
    /// Creates a new controller using the provided gains.
    pub fn with_gains(gains: PidGains<T>) -> Self {
        let mut pid = PidController::new();
        pid.compute_fn(compute_feedback)
            .set_point(T::zero())
            .kp(gains.kp)
            .ki(gains.ki)
            .kd(gains.kd);

        Self {
            pid,
            integral_limit: gains.integral_limit,
        }
    }

    /// Creates a new controller from raw gains.
    pub fn new(kp: T, ki: T, kd: T) -> Self {
        Self::with_gains(PidGains::new(kp, ki, kd))
    }

    /// Computes the control output for one step.
    ///
    /// - `setpoint`: The desired value.
    /// - `measured`: The current value.
    /// - `dt`: Seconds since the previous call. Non-positive values only
    ///   yield the proportional and already-accumulated integral terms.
    pub fn calculate(&mut self, setpoint: T, measured: T, dt: T) -> T {
        self.pid.set_point(setpoint);
        let data = FeedbackControlData {
            measurement: measured,
            dt,
            integral_limit: self.integral_limit,
        };
        self.pid.compute(data)
    }

    /// Zeroes the accumulated integral and the previous error.
    pub fn reset(&mut self) {
        self.pid.integral = T::zero();
        self.pid.error = T::zero();
    }

    /// Accumulated integral.
    pub fn integral(&self) -> T {
        self.pid.integral
    }

    /// Proportional gain.
    pub fn kp(&self) -> T {
        self.pid.kp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    /// Test a pure proportional response.
    #[test]
    fn test_feedback_proportional_only() {
        let mut pid = FeedbackController::new(1.0, 0.0, 0.0);
        let output = pid.calculate(10.0, 0.0, 1.0);
        assert!(value_close(10.0, output), "Output should be 10.");
    }

    /// Test that the terms sum and the integral accumulates.
    #[test]
    fn test_feedback_response() {
        let mut pid = FeedbackController::new(1.0, 1.0, 1.0);

        let output = pid.calculate(10.0, 0.0, 1.0);
        assert!(
            value_close(30.0, output),
            "Output should be the sum of terms."
        );

        // Constant error, derivative drops out.
        let output = pid.calculate(10.0, 0.0, 1.0);
        assert!(value_close(20.0, pid.integral()), "Integral should be 20.");
        assert!(value_close(30.0, output), "Output should be 10 + 20 + 0.");
    }

    /// Test that a zero time step never divides by zero.
    #[test]
    fn test_feedback_zero_dt_guard() {
        let mut pid = FeedbackController::new(2.0, 1.0, 1.0);
        let output: f64 = pid.calculate(5.0, 0.0, 0.0);
        assert!(output.is_finite(), "Output must stay finite.");
        assert!(value_close(10.0, output), "Only the proportional term.");
        assert!(value_close(0.0, pid.integral()), "Integral should not grow.");

        let output = pid.calculate(5.0, 0.0, -0.5);
        assert!(value_close(10.0, output), "Negative dt is treated as zero.");
    }

    /// Test that the integral term is clamped to the specified limit.
    #[test]
    fn test_feedback_integral_clamping() {
        let mut gains = PidGains::new(0.0, 1.0, 0.0);
        gains.integral_limit = Some(25.0);
        let mut pid = FeedbackController::with_gains(gains);

        for _ in 0..100 {
            let _ = pid.calculate(100.0, 0.0, 1.0);
        }
        assert!(value_close(25.0, pid.integral()), "Integral should be capped.");
    }

    /// Test that reset discards integral and derivative history.
    #[test]
    fn test_feedback_reset() {
        let mut pid = FeedbackController::new(1.0, 1.0, 1.0);
        let fresh = pid.calculate(4.0, 1.0, 0.5);
        let _ = pid.calculate(8.0, 1.0, 0.5);
        pid.reset();
        assert!(value_close(0.0, pid.integral()), "Integral should be zero.");

        let after_reset = pid.calculate(4.0, 1.0, 0.5);
        assert_eq!(fresh, after_reset, "Reset should restore a fresh state.");
    }

    /// Two fresh controllers fed the same sequence agree exactly.
    #[test]
    fn test_feedback_determinism() {
        let sequence = [
            (10.0, 0.0, 0.1),
            (10.0, 2.5, 0.1),
            (-3.0, 4.0, 0.2),
            (0.0, -1.0, 0.0),
            (7.5, 7.0, 0.15),
        ];
        let mut a = FeedbackController::new(0.8, 0.3, 0.05);
        let mut b = FeedbackController::new(0.8, 0.3, 0.05);
        a.reset();
        b.reset();

        for (setpoint, measured, dt) in sequence {
            assert_eq!(
                a.calculate(setpoint, measured, dt),
                b.calculate(setpoint, measured, dt)
            );
        }
    }

    /// Test the initialization of the controller with explicit gains.
    #[test]
    fn test_feedback_initialization() {
        let pid = FeedbackController::new(0.4, 0.0, 0.1);
        assert_eq!(pid.kp(), 0.4);
        assert_eq!(pid.integral(), 0.0);
    }
}
