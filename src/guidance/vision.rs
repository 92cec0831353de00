// src/guidance/vision.rs

//! # Vision Tracking Guidance
//!
//! Keeps the tracked target centred: yaws toward it once it drifts out of
//! the deadband, pitches on the predicted vertical offset, and holds a
//! fixed altitude.

use super::{GuidanceInput, GuidanceLaw};
use crate::config::{AutopilotConfig, Tunables};
use crate::pid::{FeedbackController, PredictiveProportional};
use crate::stick::{StickIntent, VerticalIntent};
use std::time::Duration;

/// Yaw stick for a horizontal offset.
///
/// Zero inside the deadband. Outside, proportional to the offset with the
/// magnitude held within `[min_yaw, max_yaw]`.
pub fn deadband_yaw(offset_x: f64, deadband: f64, min_yaw: f64, max_yaw: f64) -> f64 {
    if offset_x.abs() <= deadband {
        return 0.0;
    }
    let magnitude = (offset_x.abs() * max_yaw).max(min_yaw).min(max_yaw);
    magnitude.copysign(offset_x)
}

/// Vision tracking guidance.
pub struct VisionGuidance {
    altitude: FeedbackController<f64>,
    tracking_max_age: Duration,
}

impl VisionGuidance {
    /// Creates the law from the autopilot configuration.
    pub fn with_config(config: &AutopilotConfig) -> Self {
        Self {
            altitude: FeedbackController::with_gains(config.altitude_gains),
            tracking_max_age: config.tracking_max_age,
        }
    }

    /// Accumulated altitude integral.
    pub fn altitude_integral(&self) -> f64 {
        self.altitude.integral()
    }
}

impl GuidanceLaw for VisionGuidance {
    fn control(&mut self, input: &GuidanceInput<'_>, tunables: &Tunables) -> Option<StickIntent> {
        let diff = input.tracking?;
        if diff.age(input.now) > self.tracking_max_age {
            tracing::debug!(age = ?diff.age(input.now), "tracking diff stale");
            return None;
        }

        let yaw_rate = deadband_yaw(
            diff.current.normalized_offset_x,
            tunables.yaw_deadband,
            tunables.min_yaw,
            tunables.max_yaw,
        );
        let pitch = PredictiveProportional::new(tunables.kp)
            .output(diff.future_error_y, tunables.max_stick_value);
        let vertical = input.telemetry.position.map(|p| {
            let speed = self
                .altitude
                .calculate(tunables.target_altitude, p.altitude, input.dt);
            VerticalIntent::Speed(speed)
        });

        Some(StickIntent {
            yaw_rate: Some(yaw_rate),
            pitch: Some(pitch),
            roll: None,
            vertical,
        })
    }

    fn reset(&mut self) {
        self.altitude.reset();
    }
}
