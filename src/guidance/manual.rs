// src/guidance/manual.rs

//! Operator sliders passed straight through to the composer.

use super::{GuidanceInput, GuidanceLaw};
use crate::config::Tunables;
use crate::stick::{StickIntent, VerticalIntent};
use serde::{Deserialize, Serialize};

/// Slider positions, in stick units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualSticks {
    /// Yaw slider.
    pub yaw: f64,
    /// Pitch slider.
    pub pitch: f64,
    /// Roll slider.
    pub roll: f64,
    /// Throttle slider.
    pub throttle: f64,
}

/// Manual guidance.
#[derive(Debug, Default)]
pub struct ManualGuidance {
    sticks: ManualSticks,
}

impl ManualGuidance {
    /// Replaces the slider positions.
    pub fn set(&mut self, sticks: ManualSticks) {
        self.sticks = sticks;
    }

    /// Current slider positions.
    pub fn sticks(&self) -> ManualSticks {
        self.sticks
    }
}

impl GuidanceLaw for ManualGuidance {
    fn control(&mut self, _input: &GuidanceInput<'_>, _tunables: &Tunables) -> Option<StickIntent> {
        Some(StickIntent {
            yaw_rate: Some(self.sticks.yaw),
            pitch: Some(self.sticks.pitch),
            roll: Some(self.sticks.roll),
            vertical: Some(VerticalIntent::Stick(self.sticks.throttle)),
        })
    }

    fn reset(&mut self) {
        self.sticks = ManualSticks::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetrySnapshot;
    use tokio::time::Instant;

    #[test]
    fn test_passthrough_and_reset() {
        let mut law = ManualGuidance::default();
        law.set(ManualSticks {
            yaw: 15.0,
            pitch: -20.0,
            roll: 5.0,
            throttle: 100.0,
        });

        let snapshot = TelemetrySnapshot::default();
        let input = GuidanceInput {
            telemetry: &snapshot,
            tracking: None,
            route: None,
            dt: 0.1,
            now: Instant::now(),
        };
        let intent = law.control(&input, &Tunables::default()).expect("intent");
        assert_eq!(intent.pitch, Some(-20.0));
        assert_eq!(intent.vertical, Some(VerticalIntent::Stick(100.0)));

        law.reset();
        assert_eq!(law.sticks(), ManualSticks::default());
    }
}
