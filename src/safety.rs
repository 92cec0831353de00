// src/safety.rs

//! Velocity envelope watchdog.
//!
//! While the autopilot is commanding near-hover sticks any velocity axis
//! at or above the limit means something is off, and the aircraft is put
//! down. The check is local and synchronous; it runs once per tick.

use crate::phase::FlightPhase;
use crate::telemetry::TelemetrySnapshot;

/// Default per-axis velocity limit in m/s.
pub const DEFAULT_VELOCITY_LIMIT: f64 = 1.0;

/// What the watchdog wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyAction {
    /// Centre the sticks and land.
    ForceLanding,
}

/// Trips once per flight when velocity leaves the envelope.
#[derive(Debug, Clone)]
pub struct SafetyWatchdog {
    velocity_limit: f64,
    tripped: bool,
}

impl Default for SafetyWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_VELOCITY_LIMIT)
    }
}

impl SafetyWatchdog {
    /// A watchdog with the given per-axis limit.
    pub fn new(velocity_limit: f64) -> Self {
        Self {
            velocity_limit,
            tripped: false,
        }
    }

    /// Checks one snapshot. Only `AutoFollowing` is monitored, and after a
    /// trip the watchdog stays quiet until [`rearm`](Self::rearm)ed.
    pub fn check(&mut self, phase: FlightPhase, telemetry: &TelemetrySnapshot) -> Option<SafetyAction> {
        if self.tripped || phase != FlightPhase::AutoFollowing {
            return None;
        }
        let velocity = telemetry.velocity?;
        if velocity.max_component() < self.velocity_limit {
            return None;
        }

        self.tripped = true;
        tracing::warn!(
            vx = velocity.x,
            vy = velocity.y,
            vz = velocity.z,
            limit = self.velocity_limit,
            "velocity envelope exceeded, forcing landing"
        );
        Some(SafetyAction::ForceLanding)
    }

    /// Whether the watchdog has tripped since the last rearm.
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Clears the trip latch.
    pub fn rearm(&mut self) {
        self.tripped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Velocity3D;

    fn moving(x: f64, y: f64, z: f64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            velocity: Some(Velocity3D { x, y, z }),
            ..Default::default()
        }
    }

    #[test]
    fn test_trip_then_quiet_while_landing() {
        let mut watchdog = SafetyWatchdog::default();
        assert_eq!(
            watchdog.check(FlightPhase::AutoFollowing, &moving(1.2, 0.0, 0.0)),
            Some(SafetyAction::ForceLanding)
        );
        assert_eq!(
            watchdog.check(FlightPhase::Landing, &moving(0.1, 0.0, 0.0)),
            None
        );
    }

    #[test]
    fn test_repeated_trips_are_latched() {
        let mut watchdog = SafetyWatchdog::default();
        let fast = moving(0.0, -3.0, 0.0);
        assert!(watchdog.check(FlightPhase::AutoFollowing, &fast).is_some());
        for _ in 0..10 {
            assert!(watchdog.check(FlightPhase::AutoFollowing, &fast).is_none());
            assert!(watchdog.check(FlightPhase::Landing, &fast).is_none());
        }

        watchdog.rearm();
        assert!(watchdog.check(FlightPhase::AutoFollowing, &fast).is_some());
    }

    #[test]
    fn test_limit_is_inclusive_and_phase_scoped() {
        let mut watchdog = SafetyWatchdog::default();
        assert!(watchdog
            .check(FlightPhase::Cruising, &moving(0.0, 0.0, 5.0))
            .is_none());
        assert!(watchdog
            .check(FlightPhase::AutoFollowing, &moving(0.99, -0.99, 0.5))
            .is_none());
        assert!(watchdog
            .check(FlightPhase::AutoFollowing, &TelemetrySnapshot::default())
            .is_none());
        assert!(watchdog
            .check(FlightPhase::AutoFollowing, &moving(0.0, 0.0, -1.0))
            .is_some());
    }
}
