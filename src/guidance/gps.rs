// src/guidance/gps.rs

//! # GPS Waypoint Guidance
//!
//! Turns toward the destination bearing with a yaw PID on heading error,
//! moves forward with a PID on remaining distance once the nose points
//! close enough, and climbs to cruise altitude on a fixed speed profile.

use super::{GuidanceInput, GuidanceLaw};
use crate::config::{AutopilotConfig, Tunables};
use crate::pid::FeedbackController;
use crate::route::{bearing, haversine_distance, heading_difference, RoutePoint};
use crate::stick::{StickIntent, VerticalIntent};

/// Climb stick for the given altitude on the way to `cruise_altitude`.
///
/// Gentle near the ground, full `altitude_speed` through the middle, half
/// speed over the last fifth and nothing once there.
pub fn climb_profile(altitude: f64, cruise_altitude: f64, altitude_speed: f64) -> f64 {
    if !(cruise_altitude > 0.0) {
        return 0.0;
    }
    let ratio = altitude / cruise_altitude;
    if ratio >= 1.0 {
        0.0
    } else if ratio < 0.2 {
        altitude_speed * 0.3
    } else if ratio < 0.8 {
        altitude_speed
    } else {
        altitude_speed * 0.5
    }
}

/// GPS waypoint guidance.
pub struct GpsGuidance {
    yaw: FeedbackController<f64>,
    forward: FeedbackController<f64>,
    heading_tolerance_deg: f64,
    cruise_altitude: f64,
}

impl GpsGuidance {
    /// Creates the law from the autopilot configuration.
    pub fn with_config(config: &AutopilotConfig) -> Self {
        Self {
            yaw: FeedbackController::with_gains(config.yaw_gains),
            forward: FeedbackController::with_gains(config.forward_gains),
            heading_tolerance_deg: config.heading_tolerance_deg,
            cruise_altitude: config.cruise_altitude,
        }
    }
}

impl GuidanceLaw for GpsGuidance {
    fn control(&mut self, input: &GuidanceInput<'_>, tunables: &Tunables) -> Option<StickIntent> {
        let route = input.route?;
        let telemetry = input.telemetry;
        let heading = telemetry
            .compass_heading
            .or_else(|| telemetry.attitude.map(|a| a.yaw))?;
        let position = telemetry
            .position
            .map(|p| RoutePoint::new(p.latitude, p.longitude))
            .unwrap_or(route.current);

        let heading_error = heading_difference(bearing(position, route.destination), heading);
        let yaw_rate = self.yaw.calculate(heading_error, 0.0, input.dt);

        let pitch = if heading_error.abs() <= self.heading_tolerance_deg {
            let distance = haversine_distance(position, route.destination);
            self.forward.calculate(distance, 0.0, input.dt)
        } else {
            self.forward.reset();
            0.0
        };

        let climb = telemetry
            .position
            .map(|p| climb_profile(p.altitude, self.cruise_altitude, tunables.altitude_speed))
            .unwrap_or(0.0);

        Some(StickIntent {
            yaw_rate: Some(yaw_rate),
            pitch: Some(pitch),
            roll: None,
            vertical: Some(VerticalIntent::Stick(climb)),
        })
    }

    fn reset(&mut self) {
        self.yaw.reset();
        self.forward.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::PidGains;
    use crate::route::RouteUpdate;
    use crate::telemetry::{Position3D, TelemetrySnapshot};
    use crate::test_utils::*;
    use tokio::time::Instant;

    fn law() -> GpsGuidance {
        let mut config = AutopilotConfig::new();
        config.yaw_gains = PidGains::new(2.0, 0.0, 0.0);
        config.forward_gains = PidGains::new(1.0, 0.0, 0.0);
        GpsGuidance::with_config(&config)
    }

    fn telemetry(heading: f64, altitude: f64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            position: Some(Position3D {
                latitude: 37.5,
                longitude: 127.0,
                altitude,
            }),
            compass_heading: Some(heading),
            ..Default::default()
        }
    }

    fn route(destination: RoutePoint) -> Option<RouteUpdate> {
        Some(RouteUpdate {
            current: RoutePoint::new(37.5, 127.0),
            destination,
            received_at: Instant::now(),
        })
    }

    #[test]
    fn test_climb_profile() {
        assert!(value_close(9.0, climb_profile(0.5, 3.2, 30.0)));
        assert!(value_close(30.0, climb_profile(1.6, 3.2, 30.0)));
        assert!(value_close(15.0, climb_profile(3.0, 3.2, 30.0)));
        assert!(value_close(0.0, climb_profile(3.2, 3.2, 30.0)));
        assert!(value_close(0.0, climb_profile(1.0, 0.0, 30.0)));
    }

    #[test]
    fn test_turns_before_moving() {
        let mut law = law();
        let snapshot = telemetry(0.0, 3.2);
        // Destination due east, nose north.
        let input = GuidanceInput {
            telemetry: &snapshot,
            tracking: None,
            route: route(RoutePoint::new(37.5, 127.001)),
            dt: 0.1,
            now: Instant::now(),
        };
        let intent = law.control(&input, &Tunables::default()).expect("intent");
        let yaw = intent.yaw_rate.expect("yaw");
        assert!(yaw > 170.0, "turn right toward east, got {yaw}");
        assert_eq!(intent.pitch, Some(0.0));
        assert_eq!(intent.vertical, Some(VerticalIntent::Stick(0.0)));
    }

    #[test]
    fn test_moves_forward_when_aligned() {
        let mut law = law();
        let snapshot = telemetry(0.0, 0.1);
        // Destination due north, nose north.
        let input = GuidanceInput {
            telemetry: &snapshot,
            tracking: None,
            route: route(RoutePoint::new(37.5001, 127.0)),
            dt: 0.1,
            now: Instant::now(),
        };
        let intent = law.control(&input, &Tunables::default()).expect("intent");
        let pitch = intent.pitch.expect("pitch");
        assert!((pitch - 11.12).abs() < 0.05, "about 11 m to go, got {pitch}");
        assert!(intent.yaw_rate.expect("yaw").abs() < 1e-6);
        match intent.vertical {
            Some(VerticalIntent::Stick(climb)) => assert!(value_close(9.0, climb)),
            other => panic!("unexpected vertical intent {other:?}"),
        }
    }

    #[test]
    fn test_needs_route_and_heading() {
        let mut law = law();
        let snapshot = TelemetrySnapshot::default();
        let input = GuidanceInput {
            telemetry: &snapshot,
            tracking: None,
            route: route(RoutePoint::new(37.5, 127.0)),
            dt: 0.1,
            now: Instant::now(),
        };
        assert!(law.control(&input, &Tunables::default()).is_none());

        let snapshot = telemetry(0.0, 1.0);
        let input = GuidanceInput {
            telemetry: &snapshot,
            route: None,
            ..input
        };
        assert!(law.control(&input, &Tunables::default()).is_none());
    }
}
