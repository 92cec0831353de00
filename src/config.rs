// src/config.rs

//! Autopilot configuration.
//!
//! Everything has a default matching the field-tested values, so a config
//! file only needs the keys it overrides.

use crate::arrival::{ARRIVAL_DWELL, ARRIVAL_THRESHOLD_DEG};
use crate::pid::PidGains;
use crate::safety::DEFAULT_VELOCITY_LIMIT;
use crate::stick::{StickLimits, MAX_STICK};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operator-adjustable guidance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Gain of the vision forward controller.
    pub kp: f64,
    /// Largest yaw stick deflection.
    pub max_yaw: f64,
    /// Smallest yaw deflection applied outside the deadband.
    pub min_yaw: f64,
    /// Largest pitch stick deflection.
    pub max_stick_value: f64,
    /// Climb stick used by GPS guidance on its way to cruise altitude.
    pub altitude_speed: f64,
    /// Horizontal offset below which vision guidance does not yaw.
    pub yaw_deadband: f64,
    /// Altitude held by vision guidance, metres.
    pub target_altitude: f64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            kp: 1.5,
            max_yaw: 220.0,
            min_yaw: 10.0,
            max_stick_value: 35.0,
            altitude_speed: 30.0,
            yaw_deadband: 0.2,
            target_altitude: 1.8,
        }
    }
}

impl Tunables {
    /// A copy with every value forced into its legal range. Non-finite
    /// values fall back to the defaults.
    pub fn validated(self) -> Self {
        let defaults = Self::default();
        let max = MAX_STICK as f64;
        let finite = |value: f64, fallback: f64| if value.is_finite() { value } else { fallback };

        let max_yaw = finite(self.max_yaw, defaults.max_yaw).clamp(0.0, max);
        Self {
            kp: finite(self.kp, defaults.kp).max(0.0),
            max_yaw,
            min_yaw: finite(self.min_yaw, defaults.min_yaw).clamp(0.0, max_yaw),
            max_stick_value: finite(self.max_stick_value, defaults.max_stick_value)
                .clamp(0.0, max),
            altitude_speed: finite(self.altitude_speed, defaults.altitude_speed)
                .clamp(0.0, max),
            yaw_deadband: finite(self.yaw_deadband, defaults.yaw_deadband).clamp(0.0, 1.0),
            target_altitude: finite(self.target_altitude, defaults.target_altitude).max(0.0),
        }
    }

    /// Stick limits implied by these tunables.
    pub fn stick_limits(&self) -> StickLimits {
        StickLimits {
            max_yaw: self.max_yaw,
            max_stick_value: self.max_stick_value,
        }
    }
}

/// Full autopilot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    /// Control loop period.
    #[serde(with = "millis")]
    pub period: Duration,
    /// Oldest telemetry a tick will act on.
    #[serde(with = "millis")]
    pub telemetry_max_age: Duration,
    /// Oldest tracking diff vision guidance will act on.
    #[serde(with = "millis")]
    pub tracking_max_age: Duration,
    /// Per-axis velocity that trips the safety watchdog, m/s.
    pub safety_velocity_limit: f64,
    /// Per-axis arrival threshold, degrees.
    pub arrival_threshold_deg: f64,
    /// Dwell inside the threshold before returning home.
    #[serde(with = "millis")]
    pub arrival_dwell: Duration,
    /// Altitude GPS guidance climbs to, metres.
    pub cruise_altitude: f64,
    /// Heading error inside which GPS guidance moves forward, degrees.
    pub heading_tolerance_deg: f64,
    /// Attempts at an operator landing before giving up. Forced landings
    /// get one.
    pub landing_attempts: u32,
    /// Pause between operator landing attempts.
    #[serde(with = "millis")]
    pub landing_retry_delay: Duration,
    /// Yaw gains, on heading error in degrees.
    pub yaw_gains: PidGains<f64>,
    /// Forward gains, on distance in metres.
    pub forward_gains: PidGains<f64>,
    /// Altitude gains, on altitude error in metres.
    pub altitude_gains: PidGains<f64>,
    /// Initial tunables.
    pub tunables: Tunables,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AutopilotConfig {
    /// The default configuration.
    pub fn new() -> Self {
        Self {
            period: Duration::from_millis(100),
            telemetry_max_age: Duration::from_millis(1000),
            tracking_max_age: Duration::from_millis(500),
            safety_velocity_limit: DEFAULT_VELOCITY_LIMIT,
            arrival_threshold_deg: ARRIVAL_THRESHOLD_DEG,
            arrival_dwell: ARRIVAL_DWELL,
            cruise_altitude: 3.2,
            heading_tolerance_deg: 10.0,
            landing_attempts: 3,
            landing_retry_delay: Duration::from_secs(2),
            yaw_gains: PidGains::new(3.0, 0.0, 0.2),
            forward_gains: PidGains {
                kp: 4.0,
                ki: 0.1,
                kd: 0.5,
                integral_limit: Some(50.0),
            },
            altitude_gains: PidGains {
                kp: 0.8,
                ki: 0.05,
                kd: 0.1,
                integral_limit: Some(5.0),
            },
            tunables: Tunables::default(),
        }
    }

    /// Loads a configuration from JSON; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(json)?;
        config.tunables = config.tunables.validated();
        if config.period.is_zero() {
            config.period = Self::new().period;
        }
        Ok(config)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
