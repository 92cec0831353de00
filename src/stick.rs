// src/stick.rs

//! # Stick Composition
//!
//! Turns control intents into the four stick axes the virtual stick API
//! accepts and forwards them through the [`VirtualStickSession`].
//!
//! | stick | vertical             | horizontal        |
//! |-------|----------------------|-------------------|
//! | left  | throttle / climb     | yaw rate          |
//! | right | pitch / forward      | roll / lateral    |
//!
//! Every axis the composer emits lies in `[-MAX_STICK, MAX_STICK]`.

use crate::session::{AuthorityState, VirtualStickSession};
use serde::{Deserialize, Serialize};

/// Full stick deflection.
pub const MAX_STICK: i32 = 660;

/// Vertical speed in m/s that corresponds to full throttle deflection.
pub const MAX_ASCENT_SPEED: f64 = 4.0;

/// One stick, both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StickPosition {
    /// Up/down deflection.
    pub vertical: i32,
    /// Left/right deflection.
    pub horizontal: i32,
}

impl StickPosition {
    /// A position with both axes clamped into range.
    pub fn new(vertical: i32, horizontal: i32) -> Self {
        Self {
            vertical: vertical.clamp(-MAX_STICK, MAX_STICK),
            horizontal: horizontal.clamp(-MAX_STICK, MAX_STICK),
        }
    }

    fn within_limits(&self) -> bool {
        self.vertical.abs() <= MAX_STICK && self.horizontal.abs() <= MAX_STICK
    }
}

/// Both sticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Controls {
    /// Throttle (vertical) and yaw (horizontal).
    pub left: StickPosition,
    /// Pitch (vertical) and roll (horizontal).
    pub right: StickPosition,
}

impl Controls {
    /// All axes centred.
    pub const NEUTRAL: Controls = Controls {
        left: StickPosition {
            vertical: 0,
            horizontal: 0,
        },
        right: StickPosition {
            vertical: 0,
            horizontal: 0,
        },
    };

    /// Whether every axis lies in `[-MAX_STICK, MAX_STICK]`.
    pub fn within_limits(&self) -> bool {
        self.left.within_limits() && self.right.within_limits()
    }
}

/// How the throttle axis is specified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerticalIntent {
    /// Raw stick deflection, e.g. from a manual slider.
    Stick(f64),
    /// Vertical speed in m/s, mapped linearly onto the stick.
    Speed(f64),
}

/// What the guidance law wants the aircraft to do this tick. Missing axes
/// are centred.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StickIntent {
    /// Yaw rate, in stick units.
    pub yaw_rate: Option<f64>,
    /// Forward pitch, in stick units.
    pub pitch: Option<f64>,
    /// Lateral roll, in stick units.
    pub roll: Option<f64>,
    /// Throttle.
    pub vertical: Option<VerticalIntent>,
}

/// Runtime limits applied on top of `MAX_STICK`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickLimits {
    /// Largest yaw deflection.
    pub max_yaw: f64,
    /// Largest pitch deflection.
    pub max_stick_value: f64,
}

impl Default for StickLimits {
    fn default() -> Self {
        Self {
            max_yaw: MAX_STICK as f64,
            max_stick_value: MAX_STICK as f64,
        }
    }
}

/// Result of handing a frame to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The frame reached the actuator.
    Forwarded,
    /// Authority was not held; the frame was dropped.
    Rejected(AuthorityState),
}

/// Maps a vertical speed onto the throttle stick.
pub fn speed_to_stick(speed_mps: f64) -> i32 {
    to_axis(speed_mps * MAX_STICK as f64 / MAX_ASCENT_SPEED, MAX_STICK as f64)
}

fn to_axis(value: f64, limit: f64) -> i32 {
    if value.is_nan() || limit.is_nan() {
        return 0;
    }
    let limit = limit.clamp(0.0, MAX_STICK as f64);
    value.clamp(-limit, limit).round() as i32
}

/// Composes and forwards stick frames.
#[derive(Debug, Default)]
pub struct StickComposer {
    limits: StickLimits,
    last: Controls,
}

impl StickComposer {
    /// A composer with the given limits.
    pub fn new(limits: StickLimits) -> Self {
        Self {
            limits,
            last: Controls::NEUTRAL,
        }
    }

    /// Replaces the runtime limits.
    pub fn set_limits(&mut self, limits: StickLimits) {
        self.limits = limits;
    }

    /// The last composed frame.
    pub fn last(&self) -> Controls {
        self.last
    }

    /// Builds a frame from an intent and remembers it.
    pub fn compose(&mut self, intent: StickIntent) -> Controls {
        let throttle = match intent.vertical {
            Some(VerticalIntent::Stick(value)) => to_axis(value, MAX_STICK as f64),
            Some(VerticalIntent::Speed(speed)) => speed_to_stick(speed),
            None => 0,
        };
        let controls = Controls {
            left: StickPosition {
                vertical: throttle,
                horizontal: to_axis(intent.yaw_rate.unwrap_or(0.0), self.limits.max_yaw),
            },
            right: StickPosition {
                vertical: to_axis(intent.pitch.unwrap_or(0.0), self.limits.max_stick_value),
                horizontal: to_axis(intent.roll.unwrap_or(0.0), MAX_STICK as f64),
            },
        };
        self.last = controls;
        controls
    }

    /// Forwards a frame if the session holds authority, checked atomically
    /// with the write.
    pub fn submit(&mut self, controls: Controls, session: &VirtualStickSession) -> WriteOutcome {
        let forwarded = session.with_authority(|actuator| {
            tracing::debug!(?controls, "stick write");
            actuator.write_sticks(controls);
        });
        if forwarded {
            WriteOutcome::Forwarded
        } else {
            let state = session.state();
            tracing::debug!(?controls, ?state, "stick write rejected");
            WriteOutcome::Rejected(state)
        }
    }

    /// Composes and forwards in one step.
    pub fn write(&mut self, intent: StickIntent, session: &VirtualStickSession) -> WriteOutcome {
        let controls = self.compose(intent);
        self.submit(controls, session)
    }

    /// Centres every axis.
    pub fn zero(&mut self, session: &VirtualStickSession) -> WriteOutcome {
        self.last = Controls::NEUTRAL;
        self.submit(Controls::NEUTRAL, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::{AuthorityChangeReason, AuthorityOwner};
    use crate::test_utils::*;
    use std::sync::Arc;

    const EXTREMES: [f64; 9] = [
        f64::NEG_INFINITY,
        -1.0e9,
        -661.0,
        -35.5,
        0.0,
        12.4,
        659.6,
        1.0e12,
        f64::NAN,
    ];

    #[test]
    fn test_compose_always_within_limits() {
        let mut composer = StickComposer::new(StickLimits {
            max_yaw: 220.0,
            max_stick_value: 35.0,
        });

        for yaw in EXTREMES {
            for pitch in EXTREMES {
                for vertical in EXTREMES {
                    let verticals = [
                        VerticalIntent::Stick(vertical),
                        VerticalIntent::Speed(vertical),
                    ];
                    for intent_vertical in verticals {
                        let controls = composer.compose(StickIntent {
                            yaw_rate: Some(yaw),
                            pitch: Some(pitch),
                            roll: Some(-yaw),
                            vertical: Some(intent_vertical),
                        });
                        assert!(controls.within_limits(), "{controls:?}");
                        assert!(controls.left.horizontal.abs() <= 220);
                        assert!(controls.right.vertical.abs() <= 35);
                    }
                }
            }
        }
    }

    #[test]
    fn test_limits_above_max_stick_are_capped() {
        let mut composer = StickComposer::new(StickLimits {
            max_yaw: 5000.0,
            max_stick_value: -3.0,
        });
        let controls = composer.compose(StickIntent {
            yaw_rate: Some(1000.0),
            pitch: Some(100.0),
            ..Default::default()
        });
        assert_eq!(controls.left.horizontal, MAX_STICK);
        assert_eq!(controls.right.vertical, 0);
    }

    #[test]
    fn test_speed_to_stick_mapping() {
        assert_eq!(speed_to_stick(0.0), 0);
        assert_eq!(speed_to_stick(MAX_ASCENT_SPEED / 2.0), 330);
        assert_eq!(speed_to_stick(-MAX_ASCENT_SPEED), -MAX_STICK);
        assert_eq!(speed_to_stick(100.0), MAX_STICK);
        assert_eq!(speed_to_stick(f64::NAN), 0);
    }

    #[test]
    fn test_missing_axes_are_centred() {
        let mut composer = StickComposer::default();
        let controls = composer.compose(StickIntent {
            yaw_rate: Some(40.0),
            ..Default::default()
        });
        assert_eq!(
            controls,
            Controls {
                left: StickPosition::new(0, 40),
                right: StickPosition::default(),
            }
        );
        assert_eq!(composer.last(), controls);
    }

    #[tokio::test]
    async fn test_writes_gated_by_authority() {
        let actuator = Arc::new(MockActuator::default());
        let session = VirtualStickSession::new(actuator.clone());
        let mut composer = StickComposer::default();
        let intent = StickIntent {
            pitch: Some(20.0),
            ..Default::default()
        };

        let mut expected = 0;
        for step in 0..12 {
            match step {
                3 => session.enable().await.expect("enable"),
                6 => {
                    session.on_authority_changed(
                        AuthorityOwner::RemoteController,
                        AuthorityChangeReason::RemoteControllerOverride,
                    );
                }
                8 => session.enable().await.expect("re-enable"),
                10 => session.disable().await.expect("disable"),
                _ => {}
            }

            let enabled = session.state() == AuthorityState::Enabled;
            let outcome = composer.write(intent, &session);
            if enabled {
                expected += 1;
                assert_eq!(outcome, WriteOutcome::Forwarded);
            } else {
                assert!(matches!(outcome, WriteOutcome::Rejected(_)));
            }
        }

        // Enabled for steps 3..6 and 8..10.
        assert_eq!(expected, 5);
        assert_eq!(actuator.writes().len(), expected);
    }

    #[tokio::test]
    async fn test_zero_writes_neutral() {
        let actuator = Arc::new(MockActuator::default());
        let session = VirtualStickSession::new(actuator.clone());
        session.enable().await.expect("enable");

        let mut composer = StickComposer::default();
        composer.write(
            StickIntent {
                yaw_rate: Some(100.0),
                vertical: Some(VerticalIntent::Stick(200.0)),
                ..Default::default()
            },
            &session,
        );
        assert_eq!(composer.zero(&session), WriteOutcome::Forwarded);
        assert_eq!(composer.last(), Controls::NEUTRAL);
        assert_eq!(actuator.writes().last(), Some(&Controls::NEUTRAL));
    }
}
