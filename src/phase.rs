// src/phase.rs

//! # Flight Phase Machine
//!
//! Top-level flight state. Each method either performs one legal transition
//! and returns it, or refuses with [`FlightError::InvalidTransition`] and
//! leaves the phase untouched.
//!
//! ```text
//! Idle --takeoff--> TakingOff --flying--> Cruising <--> AutoFollowing
//! AutoFollowing --arrived--> ReturningHome --home--> Landed
//! any --land--> Landing --on ground--> Landed
//! any --fault--> Faulted
//! Faulted | Landed --dismiss--> Idle
//! ```

use crate::error::FlightError;
use crate::telemetry::TelemetrySnapshot;
use serde::Serialize;

/// Where the flight is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FlightPhase {
    /// On the ground, ready.
    #[default]
    Idle,
    /// Takeoff requested, not airborne yet.
    TakingOff,
    /// Airborne, no guidance engaged.
    Cruising,
    /// Airborne under closed-loop guidance.
    AutoFollowing,
    /// Vendor return-to-home in progress.
    ReturningHome,
    /// Landing requested or in progress.
    Landing,
    /// Back on the ground.
    Landed,
    /// Control authority lost or ambiguous; needs the operator.
    Faulted,
}

impl FlightPhase {
    /// Whether the aircraft is expected to be in the air.
    pub fn is_airborne(self) -> bool {
        matches!(
            self,
            FlightPhase::Cruising
                | FlightPhase::AutoFollowing
                | FlightPhase::ReturningHome
                | FlightPhase::Landing
        )
    }
}

/// A completed phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Phase before.
    pub from: FlightPhase,
    /// Phase after.
    pub to: FlightPhase,
}

impl Transition {
    /// Whether this transition enters or leaves `AutoFollowing`.
    pub fn crosses_guidance(&self) -> bool {
        (self.from == FlightPhase::AutoFollowing) != (self.to == FlightPhase::AutoFollowing)
    }
}

/// The flight phase and its legal transitions.
#[derive(Debug, Default)]
pub struct FlightPhaseMachine {
    phase: FlightPhase,
    before_landing: Option<FlightPhase>,
}

impl FlightPhaseMachine {
    /// A machine in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    fn enter(&mut self, to: FlightPhase) -> Transition {
        let transition = Transition {
            from: self.phase,
            to,
        };
        self.phase = to;
        tracing::info!(from = ?transition.from, to = ?transition.to, "flight phase changed");
        transition
    }

    fn expect(&self, command: &'static str, allowed: &[FlightPhase]) -> Result<(), FlightError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(FlightError::InvalidTransition {
                command,
                phase: self.phase,
            })
        }
    }

    /// `Idle -> TakingOff`, provided the aircraft is connected and on the
    /// ground.
    pub fn request_takeoff(
        &mut self,
        telemetry: &TelemetrySnapshot,
    ) -> Result<Transition, FlightError> {
        self.expect("takeoff", &[FlightPhase::Idle])?;
        if !telemetry.is_connected {
            return Err(FlightError::PreconditionFailed(
                "aircraft not connected".to_string(),
            ));
        }
        if telemetry.is_flying {
            return Err(FlightError::PreconditionFailed(
                "aircraft already flying".to_string(),
            ));
        }
        Ok(self.enter(FlightPhase::TakingOff))
    }

    /// `TakingOff -> Idle` after the takeoff primitive failed.
    pub fn takeoff_failed(&mut self) -> Option<Transition> {
        (self.phase == FlightPhase::TakingOff).then(|| self.enter(FlightPhase::Idle))
    }

    /// Reacts to the flight controller's is-flying flag: `TakingOff ->
    /// Cruising` once airborne, `Landing -> Landed` once down.
    pub fn observe_flying(&mut self, is_flying: bool) -> Option<Transition> {
        match (self.phase, is_flying) {
            (FlightPhase::TakingOff, true) => Some(self.enter(FlightPhase::Cruising)),
            (FlightPhase::Landing, false) => Some(self.landed()),
            _ => None,
        }
    }

    /// `Cruising -> AutoFollowing`.
    pub fn engage_guidance(&mut self) -> Result<Transition, FlightError> {
        self.expect("engage guidance", &[FlightPhase::Cruising])?;
        Ok(self.enter(FlightPhase::AutoFollowing))
    }

    /// `AutoFollowing -> Cruising`.
    pub fn disengage_guidance(&mut self) -> Result<Transition, FlightError> {
        self.expect("disengage guidance", &[FlightPhase::AutoFollowing])?;
        Ok(self.enter(FlightPhase::Cruising))
    }

    /// `AutoFollowing -> ReturningHome`.
    pub fn begin_return_home(&mut self) -> Result<Transition, FlightError> {
        self.expect("return home", &[FlightPhase::AutoFollowing])?;
        Ok(self.enter(FlightPhase::ReturningHome))
    }

    /// `ReturningHome -> Landed` once the vendor reports the aircraft home,
    /// or `ReturningHome -> Cruising` if return-home failed.
    pub fn return_home_resolved(&mut self, succeeded: bool) -> Option<Transition> {
        if self.phase != FlightPhase::ReturningHome {
            return None;
        }
        Some(self.enter(if succeeded {
            FlightPhase::Landed
        } else {
            FlightPhase::Cruising
        }))
    }

    /// `any -> Landing`. Refused while already landing so repeated requests
    /// never reach the actuator twice.
    pub fn begin_landing(&mut self) -> Result<Transition, FlightError> {
        if self.phase == FlightPhase::Landing {
            return Err(FlightError::InvalidTransition {
                command: "land",
                phase: self.phase,
            });
        }
        self.before_landing = Some(self.phase);
        Ok(self.enter(FlightPhase::Landing))
    }

    /// Reacts to a failed landing primitive. A forced landing that fails
    /// leaves nothing safe to fall back to and faults; an operator landing
    /// goes back to where it came from.
    pub fn landing_failed(&mut self, forced: bool) -> Option<Transition> {
        if self.phase != FlightPhase::Landing {
            return None;
        }
        let back = self.before_landing.take().unwrap_or(FlightPhase::Faulted);
        Some(self.enter(if forced { FlightPhase::Faulted } else { back }))
    }

    /// `Landing -> Landed`.
    pub fn landed(&mut self) -> Transition {
        self.before_landing = None;
        self.enter(FlightPhase::Landed)
    }

    /// `any -> Faulted`. No-op when already faulted.
    pub fn fault(&mut self, reason: &str) -> Option<Transition> {
        if self.phase == FlightPhase::Faulted {
            return None;
        }
        tracing::error!(reason, phase = ?self.phase, "flight faulted");
        Some(self.enter(FlightPhase::Faulted))
    }

    /// `Faulted | Landed -> Idle`.
    pub fn dismiss(&mut self) -> Result<Transition, FlightError> {
        self.expect("dismiss", &[FlightPhase::Faulted, FlightPhase::Landed])?;
        self.before_landing = None;
        Ok(self.enter(FlightPhase::Idle))
    }
}
