// src/error.rs

//! Error taxonomy of the control core.
//!
//! Precondition and actuation errors are returned to the caller. Safety
//! trips and stale data are handled internally and only show up in the
//! diagnostic state stream, so they have no error variant here.

use crate::phase::FlightPhase;
use crate::session::AuthorityState;
use thiserror::Error;

/// Failure reported by, or on the way to, the vendor actuation primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuationError {
    /// The vendor SDK rejected the request.
    #[error("{operation} rejected by flight controller: {description}")]
    Rejected {
        /// Which primitive failed, e.g. `"takeoff"`.
        operation: &'static str,
        /// Vendor-provided description.
        description: String,
    },
    /// The authority state machine does not allow the request right now.
    #[error("cannot {operation} virtual stick while authority is {state:?}")]
    InvalidAuthorityTransition {
        /// Requested operation, `"enable"` or `"disable"`.
        operation: &'static str,
        /// State at the time of the request.
        state: AuthorityState,
    },
    /// A concurrent request changed the state before this one resolved.
    #[error("{operation} superseded by a concurrent authority change")]
    Superseded {
        /// Which request was superseded.
        operation: &'static str,
    },
}

impl ActuationError {
    /// Convenience constructor for a vendor rejection.
    pub fn rejected(operation: &'static str, description: impl Into<String>) -> Self {
        ActuationError::Rejected {
            operation,
            description: description.into(),
        }
    }
}

/// Failure of an operator-facing flight command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlightError {
    /// Preconditions for the command are not met; the phase is unchanged.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// The command is not valid in the current flight phase.
    #[error("{command} is not allowed while {phase:?}")]
    InvalidTransition {
        /// Requested command.
        command: &'static str,
        /// Phase at the time of the request.
        phase: FlightPhase,
    },
    /// Guidance needs virtual stick authority, which is not held.
    #[error("virtual stick authority required, currently {0:?}")]
    AuthorityRequired(AuthorityState),
    /// An actuation primitive failed.
    #[error(transparent)]
    Actuation(#[from] ActuationError),
}

/// Failure to decode a feed datagram.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The payload is not the expected JSON shape.
    #[error("malformed datagram: {0}")]
    Json(#[from] serde_json::Error),
    /// A coordinate is missing or not a finite number.
    #[error("invalid coordinate in route datagram")]
    InvalidCoordinate,
    /// Neither a start flag nor a complete location pair was present.
    #[error("route datagram has neither start_flag nor location/dest_location")]
    MissingLocation,
}
