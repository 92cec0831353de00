// src/lib.rs

//! # Virtual Stick Guidance
//!
//! Closed-loop control core for a ground station that flies a multirotor
//! through a vendor "virtual stick" API. Telemetry, vision tracking and
//! route updates arrive asynchronously; a periodic control loop turns them
//! into clamped stick commands while a flight phase machine, a virtual
//! stick authority session, an arrival timer and a safety watchdog decide
//! what may be flown and when.
//!
//! The vendor SDK itself stays outside: it is reached through the
//! [`Actuator`] and [`TelemetrySource`] traits, one implementation per
//! session.
//!
//! ```no_run
//! use std::sync::Arc;
//! use virtual_stick_guidance::{
//!     telemetry_channel, Actuator, Autopilot, AutopilotConfig, ControlLoopScheduler,
//!     TrackingFeed,
//! };
//!
//! async fn fly(actuator: Arc<dyn Actuator>) {
//!     let (telemetry_writer, telemetry) = telemetry_channel();
//!     let (tracking_feed, tracking) = TrackingFeed::new();
//!     // Hand `telemetry_writer` to the SDK subscription and `tracking_feed`
//!     // to the vision datagram receiver.
//!
//!     let autopilot = Arc::new(Autopilot::new(
//!         AutopilotConfig::new(),
//!         actuator,
//!         telemetry,
//!         tracking,
//!     ));
//!     let scheduler = ControlLoopScheduler::start(autopilot.clone());
//!
//!     autopilot.start_take_off().await.ok();
//!     // ...
//!     scheduler.shutdown().await;
//! #   drop((telemetry_writer, tracking_feed));
//! }
//! ```

#![deny(missing_docs)]

pub mod actuation;
pub mod arrival;
pub mod autopilot;
pub mod config;
pub mod error;
pub mod guidance;
pub mod phase;
pub mod pid;
pub mod route;
pub mod safety;
pub mod scheduler;
pub mod session;
pub mod stick;
pub mod telemetry;
pub mod tracking;

#[doc(inline)]
pub use actuation::{Actuator, AuthorityChangeReason, AuthorityOwner};
#[doc(inline)]
pub use arrival::{ArrivalEvent, ArrivalTimer};
#[doc(inline)]
pub use autopilot::{ActuationRequest, Autopilot, StateReport};
#[doc(inline)]
pub use config::{AutopilotConfig, Tunables};
#[doc(inline)]
pub use error::{ActuationError, FeedError, FlightError};
#[doc(inline)]
pub use guidance::{GuidanceLaw, GuidanceMode, ManualSticks};
#[doc(inline)]
pub use phase::{FlightPhase, FlightPhaseMachine, Transition};
#[doc(inline)]
pub use route::{RouteMessage, RoutePoint};
#[doc(inline)]
pub use safety::{SafetyAction, SafetyWatchdog};
#[doc(inline)]
pub use scheduler::ControlLoopScheduler;
#[doc(inline)]
pub use session::{AuthorityState, VirtualStickSession};
#[doc(inline)]
pub use stick::{Controls, StickComposer, StickIntent, StickPosition, MAX_STICK};
#[doc(inline)]
pub use telemetry::{telemetry_channel, TelemetryReader, TelemetrySnapshot, TelemetrySource};
#[doc(inline)]
pub use tracking::{TrackingDiff, TrackingFeed};

#[cfg(test)]
mod test_utils;
