// src/guidance.rs

//! Guidance laws: where the stick intent comes from while the aircraft is
//! under closed-loop control.
//!
//! Each law turns the tick's inputs into a [`StickIntent`], or `None` when
//! it has nothing current to act on, in which case the tick is skipped.

pub mod gps;
pub use gps::*;
pub mod manual;
pub use manual::*;
pub mod vision;
pub use vision::*;

use crate::config::Tunables;
use crate::route::RouteUpdate;
use crate::stick::StickIntent;
use crate::telemetry::TelemetrySnapshot;
use crate::tracking::TrackingDiff;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Active source of control intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GuidanceMode {
    /// Fly to the route destination.
    Gps,
    /// Follow the vision tracker's target.
    #[default]
    Vision,
    /// Pass the operator's sliders through.
    Manual,
}

/// Everything a guidance law may look at in one tick.
#[derive(Debug, Clone, Copy)]
pub struct GuidanceInput<'a> {
    /// Consistent telemetry copy for this tick.
    pub telemetry: &'a TelemetrySnapshot,
    /// Latest tracking diff, if any.
    pub tracking: Option<TrackingDiff>,
    /// Latest route update, if any.
    pub route: Option<RouteUpdate>,
    /// Seconds since the previous tick.
    pub dt: f64,
    /// Tick time.
    pub now: Instant,
}

/// A source of stick intent.
pub trait GuidanceLaw: Send {
    /// Computes this tick's intent.
    fn control(&mut self, input: &GuidanceInput<'_>, tunables: &Tunables) -> Option<StickIntent>;

    /// Discards accumulated controller state.
    fn reset(&mut self);
}
