// src/actuation.rs

//! # Actuation Boundary
//!
//! The vendor flight-controller primitives the control core drives. One
//! implementation is injected per session. Every primitive that can fail
//! asynchronously is an `async fn` returning its resolved `Result`; the
//! stick write is synchronous and best-effort.

use crate::error::ActuationError;
use crate::stick::Controls;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Vendor actuation primitives.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Starts an automatic takeoff.
    async fn takeoff(&self) -> Result<(), ActuationError>;

    /// Starts an automatic landing.
    async fn land(&self) -> Result<(), ActuationError>;

    /// Starts return-to-home. Resolves once the aircraft is home.
    async fn return_home(&self) -> Result<(), ActuationError>;

    /// Requests virtual stick authority.
    async fn enable_virtual_stick(&self) -> Result<(), ActuationError>;

    /// Releases virtual stick authority.
    async fn disable_virtual_stick(&self) -> Result<(), ActuationError>;

    /// Writes one stick frame. Fire and forget.
    fn write_sticks(&self, controls: Controls);
}

/// Which actor holds flight control authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityOwner {
    /// The physical remote controller.
    RemoteController,
    /// This application, through virtual stick.
    Application,
    /// An on-board failsafe.
    Failsafe,
    /// Not reported.
    Unknown,
}

/// Why authority changed hands, as reported by the vendor SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityChangeReason {
    /// The application asked for it.
    RequestedByApplication,
    /// The pilot moved the RC sticks or flipped the mode switch.
    RemoteControllerOverride,
    /// The link to the aircraft dropped.
    ConnectionLost,
    /// A failsafe such as low battery took over.
    Failsafe,
    /// Anything else.
    Other,
}
