// src/telemetry.rs

//! # Telemetry Snapshot
//!
//! Latest aircraft state as pushed by the flight controller. Values arrive
//! per key and asynchronously, so every measured field is optional until
//! its first delivery.
//!
//! The snapshot lives behind a `tokio::sync::watch` channel. There is
//! exactly one [`TelemetryWriter`] (it is not `Clone`) owned by the
//! ingestion callback, and any number of [`TelemetryReader`]s that take a
//! whole copy per control tick, so a tick never observes a half-applied
//! update.

use crate::error::ActuationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Aircraft attitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    /// Roll angle.
    pub roll: f64,
    /// Pitch angle.
    pub pitch: f64,
    /// Yaw angle.
    pub yaw: f64,
}

/// Aircraft position, WGS84 degrees and metres above takeoff.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in metres.
    pub altitude: f64,
}

/// Aircraft velocity in m/s, north-east-down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity3D {
    /// North component.
    pub x: f64,
    /// East component.
    pub y: f64,
    /// Down component.
    pub z: f64,
}

impl Velocity3D {
    /// Largest absolute component.
    pub fn max_component(&self) -> f64 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }
}

/// Latest known aircraft state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetrySnapshot {
    /// Attitude, once delivered.
    pub attitude: Option<Attitude>,
    /// Position, once delivered.
    pub position: Option<Position3D>,
    /// Velocity, once delivered.
    pub velocity: Option<Velocity3D>,
    /// Compass heading in degrees, once delivered.
    pub compass_heading: Option<f64>,
    /// GPS signal level, 0 (none) to 5.
    pub gps_signal_level: u8,
    /// Whether the flight controller reports the aircraft airborne.
    pub is_flying: bool,
    /// Whether the flight controller link is up.
    pub is_connected: bool,
    /// When the last update of any key was applied.
    pub updated_at: Option<Instant>,
}

impl TelemetrySnapshot {
    /// Time since the last update, `None` if nothing arrived yet.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.updated_at
            .map(|at| now.saturating_duration_since(at))
    }

    /// Whether the snapshot is missing or older than `max_age`.
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        match self.age(now) {
            Some(age) => age > max_age,
            None => true,
        }
    }

    /// Applies a single key update.
    pub fn apply(&mut self, update: TelemetryUpdate, at: Instant) {
        match update {
            TelemetryUpdate::Attitude(attitude) => self.attitude = Some(attitude),
            TelemetryUpdate::Position(position) => self.position = Some(position),
            TelemetryUpdate::Velocity(velocity) => self.velocity = Some(velocity),
            TelemetryUpdate::CompassHeading(heading) => self.compass_heading = Some(heading),
            TelemetryUpdate::GpsSignalLevel(level) => self.gps_signal_level = level,
            TelemetryUpdate::IsFlying(flying) => self.is_flying = flying,
            TelemetryUpdate::Connection(connected) => self.is_connected = connected,
        }
        self.updated_at = Some(at);
    }
}

/// One pushed value from the flight controller subscription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryUpdate {
    /// Attitude key.
    Attitude(Attitude),
    /// 3D location key.
    Position(Position3D),
    /// 3D velocity key.
    Velocity(Velocity3D),
    /// Compass heading key.
    CompassHeading(f64),
    /// GPS signal level key.
    GpsSignalLevel(u8),
    /// Is-flying key.
    IsFlying(bool),
    /// Connection key.
    Connection(bool),
}

/// Creates the single writer and a first reader for a fresh snapshot.
pub fn telemetry_channel() -> (TelemetryWriter, TelemetryReader) {
    let (tx, rx) = watch::channel(TelemetrySnapshot::default());
    (TelemetryWriter { tx }, TelemetryReader { rx })
}

/// Exclusive write half, owned by the ingestion callback.
#[derive(Debug)]
pub struct TelemetryWriter {
    tx: watch::Sender<TelemetrySnapshot>,
}

impl TelemetryWriter {
    /// Applies an update stamped with the current time.
    pub fn apply(&self, update: TelemetryUpdate) {
        self.apply_at(update, Instant::now());
    }

    /// Applies an update stamped with `at`.
    pub fn apply_at(&self, update: TelemetryUpdate, at: Instant) {
        self.tx.send_modify(|snapshot| snapshot.apply(update, at));
    }

    /// Another reader on the same snapshot.
    pub fn reader(&self) -> TelemetryReader {
        TelemetryReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read half; cheap to clone.
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    rx: watch::Receiver<TelemetrySnapshot>,
}

impl TelemetryReader {
    /// A consistent copy of the latest snapshot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next update. Errors once the writer is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

/// Push-based telemetry subscription offered by the flight controller SDK.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Starts delivering every subscribed key into `writer`.
    async fn subscribe(&self, writer: TelemetryWriter) -> Result<(), ActuationError>;

    /// Cancels all key subscriptions.
    async fn unsubscribe(&self);
}
