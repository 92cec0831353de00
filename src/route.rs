// src/route.rs

//! # Route Feed and Geodesy
//!
//! The route feed delivers the aircraft's current location and the
//! destination it should fly to, or a start flag asking for takeoff.
//! This module decodes those datagrams and carries the small amount of
//! geodesy the GPS guidance law needs.
//!
//! Arrival detection does not use these helpers; it compares
//! raw degree deltas (see [`crate::arrival`]).

use crate::error::FeedError;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutePoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl RoutePoint {
    /// Creates a point.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Great-circle distance between two points, in metres.
pub fn haversine_distance(from: RoutePoint, to: RoutePoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_phi = (to.lat - from.lat).to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from `from` to `to`, degrees in `[0, 360)`.
pub fn bearing(from: RoutePoint, to: RoutePoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Signed turn from `current` to `target` heading, degrees in `[-180, 180)`.
pub fn heading_difference(target: f64, current: f64) -> f64 {
    (target - current + 540.0).rem_euclid(360.0) - 180.0
}

/// A decoded route datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteMessage {
    /// Operator asked for takeoff.
    Start,
    /// New current location and destination.
    Update {
        /// Where the aircraft is.
        current: RoutePoint,
        /// Where it should go.
        destination: RoutePoint,
    },
}

#[derive(Deserialize)]
struct RawRouteDatagram {
    #[serde(default)]
    location: Option<RoutePoint>,
    #[serde(default)]
    dest_location: Option<RoutePoint>,
    #[serde(default)]
    start_flag: bool,
}

impl RouteMessage {
    /// Decodes a JSON route datagram.
    ///
    /// A set `start_flag` wins over any locations. Otherwise both locations
    /// must be present and finite.
    pub fn parse(payload: &[u8]) -> Result<Self, FeedError> {
        let raw: RawRouteDatagram = serde_json::from_slice(payload)?;
        if raw.start_flag {
            return Ok(RouteMessage::Start);
        }

        match (raw.location, raw.dest_location) {
            (Some(current), Some(destination)) => {
                if !current.is_finite() || !destination.is_finite() {
                    return Err(FeedError::InvalidCoordinate);
                }
                Ok(RouteMessage::Update {
                    current,
                    destination,
                })
            }
            _ => Err(FeedError::MissingLocation),
        }
    }
}

/// Latest route update with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteUpdate {
    /// Where the aircraft is.
    pub current: RoutePoint,
    /// Where it should go.
    pub destination: RoutePoint,
    /// When the update arrived.
    pub received_at: Instant,
}

/// Single writer of the latest route update.
#[derive(Debug)]
pub struct RouteFeed {
    tx: watch::Sender<Option<RouteUpdate>>,
}

impl RouteFeed {
    /// A feed with no update yet, and a first reader.
    pub fn new() -> (Self, RouteReader) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, RouteReader { rx })
    }

    /// Another reader on the same feed.
    pub fn reader(&self) -> RouteReader {
        RouteReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Publishes a new update.
    pub fn publish(&self, update: RouteUpdate) {
        self.tx.send_replace(Some(update));
    }
}

/// Read half of the route feed.
#[derive(Debug, Clone)]
pub struct RouteReader {
    rx: watch::Receiver<Option<RouteUpdate>>,
}

impl RouteReader {
    /// Copy of the latest update, if any.
    pub fn latest(&self) -> Option<RouteUpdate> {
        *self.rx.borrow()
    }
}
