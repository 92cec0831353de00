// src/tracking.rs

//! # Vision Tracking Feed
//!
//! The vision tracker reports where the locked target sits in the camera
//! frame as normalized offsets. Two consecutive samples are differenced
//! into a [`TrackingDiff`] that extrapolates the offset a short horizon
//! into the future, which is what the guidance law acts on.
//!
//! Like telemetry, the latest diff is published through a
//! `tokio::sync::watch` channel: a single [`TrackingFeed`] writes, any
//! number of [`TrackingReader`]s copy.

use crate::error::FeedError;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// How far ahead the offset is extrapolated.
pub const PREDICTION_HORIZON: Duration = Duration::from_millis(200);

/// One decoded tracker sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSample {
    /// Horizontal offset of the box centre, -1 (left) to 1 (right).
    pub normalized_offset_x: f64,
    /// Vertical offset of the box centre, -1 (top) to 1 (bottom).
    pub normalized_offset_y: f64,
    /// Box width as a fraction of the frame.
    pub box_width: f64,
    /// Box height as a fraction of the frame.
    pub box_height: f64,
    /// When the sample was received.
    pub received_at: Instant,
}

/// Difference of two consecutive samples with the extrapolated error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingDiff {
    /// Older sample.
    pub previous: TrackingSample,
    /// Newer sample.
    pub current: TrackingSample,
    /// Horizontal offset change per second.
    pub error_rate_x: f64,
    /// Vertical offset change per second.
    pub error_rate_y: f64,
    /// Horizontal offset extrapolated over [`PREDICTION_HORIZON`].
    pub future_error_x: f64,
    /// Vertical offset extrapolated over [`PREDICTION_HORIZON`].
    pub future_error_y: f64,
}

impl TrackingDiff {
    /// Differences two samples. Non-increasing timestamps give zero rates.
    pub fn between(previous: TrackingSample, current: TrackingSample) -> Self {
        Self::with_horizon(previous, current, PREDICTION_HORIZON)
    }

    /// Differences two samples with an explicit prediction horizon.
    pub fn with_horizon(
        previous: TrackingSample,
        current: TrackingSample,
        horizon: Duration,
    ) -> Self {
        let dt = current
            .received_at
            .saturating_duration_since(previous.received_at)
            .as_secs_f64();
        let (error_rate_x, error_rate_y) = if dt > 0.0 {
            (
                (current.normalized_offset_x - previous.normalized_offset_x) / dt,
                (current.normalized_offset_y - previous.normalized_offset_y) / dt,
            )
        } else {
            (0.0, 0.0)
        };
        let horizon = horizon.as_secs_f64();

        Self {
            previous,
            current,
            error_rate_x,
            error_rate_y,
            future_error_x: current.normalized_offset_x + error_rate_x * horizon,
            future_error_y: current.normalized_offset_y + error_rate_y * horizon,
        }
    }

    /// Time since the newer sample arrived.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.current.received_at)
    }
}

/// Wire format of a tracker datagram.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TrackingDatagram {
    /// Horizontal offset.
    pub normalized_offset_x: f64,
    /// Vertical offset.
    pub normalized_offset_y: f64,
    /// Box width.
    pub box_width: f64,
    /// Box height.
    pub box_height: f64,
    /// Whether the tracker holds a target lock.
    pub is_locked: bool,
}

impl TrackingDatagram {
    /// Decodes a JSON datagram.
    pub fn parse(payload: &[u8]) -> Result<Self, FeedError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// The sample part, stamped with `received_at`.
    pub fn sample(&self, received_at: Instant) -> TrackingSample {
        TrackingSample {
            normalized_offset_x: self.normalized_offset_x,
            normalized_offset_y: self.normalized_offset_y,
            box_width: self.box_width,
            box_height: self.box_height,
            received_at,
        }
    }
}

/// Single writer of the tracking diff.
#[derive(Debug)]
pub struct TrackingFeed {
    previous: Option<TrackingSample>,
    tx: watch::Sender<Option<TrackingDiff>>,
}

impl TrackingFeed {
    /// A feed with no samples yet, and a first reader.
    pub fn new() -> (Self, TrackingReader) {
        let (tx, rx) = watch::channel(None);
        (Self { previous: None, tx }, TrackingReader { rx })
    }

    /// Another reader on the same diff.
    pub fn reader(&self) -> TrackingReader {
        TrackingReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Feeds one sample.
    ///
    /// Unlocked samples are never kept. Losing the lock drops the previous
    /// sample and clears the diff, so a re-acquired target never gets
    /// differenced against a stale one. The first locked sample after that
    /// only primes the feed.
    pub fn update(&mut self, sample: TrackingSample, is_locked: bool) {
        if !is_locked {
            if self.previous.take().is_some() {
                tracing::debug!("tracking lock lost, discarding diff");
            }
            self.tx.send_replace(None);
            return;
        }

        let diff = self
            .previous
            .replace(sample)
            .map(|previous| TrackingDiff::between(previous, sample));
        self.tx.send_replace(diff);
    }

    /// Decodes and feeds one datagram received now.
    pub fn ingest_datagram(&mut self, payload: &[u8]) -> Result<(), FeedError> {
        self.ingest_datagram_at(payload, Instant::now())
    }

    /// Decodes and feeds one datagram received at `received_at`.
    pub fn ingest_datagram_at(
        &mut self,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<(), FeedError> {
        let datagram = TrackingDatagram::parse(payload)?;
        self.update(datagram.sample(received_at), datagram.is_locked);
        Ok(())
    }
}

/// Read half of the tracking diff.
#[derive(Debug, Clone)]
pub struct TrackingReader {
    rx: watch::Receiver<Option<TrackingDiff>>,
}

impl TrackingReader {
    /// Copy of the latest diff, if any.
    pub fn latest(&self) -> Option<TrackingDiff> {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn sample(x: f64, y: f64, at: Instant) -> TrackingSample {
        TrackingSample {
            normalized_offset_x: x,
            normalized_offset_y: y,
            box_width: 0.2,
            box_height: 0.4,
            received_at: at,
        }
    }

    #[test]
    fn test_diff_extrapolates_future_error() {
        let t0 = Instant::now();
        let diff = TrackingDiff::between(
            sample(0.0, 0.1, t0),
            sample(0.1, 0.2, t0 + Duration::from_millis(100)),
        );
        assert!(value_close(1.0, diff.error_rate_x));
        assert!(value_close(1.0, diff.error_rate_y));
        assert!(value_close(0.3, diff.future_error_x));
        assert!(value_close(0.4, diff.future_error_y));
    }

    #[test]
    fn test_diff_zero_spacing_has_no_rate() {
        let t0 = Instant::now();
        let diff = TrackingDiff::between(sample(0.0, 0.1, t0), sample(0.5, 0.3, t0));
        assert_eq!(diff.error_rate_y, 0.0);
        assert!(value_close(0.3, diff.future_error_y));
    }

    #[test]
    fn test_feed_needs_two_samples() {
        let (mut feed, reader) = TrackingFeed::new();
        let t0 = Instant::now();
        feed.update(sample(0.0, 0.0, t0), true);
        assert!(reader.latest().is_none());

        feed.update(sample(0.1, 0.0, t0 + Duration::from_millis(150)), true);
        let diff = reader.latest().expect("diff after second sample");
        assert_eq!(diff.current.normalized_offset_x, 0.1);
    }

    #[test]
    fn test_feed_lock_loss_resets() {
        let (mut feed, reader) = TrackingFeed::new();
        let t0 = Instant::now();
        feed.update(sample(0.0, 0.0, t0), true);
        feed.update(sample(0.1, 0.0, t0 + Duration::from_millis(100)), true);
        assert!(reader.latest().is_some());

        feed.update(sample(0.9, 0.9, t0 + Duration::from_millis(200)), false);
        assert!(reader.latest().is_none(), "lock loss clears the diff");

        // Re-lock primes again instead of differencing against old data.
        feed.update(sample(0.3, 0.3, t0 + Duration::from_millis(300)), true);
        assert!(reader.latest().is_none());
        feed.update(sample(0.3, 0.3, t0 + Duration::from_millis(400)), true);
        assert!(reader.latest().is_some());
    }

    #[test]
    fn test_unlocked_samples_never_become_a_baseline() {
        let (mut feed, reader) = TrackingFeed::new();
        let t0 = Instant::now();
        let at = |ms| t0 + Duration::from_millis(ms);
        feed.update(sample(0.0, 0.0, at(0)), true);
        feed.update(sample(0.0, 0.0, at(100)), true);
        feed.update(sample(0.0, -1.0, at(200)), false);
        feed.update(sample(0.0, -1.0, at(300)), false);
        assert!(reader.latest().is_none());

        feed.update(sample(0.0, 0.1, at(400)), true);
        assert!(reader.latest().is_none(), "re-lock only primes the feed");

        feed.update(sample(0.0, 0.1, at(500)), true);
        let diff = reader.latest().expect("diff from two locked samples");
        assert_eq!(diff.previous.normalized_offset_y, 0.1);
        assert!(value_close(0.1, diff.future_error_y));
    }

    #[test]
    fn test_unlocked_first_sample_is_ignored() {
        let (mut feed, reader) = TrackingFeed::new();
        let t0 = Instant::now();
        feed.update(sample(0.0, -1.0, t0), false);
        feed.update(sample(0.0, 0.2, t0 + Duration::from_millis(100)), true);
        assert!(reader.latest().is_none());
    }

    #[test]
    fn test_datagram_parsing() {
        let payload = br#" {"normalized_offset_x": -0.25, "normalized_offset_y": 0.5,
            "box_width": 0.1, "box_height": 0.3, "is_locked": true}
        "#;
        let datagram = TrackingDatagram::parse(payload).expect("valid datagram");
        assert_eq!(datagram.normalized_offset_x, -0.25);
        assert!(datagram.is_locked);

        let broken = br#"{"normalized_offset_x": -0.25}"#;
        assert!(matches!(
            TrackingDatagram::parse(broken),
            Err(FeedError::Json(_))
        ));
    }
}
