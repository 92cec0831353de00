// src/arrival.rs

//! # Arrival Detection
//!
//! Decides when the aircraft has reached its destination and should return
//! home. Arrival is a raw degree comparison on latitude and longitude, not a
//! geodesic distance: `0.000027°` is about three metres of latitude, and
//! less of longitude away from the equator.
//!
//! Reaching the threshold starts a single debounce. The return-home
//! trigger fires only if the aircraft is still inside when the dwell time
//! has elapsed; leaving cancels the debounce and re-entering starts it
//! again from zero.
//!
//! The timer holds no task of its own. The caller passes `now` with every
//! route update and polls it once per control tick, so cancelling is just
//! forgetting the start instant.

use crate::route::RoutePoint;
use std::time::Duration;
use tokio::time::Instant;

/// Per-axis arrival threshold in degrees.
pub const ARRIVAL_THRESHOLD_DEG: f64 = 0.000027;

/// How long the aircraft must stay within the threshold.
pub const ARRIVAL_DWELL: Duration = Duration::from_secs(10);

/// Outcome of a route update or poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalEvent {
    /// Nothing changed.
    None,
    /// The threshold was entered and the debounce started.
    DebounceStarted,
    /// The threshold was left before the dwell elapsed.
    DebounceCancelled,
    /// Dwell complete; return home now.
    TriggerReturnHome,
}

/// Debounced arrival detector.
#[derive(Debug, Clone)]
pub struct ArrivalTimer {
    threshold: f64,
    dwell: Duration,
    debounce_started: Option<Instant>,
    within: bool,
    return_home_in_progress: bool,
}

impl Default for ArrivalTimer {
    fn default() -> Self {
        Self::new(ARRIVAL_THRESHOLD_DEG, ARRIVAL_DWELL)
    }
}

impl ArrivalTimer {
    /// A detector with the given threshold (degrees) and dwell.
    pub fn new(threshold: f64, dwell: Duration) -> Self {
        Self {
            threshold,
            dwell,
            debounce_started: None,
            within: false,
            return_home_in_progress: false,
        }
    }

    /// Whether `current` is within the threshold of `destination` on both axes.
    pub fn within_threshold(&self, current: RoutePoint, destination: RoutePoint) -> bool {
        (current.lat - destination.lat).abs() <= self.threshold
            && (current.lng - destination.lng).abs() <= self.threshold
    }

    /// Feeds one route update.
    pub fn on_route_update(
        &mut self,
        current: RoutePoint,
        destination: RoutePoint,
        now: Instant,
    ) -> ArrivalEvent {
        self.within = self.within_threshold(current, destination);

        if !self.within {
            self.return_home_in_progress = false;
            return match self.debounce_started.take() {
                Some(_) => {
                    tracing::debug!("left arrival threshold, debounce cancelled");
                    ArrivalEvent::DebounceCancelled
                }
                None => ArrivalEvent::None,
            };
        }

        if self.return_home_in_progress {
            return ArrivalEvent::None;
        }
        if self.debounce_started.is_none() {
            self.debounce_started = Some(now);
            tracing::debug!(dwell = ?self.dwell, "arrival threshold reached, debounce started");
            return ArrivalEvent::DebounceStarted;
        }
        self.poll(now)
    }

    /// Fires the trigger if the debounce has run its full dwell.
    pub fn poll(&mut self, now: Instant) -> ArrivalEvent {
        let Some(started) = self.debounce_started else {
            return ArrivalEvent::None;
        };
        if !self.within
            || self.return_home_in_progress
            || now.saturating_duration_since(started) < self.dwell
        {
            return ArrivalEvent::None;
        }

        self.debounce_started = None;
        self.return_home_in_progress = true;
        tracing::info!("arrival confirmed, triggering return home");
        ArrivalEvent::TriggerReturnHome
    }

    /// Drops any running debounce.
    pub fn cancel(&mut self) {
        self.debounce_started = None;
    }

    /// Forgets everything, including an in-progress return home.
    pub fn reset(&mut self) {
        self.cancel();
        self.within = false;
        self.return_home_in_progress = false;
    }

    /// Whether a debounce is running.
    pub fn is_pending(&self) -> bool {
        self.debounce_started.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HERE: RoutePoint = RoutePoint::new(37.5, 127.0);
    const NEARBY: RoutePoint = RoutePoint::new(37.500_02, 127.000_02);
    const FAR: RoutePoint = RoutePoint::new(37.501, 127.0);

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_threshold_is_per_axis_degrees() {
        let timer = ArrivalTimer::default();
        assert!(timer.within_threshold(HERE, HERE));
        assert!(timer.within_threshold(NEARBY, HERE));
        assert!(!timer.within_threshold(FAR, HERE));
        assert!(!timer.within_threshold(RoutePoint::new(37.5, 127.00003), HERE));
    }

    #[test]
    fn test_dwell_fires_exactly_once() {
        let mut timer = ArrivalTimer::default();
        let t0 = Instant::now();

        assert_eq!(timer.on_route_update(HERE, HERE, t0), ArrivalEvent::DebounceStarted);

        let mut fired = 0;
        for step in 1..=30 {
            let event = timer.on_route_update(HERE, HERE, t0 + secs(step as f64 * 0.5));
            if event == ArrivalEvent::TriggerReturnHome {
                fired += 1;
                assert_eq!(step, 20, "fires at 10.0 s");
            }
            if timer.poll(t0 + secs(step as f64 * 0.5)) == ArrivalEvent::TriggerReturnHome {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_leaving_early_never_fires() {
        let mut timer = ArrivalTimer::default();
        let t0 = Instant::now();

        timer.on_route_update(HERE, HERE, t0);
        timer.on_route_update(NEARBY, HERE, t0 + secs(9.0));
        assert_eq!(
            timer.on_route_update(FAR, HERE, t0 + secs(9.5)),
            ArrivalEvent::DebounceCancelled
        );
        assert_eq!(timer.poll(t0 + secs(20.0)), ArrivalEvent::None);

        // Re-entering starts again from zero.
        let t1 = t0 + secs(21.0);
        assert_eq!(timer.on_route_update(HERE, HERE, t1), ArrivalEvent::DebounceStarted);
        assert_eq!(timer.poll(t1 + secs(9.9)), ArrivalEvent::None);
        assert_eq!(timer.poll(t1 + secs(10.0)), ArrivalEvent::TriggerReturnHome);
    }

    #[test]
    fn test_single_outstanding_debounce() {
        let mut timer = ArrivalTimer::default();
        let t0 = Instant::now();

        timer.on_route_update(HERE, HERE, t0);
        // Further updates inside the threshold do not restart the debounce.
        timer.on_route_update(NEARBY, HERE, t0 + secs(6.0));
        assert_eq!(timer.poll(t0 + secs(10.0)), ArrivalEvent::TriggerReturnHome);
    }

    #[test]
    fn test_cancel_and_rearm_after_leaving() {
        let mut timer = ArrivalTimer::default();
        let t0 = Instant::now();

        timer.on_route_update(HERE, HERE, t0);
        timer.cancel();
        assert!(!timer.is_pending());
        assert_eq!(timer.poll(t0 + secs(11.0)), ArrivalEvent::None);

        timer.on_route_update(HERE, HERE, t0 + secs(12.0));
        assert_eq!(timer.poll(t0 + secs(22.0)), ArrivalEvent::TriggerReturnHome);

        // Still inside: no second trigger.
        assert_eq!(timer.on_route_update(HERE, HERE, t0 + secs(23.0)), ArrivalEvent::None);
        assert_eq!(timer.poll(t0 + secs(40.0)), ArrivalEvent::None);

        // Leaving clears the in-progress flag.
        timer.on_route_update(FAR, HERE, t0 + secs(41.0));
        assert_eq!(
            timer.on_route_update(HERE, HERE, t0 + secs(42.0)),
            ArrivalEvent::DebounceStarted
        );
    }
}
