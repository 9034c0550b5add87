//! # Presentation Clock
//!
//! The single shared media clock. Decoded output anchors the clock to a
//! `(lower, upper)` timestamp window; between anchor updates the clock
//! interpolates against wall time, never past the upper bound.
//!
//! When audio is present the audio job is the clock manager and supplies the
//! bounds; a video-only player anchors the clock from video output instead.

use std::cell::Cell;
use std::time::{Duration, Instant};

use crate::error::{PlayerError, Result};

/// Interpolating playback clock.
///
/// Not thread-safe on its own; it lives inside the player's state mutex.
#[derive(Debug)]
pub struct PresentationClock {
    lower: Duration,
    upper: Duration,
    duration: Duration,
    started_at: Option<Instant>,
    last_reported: Cell<Duration>,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self {
            lower: Duration::ZERO,
            upper: Duration::ZERO,
            duration: Duration::MAX,
            started_at: None,
            last_reported: Cell::new(Duration::ZERO),
        }
    }

    /// Anchors the clock to a fresh timestamp window.
    ///
    /// `lower` is the presentation timestamp of the most recently rendered
    /// output; `upper` is the largest timestamp buffered ahead of it.
    /// Interpolation restarts from `lower`.
    pub fn set_bounds(&mut self, lower: Duration, upper: Duration) -> Result<()> {
        if lower > upper {
            return Err(PlayerError::InvalidClockRange { lower, upper });
        }
        self.lower = lower;
        self.upper = upper;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    /// Starts wall-time interpolation. No-op if already running.
    pub fn start_interpolating(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Freezes the clock at its current value.
    pub fn stop_interpolating(&mut self) {
        if self.started_at.is_some() {
            self.lower = self.raw_time();
            self.started_at = None;
        }
    }

    /// Whether the clock is advancing against wall time.
    pub fn is_interpolating(&self) -> bool {
        self.started_at.is_some()
    }

    /// Collapses both bounds onto `position` and clears the monotonic guard.
    ///
    /// Called when a seek is granted; this is the only operation that moves
    /// the reported time backwards.
    pub fn reset_to(&mut self, position: Duration) {
        self.lower = position;
        self.upper = position;
        self.last_reported.set(position);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Updates the media duration used as the absolute upper clamp.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// When interpolation last (re)started, if running.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Current playback position.
    ///
    /// Monotonically non-decreasing while bounds are stable; clamped to the
    /// upper bound and the media duration.
    pub fn current_time(&self) -> Duration {
        let capped = self.raw_time().min(self.upper).min(self.duration);
        let reported = capped.max(self.last_reported.get());
        self.last_reported.set(reported);
        reported
    }

    fn raw_time(&self) -> Duration {
        match self.started_at {
            Some(at) => self.lower + at.elapsed(),
            None => self.lower,
        }
    }
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        let mut clock = PresentationClock::new();
        let result = clock.set_bounds(Duration::from_millis(100), Duration::from_millis(50));
        assert!(matches!(
            result,
            Err(PlayerError::InvalidClockRange { .. })
        ));
    }

    #[test]
    fn stopped_clock_reports_lower_bound() {
        let mut clock = PresentationClock::new();
        clock
            .set_bounds(Duration::from_millis(30), Duration::from_millis(120))
            .unwrap();
        assert_eq!(clock.current_time(), Duration::from_millis(30));
        assert_eq!(clock.current_time(), Duration::from_millis(30));
    }

    #[test]
    fn interpolation_never_exceeds_upper_bound() {
        let mut clock = PresentationClock::new();
        clock
            .set_bounds(Duration::from_millis(0), Duration::from_millis(1))
            .unwrap();
        clock.start_interpolating();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.current_time() <= Duration::from_millis(1));
    }

    #[test]
    fn reported_time_is_monotonic() {
        let mut clock = PresentationClock::new();
        clock
            .set_bounds(Duration::from_millis(0), Duration::from_secs(10))
            .unwrap();
        clock.start_interpolating();
        let first = clock.current_time();
        let second = clock.current_time();
        assert!(second >= first);
    }

    #[test]
    fn reset_moves_time_backwards() {
        let mut clock = PresentationClock::new();
        clock
            .set_bounds(Duration::from_millis(500), Duration::from_millis(800))
            .unwrap();
        assert_eq!(clock.current_time(), Duration::from_millis(500));

        clock.reset_to(Duration::from_millis(100));
        assert_eq!(clock.current_time(), Duration::from_millis(100));
    }

    #[test]
    fn duration_clamps_reported_time() {
        let mut clock = PresentationClock::new();
        clock.set_duration(Duration::from_millis(40));
        clock
            .set_bounds(Duration::from_millis(50), Duration::from_millis(100))
            .unwrap();
        assert_eq!(clock.current_time(), Duration::from_millis(40));
    }

    #[test]
    fn stop_freezes_current_value() {
        let mut clock = PresentationClock::new();
        clock
            .set_bounds(Duration::ZERO, Duration::from_secs(10))
            .unwrap();
        clock.start_interpolating();
        assert!(clock.is_interpolating());

        clock.stop_interpolating();
        assert!(!clock.is_interpolating());
        let frozen = clock.current_time();
        std::thread::sleep(Duration::from_millis(3));
        assert_eq!(clock.current_time(), frozen);
    }
}
