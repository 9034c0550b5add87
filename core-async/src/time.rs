//! Time-related abstractions.
//!
//! Re-exports `tokio::time` for sleeping and timeouts alongside the standard
//! library clock types. `Instant` is monotonic and suitable for measuring
//! elapsed playback time.

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant};
