//! # Starvation Monitor
//!
//! One-shot deferred timer that fires when decode has not made progress for
//! a stream-dependent amount of time. Firing never cancels work; it only
//! escalates to a prefetch request in the player control loop.

use std::future::Future;
use std::time::Duration;

use core_async::sync::CancellationToken;
use core_async::task;
use core_async::time::sleep;

use crate::config::PlayerConfig;
use crate::types::StreamType;

/// Schedules at most one pending starvation callback.
///
/// Re-arming cancels the previous timer first, so a burst of decode
/// completions collapses to a single outstanding timeout.
#[derive(Debug, Default)]
pub struct StarvationMonitor {
    token: Option<CancellationToken>,
}

impl StarvationMonitor {
    pub fn new() -> Self {
        Self { token: None }
    }

    /// Arms the timer. After `timeout`, `on_starved` runs as a posted task
    /// unless [`Self::cancel`] or a re-arm happens first.
    pub fn arm<F, Fut>(&mut self, timeout: Duration, on_starved: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.cancel();

        let token = CancellationToken::new();
        let armed = token.clone();
        task::spawn(async move {
            if armed.run_until_cancelled(sleep(timeout)).await.is_some() {
                on_starved().await;
            }
        });
        self.token = Some(token);
    }

    /// Cancels the outstanding timer, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    /// Whether a timer has been armed and not cancelled since.
    pub fn is_armed(&self) -> bool {
        self.token.is_some()
    }
}

impl Drop for StarvationMonitor {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Computes the starvation timeout for one stream.
///
/// Audio keeps the full buffered window (`max_pts - current`). Video buffers
/// far less, so its headroom to the next unit is scaled by the configured
/// multiplier. Both are floored so freshly buffered jobs get a grace period.
pub fn starvation_timeout(
    stream: StreamType,
    current_time: Duration,
    reference_pts: Duration,
    config: &PlayerConfig,
) -> Duration {
    let headroom = reference_pts.saturating_sub(current_time);
    let estimate = match stream {
        StreamType::Audio => headroom,
        StreamType::Video => headroom * config.video_starvation_multiplier,
    };
    estimate.max(config.starvation_floor)
}
