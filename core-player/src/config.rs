//! # Player Configuration
//!
//! Configuration types for the media-source player.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Player configuration.
///
/// Controls underrun detection timing, the key-frame replay cache, and
/// notification cadence. These values are tuned policy, not correctness
/// constraints; the state machine behaves identically for any valid setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Lower bound for the starvation timer.
    ///
    /// The computed per-stream timeout is never shorter than this, so a job
    /// that just buffered a few milliseconds of data is not immediately
    /// declared starved.
    ///
    /// Default: 20 ms.
    #[serde(default = "default_starvation_floor")]
    pub starvation_floor: Duration,

    /// Multiplier applied to the video starvation estimate.
    ///
    /// Video buffers far less than audio (often a single frame), so the raw
    /// `next_unit_pts - current_time` estimate is scaled up to avoid spurious
    /// underrun handling.
    ///
    /// Default: 2.
    #[serde(default = "default_video_starvation_multiplier")]
    pub video_starvation_multiplier: u32,

    /// Maximum number of consumed access units retained for key-frame replay.
    ///
    /// When a video backend is recreated mid-stream, a replay cache that
    /// still begins at a key frame lets decode resume without asking the
    /// demuxer to re-seek to the previous key frame.
    ///
    /// Default: 30 units (one GOP at typical streaming settings).
    #[serde(default = "default_replay_cache_capacity")]
    pub replay_cache_capacity: usize,

    /// Minimum interval between `TimeUpdate` notifications.
    ///
    /// Decode completions arrive per access unit; this throttles how often
    /// subscribers see clock updates.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_time_update_interval")]
    pub time_update_interval: Duration,

    /// Buffer size for the player event bus.
    ///
    /// Default: 100 events.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            starvation_floor: default_starvation_floor(),
            video_starvation_multiplier: default_video_starvation_multiplier(),
            replay_cache_capacity: default_replay_cache_capacity(),
            time_update_interval: default_time_update_interval(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl PlayerConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Shorter starvation floor for faster underrun recovery
    /// - More frequent time updates
    pub fn low_latency() -> Self {
        Self {
            starvation_floor: Duration::from_millis(10),
            time_update_interval: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Create a configuration optimized for battery life.
    ///
    /// - Longer starvation floor (tolerates brief scheduling hiccups)
    /// - Sparse time updates
    pub fn power_saver() -> Self {
        Self {
            starvation_floor: Duration::from_millis(50),
            time_update_interval: Duration::from_millis(500),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.starvation_floor.is_zero() {
            return Err("starvation_floor must be > 0".to_string());
        }

        if self.video_starvation_multiplier == 0 {
            return Err("video_starvation_multiplier must be >= 1".to_string());
        }

        if self.replay_cache_capacity == 0 {
            return Err("replay_cache_capacity must be > 0".to_string());
        }

        if self.event_buffer_size == 0 {
            return Err("event_buffer_size must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_starvation_floor() -> Duration {
    Duration::from_millis(20)
}

fn default_video_starvation_multiplier() -> u32 {
    2
}

fn default_replay_cache_capacity() -> usize {
    30
}

fn default_time_update_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_event_buffer_size() -> usize {
    100
}
