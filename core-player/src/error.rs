//! # Player Error Types
//!
//! Error types for the media-source playback core.

use thiserror::Error;

/// Errors that can occur while driving playback.
#[derive(Error, Debug)]
pub enum PlayerError {
    // ========================================================================
    // Clock Errors
    // ========================================================================
    /// Clock bounds were supplied in the wrong order.
    #[error("Invalid clock range: lower {lower:?} exceeds upper {upper:?}")]
    InvalidClockRange {
        /// The rejected lower bound.
        lower: std::time::Duration,
        /// The rejected upper bound.
        upper: std::time::Duration,
    },

    // ========================================================================
    // Decoder Errors
    // ========================================================================
    /// A decoder backend could not be created from the current configs.
    #[error("Decoder creation failed: {0}")]
    DecoderCreation(String),

    /// The decoder backend reported an unrecoverable decode failure.
    #[error("Decode error: {0}")]
    Decode(String),

    // ========================================================================
    // Demuxer Errors
    // ========================================================================
    /// The demuxer delivered data the player cannot interpret.
    #[error("Demuxer error: {0}")]
    Demuxer(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// The supplied configuration failed validation.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlayerError {
    /// Returns `true` if this error puts the player into its terminal error
    /// state.
    ///
    /// Recoverable conditions (missing key, missing surface, starvation) are
    /// not represented as errors at all; parked jobs resume through state
    /// machine events.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlayerError::Decode(_) | PlayerError::DecoderCreation(_) | PlayerError::Demuxer(_)
        )
    }
}

/// Result type for player operations.
pub type Result<T> = std::result::Result<T, PlayerError>;
