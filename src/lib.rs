//! # Media Source Playback Workspace
//!
//! Facade crate for the media-source playback workspace. Host applications
//! depend on this package and enable the documented features instead of
//! wiring the individual member crates by hand.
//!
//! ## Features
//!
//! - `player` (default): the playback core ([`player`]) and its runtime
//!   support layer ([`runtime`]: events, logging, shared error types).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use msp_workspace::player::{PlayerConfig, SourcePlayer};
//! use msp_workspace::runtime::events::PlayerEvent;
//!
//! let player = SourcePlayer::new(demuxer, factory, PlayerConfig::default())?;
//! let mut events = player.subscribe();
//! player.start();
//! ```

#[cfg(feature = "player")]
pub use core_player as player;

#[cfg(feature = "player")]
pub use core_runtime as runtime;
