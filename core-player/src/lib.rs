//! # Core Player
//!
//! Media-source playback core: a single-control-loop player that pulls
//! demuxed access units from a host-provided demuxer, drives one decoder
//! backend per elementary stream, and keeps an interpolating presentation
//! clock anchored to decoded output.
//!
//! ## Architecture
//!
//! - [`player::SourcePlayer`]: the orchestrator. Owns all mutable state and
//!   serializes every transition through one mutex and a pending-event set.
//! - [`job::DecoderJob`]: per-stream decode state machine (input queue,
//!   prefetch, preroll, drain, key-frame replay cache).
//! - [`clock::PresentationClock`]: the shared playback clock.
//! - [`starvation::StarvationMonitor`]: underrun detection timer.
//! - [`traits`]: the seams to host collaborators (demuxer, decoder backend
//!   factory, CDM).
//!
//! Notifications flow out through the `core-runtime` event bus as
//! [`core_runtime::events::PlayerEvent`]s.

pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod player;
pub mod starvation;
pub mod traits;
pub mod types;

pub use clock::PresentationClock;
pub use config::PlayerConfig;
pub use error::{PlayerError, Result};
pub use job::{DecoderJob, JobProgress};
pub use player::SourcePlayer;
pub use starvation::StarvationMonitor;
pub use traits::{
    CdmListener, ContentDecryptionModule, DecoderBackend, DecoderBackendFactory, Demuxer,
    DemuxerClient,
};
pub use types::{
    AccessUnit, AccessUnitStatus, AudioConfigs, DecodeResult, DecryptionContext, DemuxerConfigs,
    DemuxerData, PendingEventSet, SeekKind, StreamType, VideoConfigs, VideoSize, VideoSurface,
};
