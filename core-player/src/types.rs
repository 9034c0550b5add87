//! # Playback Data Model
//!
//! Core value types exchanged between the player, its decoder jobs, and the
//! demuxer: access units, stream configurations, seek modes, and the pending
//! event bitmask that drives the player control loop.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Streams
// ============================================================================

/// The two elementary stream kinds the player coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    Audio,
    Video,
}

impl StreamType {
    /// Short lowercase name for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Audio => "audio",
            StreamType::Video => "video",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Access Units
// ============================================================================

/// Classification of a demuxed access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessUnitStatus {
    /// Ordinary encoded frame carrying payload data.
    Ok,
    /// Stream parameters changed; fresh configs accompany the batch.
    ConfigChanged,
    /// The stream is finished; no payload follows.
    EndOfStream,
    /// The pending demuxer read was cancelled (typically by a seek).
    /// Absorbed silently by the consuming job.
    Aborted,
}

/// One demuxed encoded frame plus its metadata.
///
/// Ownership transfers from the demuxer response into the decoder job's input
/// queue, and from there into the decoder backend when submitted.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// What this unit represents.
    pub status: AccessUnitStatus,
    /// Encoded payload. Empty for non-`Ok` units.
    pub data: Bytes,
    /// Presentation timestamp.
    pub timestamp: Duration,
    /// Whether decode can restart from this unit.
    pub is_key_frame: bool,
}

impl AccessUnit {
    /// An ordinary encoded frame.
    pub fn ok(data: impl Into<Bytes>, timestamp: Duration) -> Self {
        Self {
            status: AccessUnitStatus::Ok,
            data: data.into(),
            timestamp,
            is_key_frame: false,
        }
    }

    /// An ordinary frame that is also a key frame.
    pub fn key_frame(data: impl Into<Bytes>, timestamp: Duration) -> Self {
        Self {
            is_key_frame: true,
            ..Self::ok(data, timestamp)
        }
    }

    /// An end-of-stream marker.
    pub fn end_of_stream() -> Self {
        Self {
            status: AccessUnitStatus::EndOfStream,
            data: Bytes::new(),
            timestamp: Duration::ZERO,
            is_key_frame: false,
        }
    }

    /// A config-change marker.
    pub fn config_changed() -> Self {
        Self {
            status: AccessUnitStatus::ConfigChanged,
            data: Bytes::new(),
            timestamp: Duration::ZERO,
            is_key_frame: false,
        }
    }

    /// An aborted-read marker.
    pub fn aborted() -> Self {
        Self {
            status: AccessUnitStatus::Aborted,
            data: Bytes::new(),
            timestamp: Duration::ZERO,
            is_key_frame: false,
        }
    }
}

// ============================================================================
// Stream Configurations
// ============================================================================

/// Decoded video dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Audio stream parameters required to build an audio decoder backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfigs {
    /// Codec identifier (e.g. "aac", "opus").
    pub codec: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channel_count: u32,
    /// Whether the stream payload is encrypted.
    pub is_encrypted: bool,
    /// Codec-specific initialization data.
    pub extra_data: Bytes,
}

/// Video stream parameters required to build a video decoder backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConfigs {
    /// Codec identifier (e.g. "h264", "vp9").
    pub codec: String,
    /// Coded frame dimensions.
    pub size: VideoSize,
    /// Whether the stream payload is encrypted.
    pub is_encrypted: bool,
    /// Codec-specific initialization data.
    pub extra_data: Bytes,
}

/// The full configuration snapshot delivered by the demuxer.
///
/// Either stream may be absent; the player only drives jobs for streams that
/// are configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxerConfigs {
    pub audio: Option<AudioConfigs>,
    pub video: Option<VideoConfigs>,
    /// Total media duration.
    pub duration: Duration,
}

impl DemuxerConfigs {
    /// Builds an audio-only snapshot with typical defaults.
    pub fn audio_only(audio: AudioConfigs, duration: Duration) -> Self {
        Self {
            audio: Some(audio),
            video: None,
            duration,
        }
    }

    /// Builds a video-only snapshot.
    pub fn video_only(video: VideoConfigs, duration: Duration) -> Self {
        Self {
            audio: None,
            video: Some(video),
            duration,
        }
    }

    /// Returns `true` if the named stream is present.
    pub fn has_stream(&self, stream: StreamType) -> bool {
        match stream {
            StreamType::Audio => self.audio.is_some(),
            StreamType::Video => self.video.is_some(),
        }
    }
}

/// One batch of demuxed data for a single stream.
#[derive(Debug, Clone)]
pub struct DemuxerData {
    /// Which stream this batch belongs to.
    pub stream: StreamType,
    /// The demuxed units, in decode order.
    pub access_units: Vec<AccessUnit>,
    /// Fresh configs, present when the batch contains a
    /// [`AccessUnitStatus::ConfigChanged`] unit.
    pub demuxer_configs: Option<DemuxerConfigs>,
}

impl DemuxerData {
    pub fn new(stream: StreamType, access_units: Vec<AccessUnit>) -> Self {
        Self {
            stream,
            access_units,
            demuxer_configs: None,
        }
    }

    pub fn with_configs(mut self, configs: DemuxerConfigs) -> Self {
        self.demuxer_configs = Some(configs);
        self
    }
}

// ============================================================================
// Seeking
// ============================================================================

/// How the demuxer should position a requested seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekKind {
    /// Seek precisely to the requested timestamp. Issued for external seeks;
    /// decode output before the target is prerolled away.
    Accurate,
    /// Snap to the nearest preceding key frame and report the granted
    /// position. Issued internally when a video backend is recreated
    /// mid-stream and no cached key frame can restart decode.
    KeyFrameSync,
}

// ============================================================================
// Surfaces & Decryption
// ============================================================================

/// Opaque handle to a presentation surface owned by the host.
///
/// The player never interprets the handle; it only tracks identity to decide
/// whether a video backend must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSurface {
    pub id: u32,
}

impl VideoSurface {
    pub fn new(id: u32) -> Self {
        Self { id }
    }
}

/// Opaque decryption context minted by the CDM.
///
/// Required to build a decoder backend for an encrypted stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptionContext {
    pub id: u64,
}

impl DecryptionContext {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

// ============================================================================
// Decode Results
// ============================================================================

/// Outcome of submitting one access unit to a decoder backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// The unit decoded successfully.
    Ok {
        /// Presentation timestamp of the decoded output.
        pts: Duration,
        /// Output dimensions, reported by video backends when they change.
        video_size: Option<VideoSize>,
    },
    /// The backend consumed an end-of-stream unit and flushed its output.
    EndOfStream {
        /// Presentation timestamp of the final output.
        pts: Duration,
    },
    /// The unit is encrypted and no usable key is loaded. The unit was not
    /// consumed; decode must be retried after a key arrives.
    NoKey,
    /// The decode was stopped before producing output (advisory stop or
    /// aborted input). Not an error.
    Aborted,
    /// Unrecoverable backend failure.
    Error(String),
}

// ============================================================================
// Pending Events
// ============================================================================

/// Bitmask of exclusive transitions awaiting processing by the player
/// control loop.
///
/// Events are drained in fixed priority order (seek, then surface change,
/// then decoder creation, then prefetch request, then prefetch done) and
/// only when no decode is in flight on either job.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingEventSet(u8);

impl PendingEventSet {
    pub const SEEK: u8 = 1 << 0;
    pub const SURFACE_CHANGE: u8 = 1 << 1;
    pub const DECODER_CREATION: u8 = 1 << 2;
    pub const PREFETCH_REQUEST: u8 = 1 << 3;
    pub const PREFETCH_DONE: u8 = 1 << 4;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn set(&mut self, event: u8) {
        self.0 |= event;
    }

    pub fn clear(&mut self, event: u8) {
        self.0 &= !event;
    }

    pub fn contains(&self, event: u8) -> bool {
        self.0 & event != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for PendingEventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::SEEK) {
            names.push("seek");
        }
        if self.contains(Self::SURFACE_CHANGE) {
            names.push("surface_change");
        }
        if self.contains(Self::DECODER_CREATION) {
            names.push("decoder_creation");
        }
        if self.contains(Self::PREFETCH_REQUEST) {
            names.push("prefetch_request");
        }
        if self.contains(Self::PREFETCH_DONE) {
            names.push("prefetch_done");
        }
        write!(f, "PendingEventSet({})", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_unit_constructors() {
        let unit = AccessUnit::ok(vec![1, 2, 3], Duration::from_millis(30));
        assert_eq!(unit.status, AccessUnitStatus::Ok);
        assert_eq!(unit.data.len(), 3);
        assert!(!unit.is_key_frame);

        let key = AccessUnit::key_frame(vec![9], Duration::ZERO);
        assert!(key.is_key_frame);

        let eos = AccessUnit::end_of_stream();
        assert_eq!(eos.status, AccessUnitStatus::EndOfStream);
        assert!(eos.data.is_empty());
    }

    #[test]
    fn demuxer_configs_stream_presence() {
        let configs = DemuxerConfigs::audio_only(
            AudioConfigs {
                codec: "aac".to_string(),
                sample_rate: 44100,
                channel_count: 2,
                is_encrypted: false,
                extra_data: Bytes::new(),
            },
            Duration::from_secs(120),
        );
        assert!(configs.has_stream(StreamType::Audio));
        assert!(!configs.has_stream(StreamType::Video));
    }

    #[test]
    fn pending_event_set_operations() {
        let mut events = PendingEventSet::new();
        assert!(events.is_empty());

        events.set(PendingEventSet::SEEK);
        events.set(PendingEventSet::PREFETCH_REQUEST);
        assert!(events.contains(PendingEventSet::SEEK));
        assert!(events.contains(PendingEventSet::PREFETCH_REQUEST));
        assert!(!events.contains(PendingEventSet::SURFACE_CHANGE));

        events.clear(PendingEventSet::SEEK);
        assert!(!events.contains(PendingEventSet::SEEK));
        assert!(!events.is_empty());

        events.clear(PendingEventSet::PREFETCH_REQUEST);
        assert!(events.is_empty());
    }

    #[test]
    fn pending_event_set_debug_names() {
        let mut events = PendingEventSet::new();
        events.set(PendingEventSet::SEEK);
        events.set(PendingEventSet::PREFETCH_DONE);
        let rendered = format!("{:?}", events);
        assert!(rendered.contains("seek"));
        assert!(rendered.contains("prefetch_done"));
    }
}
