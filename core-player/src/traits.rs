//! # Collaborator Interfaces
//!
//! Traits at the seams between the playback core and its host-provided
//! collaborators: the demuxer, per-stream decoder backends, and the content
//! decryption module.
//!
//! ## Overview
//!
//! Every interface is asynchronous in effect even when its methods are plain
//! `fn`: requests are fire-and-forget and results always arrive later through
//! the corresponding callback trait. The player never blocks on a
//! collaborator.
//!
//! ```text
//! ┌──────────────┐ request_data/request_seek ┌─────────┐
//! │ SourcePlayer ├──────────────────────────>│ Demuxer │
//! │ (DemuxerClient)<──────────────────────────┤         │
//! └──────┬───────┘   on_demuxer_* callbacks  └─────────┘
//!        │ decode (spawned)
//!        v
//! ┌────────────────┐
//! │ DecoderBackend │  one per configured stream, rebuilt on
//! └────────────────┘  surface/config changes
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::error::Result;
use crate::types::{
    AccessUnit, AudioConfigs, DecodeResult, DecryptionContext, DemuxerConfigs, DemuxerData,
    SeekKind, StreamType, VideoConfigs, VideoSurface,
};

// ============================================================================
// Demuxer
// ============================================================================

/// Pull-based demuxer surface.
///
/// All methods are fire-and-forget; responses arrive via [`DemuxerClient`].
/// At most one data request per stream is outstanding at a time, and at most
/// one seek request overall. The player upholds both limits.
pub trait Demuxer: Send + Sync {
    /// Wires the callback target. Called once during player construction.
    fn initialize(&self, client: Weak<dyn DemuxerClient>);

    /// Asks for the next batch of access units for `stream`.
    ///
    /// Answered by [`DemuxerClient::on_demuxer_data_available`].
    fn request_data(&self, stream: StreamType);

    /// Asks the demuxer to reposition.
    ///
    /// Answered by [`DemuxerClient::on_demuxer_seek_done`]. For
    /// [`SeekKind::KeyFrameSync`] the demuxer snaps to the nearest preceding
    /// key frame and reports the granted position.
    fn request_seek(&self, time: Duration, kind: SeekKind);
}

/// Callbacks from the demuxer into the player.
///
/// Implemented by `SourcePlayer`. Every callback re-enters the player control
/// context, so implementations must tolerate arriving in any player state,
/// including after `release()`.
#[async_trait]
pub trait DemuxerClient: Send + Sync {
    /// Stream configurations became available (initial metadata).
    async fn on_demuxer_configs_available(&self, configs: DemuxerConfigs);

    /// A previously requested data batch arrived.
    async fn on_demuxer_data_available(&self, data: DemuxerData);

    /// The media duration changed mid-stream.
    async fn on_demuxer_duration_changed(&self, duration: Duration);

    /// An outstanding seek was granted.
    ///
    /// `actual_time` carries the snapped position for key-frame sync seeks
    /// and is `None` for accurate seeks.
    async fn on_demuxer_seek_done(&self, actual_time: Option<Duration>);
}

// ============================================================================
// Decoder Backend
// ============================================================================

/// A physical decoder for one elementary stream.
///
/// The player submits exactly one access unit at a time and awaits the
/// result before submitting the next. Backends are created lazily by a
/// [`DecoderBackendFactory`] once configs, surface (video), and decryption
/// context (encrypted streams) are all available, and are torn down on
/// surface changes, incompatible config changes, and release.
#[async_trait]
pub trait DecoderBackend: Send + Sync {
    /// Decodes one access unit.
    ///
    /// `render` is `false` while the job is prerolling after a seek; output
    /// is produced and timed but must not be presented. Submitting an
    /// end-of-stream unit drains the codec and resolves to
    /// [`DecodeResult::EndOfStream`].
    async fn decode(&self, unit: AccessUnit, render: bool) -> DecodeResult;

    /// Discards all queued input and output.
    async fn flush(&self);

    /// Whether this backend can absorb resolution changes without being
    /// rebuilt. Only meaningful for video.
    fn supports_adaptive_playback(&self) -> bool {
        false
    }
}

/// Creates decoder backends on demand.
///
/// Creation failures are fatal: the configs were present and valid enough to
/// attempt creation, so a refusal means the platform cannot play this stream.
pub trait DecoderBackendFactory: Send + Sync {
    /// Builds an audio backend.
    fn create_audio(
        &self,
        configs: &AudioConfigs,
        crypto: Option<DecryptionContext>,
    ) -> Result<Arc<dyn DecoderBackend>>;

    /// Builds a video backend rendering into `surface`.
    fn create_video(
        &self,
        configs: &VideoConfigs,
        surface: VideoSurface,
        crypto: Option<DecryptionContext>,
    ) -> Result<Arc<dyn DecoderBackend>>;
}

// ============================================================================
// Content Decryption
// ============================================================================

/// Host-side content decryption module.
pub trait ContentDecryptionModule: Send + Sync {
    /// Registers the player for key lifecycle callbacks.
    ///
    /// Returns a registration id for [`Self::unregister_listener`].
    fn register_listener(&self, listener: Weak<dyn CdmListener>) -> u32;

    /// Drops a previous registration. Idempotent.
    fn unregister_listener(&self, registration_id: u32);

    /// The current decryption context, if the CDM is ready to serve decoders.
    fn decryption_context(&self) -> Option<DecryptionContext>;
}

/// Key lifecycle callbacks from the CDM into the player.
#[async_trait]
pub trait CdmListener: Send + Sync {
    /// A new usable key was added to the session.
    async fn on_key_added(&self);

    /// The decryption context became available for decoder creation.
    async fn on_decryption_context_ready(&self);

    /// The CDM was detached; encrypted decode must stop.
    async fn on_cdm_unset(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        pub Mux {}

        impl Demuxer for Mux {
            fn initialize(&self, client: Weak<dyn DemuxerClient>);
            fn request_data(&self, stream: StreamType);
            fn request_seek(&self, time: Duration, kind: SeekKind);
        }
    }

    #[test]
    fn demuxer_mock_observes_requests() {
        let mut demuxer = MockMux::new();
        demuxer
            .expect_request_data()
            .with(eq(StreamType::Audio))
            .times(1)
            .return_const(());
        demuxer
            .expect_request_seek()
            .with(eq(Duration::from_millis(500)), eq(SeekKind::Accurate))
            .times(1)
            .return_const(());

        demuxer.request_data(StreamType::Audio);
        demuxer.request_seek(Duration::from_millis(500), SeekKind::Accurate);
    }

    struct NonAdaptiveBackend;

    #[async_trait]
    impl DecoderBackend for NonAdaptiveBackend {
        async fn decode(&self, unit: AccessUnit, _render: bool) -> DecodeResult {
            DecodeResult::Ok {
                pts: unit.timestamp,
                video_size: None,
            }
        }

        async fn flush(&self) {}
    }

    #[core_async::test]
    async fn backend_defaults_to_non_adaptive() {
        let backend = NonAdaptiveBackend;
        assert!(!backend.supports_adaptive_playback());

        let result = backend
            .decode(AccessUnit::ok(vec![0u8], Duration::from_millis(30)), true)
            .await;
        assert_eq!(
            result,
            DecodeResult::Ok {
                pts: Duration::from_millis(30),
                video_size: None,
            }
        );
    }
}
