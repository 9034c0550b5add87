//! # Decoder Job
//!
//! Per-stream decode state machine. One `DecoderJob` instance drives the
//! audio stream and one the video stream; the stream kind plus the backend
//! supplied by the factory provide all mode-specific behavior, so there is a
//! single job type rather than per-stream subtypes.
//!
//! The job is deliberately pure: it owns the input queue, prefetch and drain
//! sub-states, preroll progress, and the key-frame replay cache, but performs
//! no I/O. Each call to [`DecoderJob::decode`] returns a [`DecodeAction`]
//! telling the player control loop what to do (submit a unit to the backend,
//! request demuxer data, build a backend, or force a key-frame resync), and
//! [`DecoderJob::on_decode_done`] folds the completion back in and reports
//! [`JobProgress`]. This keeps every transition synchronous under the
//! player's state lock and directly testable.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::traits::DecoderBackend;
use crate::types::{
    AccessUnit, AccessUnitStatus, AudioConfigs, DecodeResult, DemuxerConfigs, StreamType,
    VideoConfigs,
};

// ============================================================================
// Job State
// ============================================================================

/// Coarse decode phase. Preroll and waiting-for-key are orthogonal flags
/// carried alongside, since both persist across several phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No decode in flight and no prefetch outstanding.
    Idle,
    /// Waiting for buffered data before decode can (re)start.
    Prefetching,
    /// Exactly one access unit submitted to the backend.
    Decoding,
    /// An end-of-stream unit was submitted to flush the backend ahead of an
    /// incompatible config change.
    Draining,
}

/// Per-stream configuration held by the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamConfigs {
    Audio(AudioConfigs),
    Video(VideoConfigs),
}

impl StreamConfigs {
    /// Whether the stream payload requires a decryption context.
    pub fn is_encrypted(&self) -> bool {
        match self {
            StreamConfigs::Audio(c) => c.is_encrypted,
            StreamConfigs::Video(c) => c.is_encrypted,
        }
    }
}

// ============================================================================
// Actions & Progress
// ============================================================================

/// What the control loop must do next for this job.
pub enum DecodeAction {
    /// Submit `unit` to `backend` as a spawned task and report the result
    /// through [`DecoderJob::on_decode_done`].
    Submit {
        backend: Arc<dyn DecoderBackend>,
        unit: AccessUnit,
        render: bool,
    },
    /// The queue is empty; issue a demuxer data request.
    RequestData,
    /// A backend must be created from the current configs before decode can
    /// continue.
    CreateBackend,
    /// Decode must restart from a key frame, none is cached, and the head of
    /// the queue is not one; a key-frame resync seek is required.
    KeyFrameRequired,
    /// A config-change marker was consumed without needing a drain. The
    /// demuxer owes this stream a follow-up data request.
    ConfigApplied,
    /// The unit resolved without touching the backend (aborted input, or
    /// end-of-stream with no backend alive). Post `result` as this job's
    /// decode completion.
    Complete(DecodeResult),
    /// Nothing to do: decode in flight, waiting on data or key, finished, or
    /// parked.
    Idle,
}

/// Result of folding a decode completion into the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobProgress {
    /// A unit decoded; `pts` anchors the clock when this job manages it.
    Decoded { pts: Duration, rendered: bool },
    /// Output end-of-stream reached.
    Finished,
    /// A drain completed; new configs are applied and the backend was torn
    /// down for recreation.
    ConfigsApplied,
    /// The decode stopped without output (aborted input or advisory stop).
    Stopped,
    /// The unit was encrypted and no key is usable; the unit was requeued
    /// and the job is parked until a key arrives.
    WaitingForKey,
    /// Deferred resource release completed.
    Released,
    /// Unrecoverable backend failure.
    Failed(String),
}

/// Outcome of a prefetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchAction {
    /// Data must be requested from the demuxer.
    RequestData,
    /// A data request is already outstanding; wait for it.
    AwaitingData,
    /// The queue already holds data (or the stream already finished); the
    /// prefetch completion must be posted, never invoked inline.
    AlreadyBuffered,
}

// ============================================================================
// Decoder Job
// ============================================================================

pub struct DecoderJob {
    stream: StreamType,
    state: JobState,
    configs: Option<StreamConfigs>,

    queue: VecDeque<AccessUnit>,
    in_flight: Option<AccessUnit>,
    data_requested: bool,
    pending_configs: Option<DemuxerConfigs>,

    backend: Option<Arc<dyn DecoderBackend>>,
    backends_created: usize,

    // Replay cache: units consumed since the most recent key frame, used to
    // restart a recreated backend without a resync seek.
    replay_cache: VecDeque<AccessUnit>,
    replay_capacity: usize,
    replay_anchored: bool,

    prerolling: bool,
    preroll_target: Duration,

    input_eos: bool,
    output_eos: bool,

    stop_requested: bool,
    release_on_decode_done: bool,
    waiting_for_key: bool,
    key_added_while_decoding: bool,

    consumed_since_flush: usize,
    needs_key_frame_resume: bool,
}

impl DecoderJob {
    pub fn new(stream: StreamType, replay_capacity: usize) -> Self {
        Self {
            stream,
            state: JobState::Idle,
            configs: None,
            queue: VecDeque::new(),
            in_flight: None,
            data_requested: false,
            pending_configs: None,
            backend: None,
            backends_created: 0,
            replay_cache: VecDeque::new(),
            replay_capacity,
            replay_anchored: false,
            prerolling: false,
            preroll_target: Duration::ZERO,
            input_eos: false,
            output_eos: false,
            stop_requested: false,
            release_on_decode_done: false,
            waiting_for_key: false,
            key_added_while_decoding: false,
            consumed_since_flush: 0,
            needs_key_frame_resume: false,
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn stream(&self) -> StreamType {
        self.stream
    }

    pub fn is_decoding(&self) -> bool {
        matches!(self.state, JobState::Decoding | JobState::Draining)
    }

    pub fn is_prefetching(&self) -> bool {
        self.state == JobState::Prefetching
    }

    pub fn has_data(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn is_requesting_data(&self) -> bool {
        self.data_requested
    }

    /// Input and output both reached end-of-stream.
    pub fn is_finished(&self) -> bool {
        self.output_eos
    }

    pub fn is_prerolling(&self) -> bool {
        self.prerolling
    }

    pub fn preroll_target(&self) -> Duration {
        self.preroll_target
    }

    pub fn is_waiting_for_key(&self) -> bool {
        self.waiting_for_key
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<Arc<dyn DecoderBackend>> {
        self.backend.clone()
    }

    pub fn backends_created(&self) -> usize {
        self.backends_created
    }

    pub fn has_configs(&self) -> bool {
        self.configs.is_some()
    }

    pub fn configs(&self) -> Option<&StreamConfigs> {
        self.configs.as_ref()
    }

    /// Whether this job needs a decryption context before decode.
    pub fn is_content_encrypted(&self) -> bool {
        self.configs.as_ref().is_some_and(|c| c.is_encrypted())
    }

    /// Presentation timestamp of the next queued payload unit.
    pub fn next_unit_pts(&self) -> Option<Duration> {
        self.queue
            .iter()
            .find(|u| u.status == AccessUnitStatus::Ok)
            .map(|u| u.timestamp)
    }

    /// Largest presentation timestamp buffered in the queue.
    pub fn max_buffered_pts(&self) -> Option<Duration> {
        self.queue
            .iter()
            .filter(|u| u.status == AccessUnitStatus::Ok)
            .map(|u| u.timestamp)
            .max()
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn set_configs(&mut self, configs: StreamConfigs) {
        self.configs = Some(configs);
    }

    /// Attaches a freshly created backend. Never called while decoding.
    pub fn attach_backend(&mut self, backend: Arc<dyn DecoderBackend>) {
        debug_assert!(!self.is_decoding());
        self.backend = Some(backend);
        self.backends_created += 1;
    }

    // ------------------------------------------------------------------
    // Data path
    // ------------------------------------------------------------------

    /// Folds a demuxer data batch in. Returns `true` if an outstanding
    /// prefetch was satisfied by this batch.
    pub fn on_data_received(&mut self, units: Vec<AccessUnit>, configs: Option<DemuxerConfigs>) -> bool {
        self.data_requested = false;
        if let Some(configs) = configs {
            self.pending_configs = Some(configs);
        }
        self.queue.extend(units);

        if self.state == JobState::Prefetching {
            self.state = JobState::Idle;
            return true;
        }
        false
    }

    /// Begins a prefetch cycle.
    pub fn prefetch(&mut self) -> PrefetchAction {
        if self.has_data() || self.is_finished() {
            return PrefetchAction::AlreadyBuffered;
        }
        self.state = JobState::Prefetching;
        if self.data_requested {
            return PrefetchAction::AwaitingData;
        }
        self.data_requested = true;
        PrefetchAction::RequestData
    }

    // ------------------------------------------------------------------
    // Decode path
    // ------------------------------------------------------------------

    /// Advances the state machine by one unit.
    pub fn decode(&mut self) -> DecodeAction {
        if self.is_decoding() || self.output_eos || self.waiting_for_key {
            return DecodeAction::Idle;
        }

        let Some(head) = self.queue.front() else {
            if self.input_eos || self.data_requested {
                return DecodeAction::Idle;
            }
            self.data_requested = true;
            return DecodeAction::RequestData;
        };

        match head.status {
            AccessUnitStatus::Aborted => {
                self.queue.pop_front();
                self.state = JobState::Decoding;
                DecodeAction::Complete(DecodeResult::Aborted)
            }
            AccessUnitStatus::ConfigChanged => self.begin_config_change(),
            AccessUnitStatus::EndOfStream => {
                self.input_eos = true;
                match &self.backend {
                    Some(backend) => {
                        let unit = self.queue.pop_front().expect("head checked above");
                        self.state = JobState::Decoding;
                        DecodeAction::Submit {
                            backend: Arc::clone(backend),
                            unit,
                            render: false,
                        }
                    }
                    None => {
                        // Nothing was ever decoded; the stream completes
                        // without a backend.
                        self.queue.pop_front();
                        self.state = JobState::Decoding;
                        DecodeAction::Complete(DecodeResult::EndOfStream {
                            pts: Duration::ZERO,
                        })
                    }
                }
            }
            AccessUnitStatus::Ok => {
                if self.backend.is_none() {
                    if self.needs_key_frame_resume {
                        if self.replay_anchored && !self.replay_cache.is_empty() {
                            // Splice the cached run (starting at a key frame)
                            // back in front of the queue.
                            while let Some(unit) = self.replay_cache.pop_back() {
                                self.queue.push_front(unit);
                            }
                            self.replay_anchored = false;
                            self.needs_key_frame_resume = false;
                            debug!(stream = %self.stream, "resuming from cached key frame");
                        } else if head.is_key_frame {
                            self.needs_key_frame_resume = false;
                        } else {
                            return DecodeAction::KeyFrameRequired;
                        }
                    }
                    return DecodeAction::CreateBackend;
                }

                let unit = self.queue.pop_front().expect("head checked above");
                let render = !self.prerolling;
                self.state = JobState::Decoding;
                self.in_flight = Some(unit.clone());
                DecodeAction::Submit {
                    backend: Arc::clone(self.backend.as_ref().expect("checked above")),
                    unit,
                    render,
                }
            }
        }
    }

    fn begin_config_change(&mut self) -> DecodeAction {
        self.queue.pop_front();
        let adaptive = self
            .backend
            .as_ref()
            .is_some_and(|b| b.supports_adaptive_playback());
        let unchanged = self.pending_configs_match_current();

        if self.backend.is_some() && !adaptive && !unchanged {
            // Flush the old parameters through the codec before teardown.
            self.state = JobState::Draining;
            return DecodeAction::Submit {
                backend: Arc::clone(self.backend.as_ref().expect("checked above")),
                unit: AccessUnit::end_of_stream(),
                render: false,
            };
        }

        self.apply_pending_configs();
        DecodeAction::ConfigApplied
    }

    fn pending_configs_match_current(&self) -> bool {
        let Some(pending) = &self.pending_configs else {
            return true;
        };
        match (&self.configs, self.stream) {
            (Some(StreamConfigs::Audio(old)), StreamType::Audio) => {
                pending.audio.as_ref() == Some(old)
            }
            (Some(StreamConfigs::Video(old)), StreamType::Video) => {
                pending.video.as_ref() == Some(old)
            }
            _ => false,
        }
    }

    fn apply_pending_configs(&mut self) {
        let Some(pending) = self.pending_configs.take() else {
            return;
        };
        match self.stream {
            StreamType::Audio => {
                if let Some(audio) = pending.audio {
                    self.configs = Some(StreamConfigs::Audio(audio));
                }
            }
            StreamType::Video => {
                if let Some(video) = pending.video {
                    self.configs = Some(StreamConfigs::Video(video));
                }
            }
        }
    }

    /// Folds a decode completion back into the job.
    pub fn on_decode_done(&mut self, result: DecodeResult) -> JobProgress {
        let was_draining = self.state == JobState::Draining;
        self.state = JobState::Idle;
        let in_flight = self.in_flight.take();

        if self.release_on_decode_done {
            self.release_on_decode_done = false;
            self.stop_requested = false;
            self.teardown_backend();
            return JobProgress::Released;
        }

        if self.stop_requested {
            self.stop_requested = false;
            if matches!(result, DecodeResult::Error(_)) {
                // Errors outrank the advisory stop.
            } else {
                return JobProgress::Stopped;
            }
        }

        match result {
            DecodeResult::Ok { pts, .. } => {
                if let Some(unit) = in_flight {
                    self.cache_for_replay(unit);
                }
                self.consumed_since_flush += 1;
                let rendered = !self.prerolling;
                if self.prerolling && pts >= self.preroll_target {
                    self.prerolling = false;
                }
                JobProgress::Decoded { pts, rendered }
            }
            DecodeResult::EndOfStream { .. } if was_draining => {
                self.teardown_backend();
                self.apply_pending_configs();
                self.input_eos = false;
                JobProgress::ConfigsApplied
            }
            DecodeResult::EndOfStream { .. } => {
                self.output_eos = true;
                JobProgress::Finished
            }
            DecodeResult::NoKey => {
                // The unit was not consumed; put it back for the retry.
                if let Some(unit) = in_flight {
                    self.queue.push_front(unit);
                }
                if self.key_added_while_decoding {
                    self.key_added_while_decoding = false;
                    JobProgress::Stopped
                } else {
                    self.waiting_for_key = true;
                    JobProgress::WaitingForKey
                }
            }
            DecodeResult::Aborted => JobProgress::Stopped,
            DecodeResult::Error(message) => JobProgress::Failed(message),
        }
    }

    fn cache_for_replay(&mut self, unit: AccessUnit) {
        if unit.is_key_frame {
            self.replay_cache.clear();
            self.replay_anchored = true;
        }
        if !self.replay_anchored {
            return;
        }
        if self.replay_cache.len() >= self.replay_capacity {
            // Cache overflowed the configured GOP budget; it no longer
            // starts at a usable key frame boundary.
            self.replay_cache.clear();
            self.replay_anchored = false;
            return;
        }
        self.replay_cache.push_back(unit);
    }

    // ------------------------------------------------------------------
    // Preroll
    // ------------------------------------------------------------------

    /// Starts prerolling toward `target`. Output before the target is
    /// decoded but not rendered.
    pub fn begin_prerolling(&mut self, target: Duration) {
        self.prerolling = true;
        self.preroll_target = target;
    }

    // ------------------------------------------------------------------
    // Key lifecycle
    // ------------------------------------------------------------------

    /// A usable key arrived. Returns `true` if the job was parked and can
    /// now resume decode.
    pub fn on_key_added(&mut self) -> bool {
        if self.waiting_for_key {
            self.waiting_for_key = false;
            return true;
        }
        if self.is_decoding() {
            // Completion races the key; retry immediately once it lands.
            self.key_added_while_decoding = true;
        }
        false
    }

    // ------------------------------------------------------------------
    // Stop / flush / release
    // ------------------------------------------------------------------

    /// Advisory stop. The in-flight completion still fires and is awaited.
    pub fn stop_decode(&mut self) {
        if self.is_decoding() {
            self.stop_requested = true;
        }
    }

    /// Clears all buffered data and end-of-stream latches. Only legal while
    /// no decode is in flight.
    pub fn flush(&mut self) {
        debug_assert!(!self.is_decoding());
        self.queue.clear();
        self.replay_cache.clear();
        self.replay_anchored = false;
        self.pending_configs = None;
        self.input_eos = false;
        self.output_eos = false;
        self.consumed_since_flush = 0;
        self.needs_key_frame_resume = false;
        if self.state == JobState::Prefetching {
            self.state = JobState::Idle;
        }
    }

    /// Releases the backend, deferring until the in-flight decode completes.
    ///
    /// Returns `true` if the release happened immediately.
    pub fn release_resources(&mut self) -> bool {
        if self.is_decoding() {
            self.release_on_decode_done = true;
            return false;
        }
        self.teardown_backend();
        true
    }

    /// Drops the backend without touching queued data. Used for surface
    /// changes, where decode continues through a fresh backend.
    pub fn release_backend(&mut self) {
        debug_assert!(!self.is_decoding());
        self.teardown_backend();
    }

    fn teardown_backend(&mut self) {
        if self.backend.take().is_some()
            && self.stream == StreamType::Video
            && self.consumed_since_flush > 0
        {
            // The codec died mid-GOP; decode can only restart from a key
            // frame (cached, queued, or via a resync seek).
            self.needs_key_frame_resume = true;
        }
    }
}

impl std::fmt::Debug for DecoderJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderJob")
            .field("stream", &self.stream)
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("has_backend", &self.backend.is_some())
            .field("prerolling", &self.prerolling)
            .field("output_eos", &self.output_eos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct NullBackend {
        adaptive: bool,
    }

    #[async_trait]
    impl DecoderBackend for NullBackend {
        async fn decode(&self, unit: AccessUnit, _render: bool) -> DecodeResult {
            DecodeResult::Ok {
                pts: unit.timestamp,
                video_size: None,
            }
        }

        async fn flush(&self) {}

        fn supports_adaptive_playback(&self) -> bool {
            self.adaptive
        }
    }

    fn audio_job() -> DecoderJob {
        let mut job = DecoderJob::new(StreamType::Audio, 30);
        job.set_configs(StreamConfigs::Audio(audio_configs(44100)));
        job
    }

    fn audio_configs(sample_rate: u32) -> AudioConfigs {
        AudioConfigs {
            codec: "aac".to_string(),
            sample_rate,
            channel_count: 2,
            is_encrypted: false,
            extra_data: Bytes::new(),
        }
    }

    fn unit(ms: u64) -> AccessUnit {
        AccessUnit::ok(vec![0u8; 4], Duration::from_millis(ms))
    }

    #[test]
    fn empty_queue_requests_data_once() {
        let mut job = audio_job();
        assert!(matches!(job.decode(), DecodeAction::RequestData));
        assert!(job.is_requesting_data());
        // A second poll must not double-request.
        assert!(matches!(job.decode(), DecodeAction::Idle));
    }

    #[test]
    fn backend_is_created_lazily_on_first_data() {
        let mut job = audio_job();
        job.on_data_received(vec![unit(0)], None);
        assert!(matches!(job.decode(), DecodeAction::CreateBackend));
        assert_eq!(job.backends_created(), 0);

        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        assert_eq!(job.backends_created(), 1);
        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));
        assert!(job.is_decoding());
    }

    #[test]
    fn single_decode_in_flight() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.on_data_received(vec![unit(0), unit(30)], None);

        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));
        // Second poll while in flight does nothing.
        assert!(matches!(job.decode(), DecodeAction::Idle));

        let progress = job.on_decode_done(DecodeResult::Ok {
            pts: Duration::ZERO,
            video_size: None,
        });
        assert!(matches!(progress, JobProgress::Decoded { .. }));
        assert!(!job.is_decoding());
    }

    #[test]
    fn aborted_unit_completes_without_backend() {
        let mut job = audio_job();
        job.on_data_received(vec![AccessUnit::aborted()], None);
        match job.decode() {
            DecodeAction::Complete(DecodeResult::Aborted) => {}
            _ => panic!("aborted unit should complete inline"),
        }
        assert!(job.is_decoding());
        let progress = job.on_decode_done(DecodeResult::Aborted);
        assert_eq!(progress, JobProgress::Stopped);
    }

    #[test]
    fn preroll_clears_at_target() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.begin_prerolling(Duration::from_millis(100));
        job.on_data_received(vec![unit(0), unit(30), unit(60), unit(90), unit(120)], None);

        let mut last_rendered = true;
        for expected_ms in [0u64, 30, 60, 90, 120] {
            match job.decode() {
                DecodeAction::Submit { render, .. } => assert_eq!(render, !job.is_prerolling()),
                _ => panic!("expected submit"),
            }
            let progress = job.on_decode_done(DecodeResult::Ok {
                pts: Duration::from_millis(expected_ms),
                video_size: None,
            });
            match progress {
                JobProgress::Decoded { rendered, .. } => last_rendered = rendered,
                other => panic!("unexpected progress {:?}", other),
            }
        }
        assert!(!job.is_prerolling());
        assert!(!last_rendered, "the unit that reached the target was still prerolled");
    }

    #[test]
    fn eos_without_backend_finishes_stream() {
        let mut job = audio_job();
        job.on_data_received(vec![AccessUnit::end_of_stream()], None);
        match job.decode() {
            DecodeAction::Complete(DecodeResult::EndOfStream { .. }) => {}
            _ => panic!("expected inline end-of-stream completion"),
        }
        let progress = job.on_decode_done(DecodeResult::EndOfStream { pts: Duration::ZERO });
        assert_eq!(progress, JobProgress::Finished);
        assert!(job.is_finished());
    }

    #[test]
    fn incompatible_config_change_drains_backend() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        let new_configs = DemuxerConfigs::audio_only(audio_configs(48000), Duration::from_secs(10));
        job.on_data_received(vec![AccessUnit::config_changed()], Some(new_configs));

        match job.decode() {
            DecodeAction::Submit { unit, render, .. } => {
                assert_eq!(unit.status, AccessUnitStatus::EndOfStream);
                assert!(!render);
            }
            _ => panic!("expected drain submit"),
        }

        let progress = job.on_decode_done(DecodeResult::EndOfStream { pts: Duration::ZERO });
        assert_eq!(progress, JobProgress::ConfigsApplied);
        assert!(!job.has_backend());
        assert!(!job.is_finished(), "drain EOS must not finish the stream");
        match job.configs() {
            Some(StreamConfigs::Audio(c)) => assert_eq!(c.sample_rate, 48000),
            other => panic!("configs not applied: {:?}", other),
        }
    }

    #[test]
    fn identical_config_change_keeps_backend() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        let same = DemuxerConfigs::audio_only(audio_configs(44100), Duration::from_secs(10));
        job.on_data_received(vec![AccessUnit::config_changed()], Some(same));

        assert!(matches!(job.decode(), DecodeAction::ConfigApplied));
        assert!(job.has_backend());
        assert_eq!(job.backends_created(), 1);
    }

    #[test]
    fn no_key_parks_and_requeues_unit() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.on_data_received(vec![unit(0)], None);
        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));

        let progress = job.on_decode_done(DecodeResult::NoKey);
        assert_eq!(progress, JobProgress::WaitingForKey);
        assert!(job.is_waiting_for_key());
        assert!(job.has_data(), "unit must be requeued for retry");
        assert!(matches!(job.decode(), DecodeAction::Idle));

        assert!(job.on_key_added());
        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));
    }

    #[test]
    fn key_added_during_decode_triggers_immediate_retry() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.on_data_received(vec![unit(0)], None);
        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));

        // Key lands while the NoKey completion is still in flight.
        assert!(!job.on_key_added());
        let progress = job.on_decode_done(DecodeResult::NoKey);
        assert_eq!(progress, JobProgress::Stopped);
        assert!(!job.is_waiting_for_key());
        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));
    }

    #[test]
    fn release_mid_decode_is_deferred() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.on_data_received(vec![unit(0)], None);
        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));

        assert!(!job.release_resources());
        assert!(job.has_backend(), "backend kept until decode completes");

        let progress = job.on_decode_done(DecodeResult::Ok {
            pts: Duration::ZERO,
            video_size: None,
        });
        assert_eq!(progress, JobProgress::Released);
        assert!(!job.has_backend());
    }

    fn video_job() -> DecoderJob {
        let mut job = DecoderJob::new(StreamType::Video, 30);
        job.set_configs(StreamConfigs::Video(VideoConfigs {
            codec: "h264".to_string(),
            size: crate::types::VideoSize::new(320, 240),
            is_encrypted: false,
            extra_data: Bytes::new(),
        }));
        job
    }

    fn consume_one(job: &mut DecoderJob, pts_ms: u64) {
        match job.decode() {
            DecodeAction::Submit { .. } => {}
            _ => panic!("expected submit"),
        }
        job.on_decode_done(DecodeResult::Ok {
            pts: Duration::from_millis(pts_ms),
            video_size: None,
        });
    }

    #[test]
    fn mid_gop_backend_loss_requires_key_frame() {
        let mut job = video_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.on_data_received(
            vec![AccessUnit::key_frame(vec![1], Duration::ZERO), unit(30), unit(60)],
            None,
        );
        consume_one(&mut job, 0);
        consume_one(&mut job, 30);

        // Drop the replay anchor so only a resync seek can recover.
        job.replay_cache.clear();
        job.replay_anchored = false;
        job.release_backend();

        assert!(matches!(job.decode(), DecodeAction::KeyFrameRequired));
    }

    #[test]
    fn replay_cache_avoids_key_frame_resync() {
        let mut job = video_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.on_data_received(
            vec![AccessUnit::key_frame(vec![1], Duration::ZERO), unit(30), unit(60)],
            None,
        );
        consume_one(&mut job, 0);
        consume_one(&mut job, 30);

        job.release_backend();

        // The cached key frame run satisfies the restart without a seek.
        assert!(matches!(job.decode(), DecodeAction::CreateBackend));
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        match job.decode() {
            DecodeAction::Submit { unit, .. } => {
                assert!(unit.is_key_frame);
                assert_eq!(unit.timestamp, Duration::ZERO);
            }
            _ => panic!("expected replayed key frame"),
        }
    }

    #[test]
    fn backend_released_before_any_decode_needs_no_key_frame() {
        let mut job = video_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.release_backend();
        job.on_data_received(vec![unit(0)], None);

        assert!(matches!(job.decode(), DecodeAction::CreateBackend));
    }

    #[test]
    fn flush_clears_eos_latches() {
        let mut job = audio_job();
        job.on_data_received(vec![AccessUnit::end_of_stream()], None);
        let _ = job.decode();
        job.on_decode_done(DecodeResult::EndOfStream { pts: Duration::ZERO });
        assert!(job.is_finished());

        job.flush();
        assert!(!job.is_finished());
        assert!(!job.has_data());
    }

    #[test]
    fn stop_decode_discards_result() {
        let mut job = audio_job();
        job.attach_backend(Arc::new(NullBackend { adaptive: false }));
        job.on_data_received(vec![unit(0)], None);
        assert!(matches!(job.decode(), DecodeAction::Submit { .. }));

        job.stop_decode();
        let progress = job.on_decode_done(DecodeResult::Ok {
            pts: Duration::ZERO,
            video_size: None,
        });
        assert_eq!(progress, JobProgress::Stopped);
    }
}
