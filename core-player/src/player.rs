//! # Source Player
//!
//! The playback orchestrator. Owns the presentation clock, one decoder job
//! per stream, the pending-event set, and the starvation monitor, and wires
//! them to the host-provided demuxer, decoder backend factory, and CDM.
//!
//! ## Control model
//!
//! All state lives behind a single mutex that is never held across an await
//! point. Callbacks from collaborators, decode completions, and the
//! starvation timer each take the lock, fold their result in, and then act
//! on whatever the state machine demands next:
//!
//! ```text
//!  start/pause/seek_to/...        on_demuxer_* callbacks
//!            │                              │
//!            v                              v
//!      ┌──────────────────────────────────────────┐
//!      │       PlayerInner (single mutex)         │
//!      │  clock · jobs · pending events · timer   │
//!      └──────┬────────────────────────────┬──────┘
//!             │ decode (spawned task)      │ request_data / request_seek
//!             v                            v
//!      DecoderBackend                   Demuxer
//! ```
//!
//! Exclusive transitions (seek, surface change, decoder creation, prefetch)
//! are recorded in the [`PendingEventSet`] and drained in fixed priority
//! order, and only while no decode is in flight on either job. Completions
//! that the state machine produces itself (aborted input, end-of-stream with
//! no backend) are posted as tasks rather than run inline, so every decode
//! completion observes the same re-entrancy rules.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use core_async::task;
use core_runtime::events::{EventBus, PlayerEvent, Receiver};

use crate::clock::PresentationClock;
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::job::{DecodeAction, DecoderJob, JobProgress, PrefetchAction, StreamConfigs};
use crate::starvation::{starvation_timeout, StarvationMonitor};
use crate::traits::{
    CdmListener, ContentDecryptionModule, DecoderBackendFactory, Demuxer, DemuxerClient,
};
use crate::types::{
    DecodeResult, DecryptionContext, DemuxerConfigs, DemuxerData, PendingEventSet, SeekKind,
    StreamType, VideoSize, VideoSurface,
};

const STREAMS: [StreamType; 2] = [StreamType::Audio, StreamType::Video];

// ============================================================================
// Inner State
// ============================================================================

struct PlayerInner {
    clock: PresentationClock,
    pending: PendingEventSet,
    audio: DecoderJob,
    video: DecoderJob,

    playing: bool,
    released: bool,
    failed: bool,

    seek_target: Duration,
    seek_kind: SeekKind,
    seek_outstanding: bool,
    deferred_seek: Option<Duration>,

    surface: Option<VideoSurface>,
    next_surface: Option<Option<VideoSurface>>,

    cdm: Option<Arc<dyn ContentDecryptionModule>>,
    cdm_registration: Option<u32>,
    crypto: Option<DecryptionContext>,

    starvation: StarvationMonitor,
    prefetch_waiting: usize,

    duration: Duration,
    video_size: Option<VideoSize>,
    last_time_update: Option<Instant>,
    last_buffering: Option<u8>,
}

impl PlayerInner {
    fn new(config: &PlayerConfig) -> Self {
        Self {
            clock: PresentationClock::new(),
            pending: PendingEventSet::new(),
            audio: DecoderJob::new(StreamType::Audio, config.replay_cache_capacity),
            video: DecoderJob::new(StreamType::Video, config.replay_cache_capacity),
            playing: false,
            released: false,
            failed: false,
            seek_target: Duration::ZERO,
            seek_kind: SeekKind::Accurate,
            seek_outstanding: false,
            deferred_seek: None,
            surface: None,
            next_surface: None,
            cdm: None,
            cdm_registration: None,
            crypto: None,
            starvation: StarvationMonitor::new(),
            prefetch_waiting: 0,
            duration: Duration::ZERO,
            video_size: None,
            last_time_update: None,
            last_buffering: None,
        }
    }

    fn job(&self, stream: StreamType) -> &DecoderJob {
        match stream {
            StreamType::Audio => &self.audio,
            StreamType::Video => &self.video,
        }
    }

    fn job_mut(&mut self, stream: StreamType) -> &mut DecoderJob {
        match stream {
            StreamType::Audio => &mut self.audio,
            StreamType::Video => &mut self.video,
        }
    }

    fn any_decoding(&self) -> bool {
        self.audio.is_decoding() || self.video.is_decoding()
    }

    fn seek_scheduled(&self) -> bool {
        self.pending.contains(PendingEventSet::SEEK) || self.seek_outstanding
    }
}

enum CreateOutcome {
    Created,
    Waiting,
    Failed(String),
}

enum EventFollowup {
    None,
    Seek(Duration, SeekKind, Vec<Arc<dyn crate::traits::DecoderBackend>>),
    Request(Vec<StreamType>),
    PostProcess,
    Resume,
}

// ============================================================================
// Source Player
// ============================================================================

/// Media-source playback orchestrator.
///
/// Constructed with [`SourcePlayer::new`]; handed around as `Arc`. All
/// control methods are callable from any thread and return immediately;
/// progress is reported through the [`EventBus`].
pub struct SourcePlayer {
    demuxer: Arc<dyn Demuxer>,
    factory: Arc<dyn DecoderBackendFactory>,
    events: EventBus,
    config: PlayerConfig,
    inner: Mutex<PlayerInner>,
    weak_self: Weak<SourcePlayer>,
}

impl SourcePlayer {
    /// Builds a player and wires it to `demuxer` as its callback target.
    pub fn new(
        demuxer: Arc<dyn Demuxer>,
        factory: Arc<dyn DecoderBackendFactory>,
        config: PlayerConfig,
    ) -> Result<Arc<Self>> {
        config.validate().map_err(PlayerError::Config)?;
        let events = EventBus::new(config.event_buffer_size);
        let inner = Mutex::new(PlayerInner::new(&config));
        let player = Arc::new_cyclic(|weak| Self {
            demuxer: Arc::clone(&demuxer),
            factory,
            events,
            config,
            inner,
            weak_self: weak.clone(),
        });
        let client: Weak<dyn DemuxerClient> = player.weak_self.clone();
        player.demuxer.initialize(client);
        Ok(player)
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Starts (or resumes) playback.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        debug!("start");
        inner.playing = true;
        inner.released = false;
        if inner.seek_outstanding {
            // The grant will kick off the prefetch cycle.
            return;
        }
        if inner.pending.is_empty() {
            inner.pending.set(PendingEventSet::PREFETCH_REQUEST);
        }
        drop(inner);
        self.process_pending_events();
    }

    /// Pauses playback. `is_media_related` marks pauses the player performs
    /// on its own behalf (key underrun, backend teardown) as opposed to a
    /// host request; both freeze the clock.
    pub fn pause(&self, is_media_related: bool) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        debug!(is_media_related, "pause");
        inner.playing = false;
        inner.clock.stop_interpolating();
        inner.starvation.cancel();
    }

    /// Requests an accurate seek to `position`.
    ///
    /// If another seek is already scheduled or awaiting its grant, the new
    /// target is deferred and re-issued once the current grant arrives.
    pub fn seek_to(&self, position: Duration) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        if inner.seek_scheduled() {
            debug!(?position, "deferring seek behind in-flight seek");
            inner.deferred_seek = Some(position);
            return;
        }
        debug!(?position, "seek scheduled");
        inner.seek_target = position;
        inner.seek_kind = SeekKind::Accurate;
        inner.pending.set(PendingEventSet::SEEK);
        drop(inner);
        self.process_pending_events();
    }

    /// Releases decoder resources without destroying the player.
    ///
    /// Buffered data, configs, and any in-flight seek survive; a later
    /// [`SourcePlayer::start`] resumes from the released position without
    /// duplicating outstanding demuxer requests.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        debug!("release");
        inner.playing = false;
        inner.released = true;
        inner.clock.stop_interpolating();
        inner.starvation.cancel();
        inner.pending.clear(PendingEventSet::PREFETCH_REQUEST);
        inner.pending.clear(PendingEventSet::PREFETCH_DONE);
        inner.pending.clear(PendingEventSet::DECODER_CREATION);
        inner.prefetch_waiting = 0;
        inner.audio.release_resources();
        inner.video.release_resources();
    }

    /// Replaces (or removes) the video output surface.
    ///
    /// The video backend is torn down and rebuilt against the new surface at
    /// the next safe point. Repeated calls before processing collapse to the
    /// most recent surface.
    pub fn set_video_surface(&self, surface: Option<VideoSurface>) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        debug!(?surface, "surface change scheduled");
        inner.next_surface = Some(surface);
        inner.pending.set(PendingEventSet::SURFACE_CHANGE);
        drop(inner);
        self.process_pending_events();
    }

    /// Attaches a content decryption module for encrypted streams.
    pub fn set_cdm(&self, cdm: Arc<dyn ContentDecryptionModule>) {
        let listener: Weak<dyn CdmListener> = self.weak_self.clone();
        let registration = cdm.register_listener(listener);
        let context = cdm.decryption_context();

        let mut inner = self.inner.lock();
        if let (Some(old), Some(id)) = (inner.cdm.take(), inner.cdm_registration.take()) {
            old.unregister_listener(id);
        }
        inner.cdm = Some(cdm);
        inner.cdm_registration = Some(registration);
        inner.crypto = context;
        let retry = inner.pending.contains(PendingEventSet::DECODER_CREATION);
        drop(inner);
        if retry {
            self.process_pending_events();
        }
    }

    /// Current interpolated playback position.
    pub fn current_time(&self) -> Duration {
        self.inner.lock().clock.current_time()
    }

    /// Media duration reported by the demuxer, zero until known.
    pub fn duration(&self) -> Duration {
        self.inner.lock().duration
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    /// Decoded video dimensions, if any video output was produced.
    pub fn video_size(&self) -> Option<VideoSize> {
        self.inner.lock().video_size
    }

    /// Subscribes to player notifications.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn notify(&self, event: PlayerEvent) {
        trace!(event = event.description(), "notify");
        self.events.emit(event).ok();
    }

    // ------------------------------------------------------------------
    // Pending event processing
    // ------------------------------------------------------------------

    /// Drains the pending-event set in priority order.
    ///
    /// Returns immediately while any decode is in flight; the in-flight
    /// completion re-enters here.
    fn process_pending_events(&self) {
        let followup = {
            let mut inner = self.inner.lock();
            if inner.failed || inner.any_decoding() {
                return;
            }

            if inner.pending.contains(PendingEventSet::SEEK) {
                inner.pending.clear(PendingEventSet::SEEK);
                inner.pending.clear(PendingEventSet::PREFETCH_REQUEST);
                inner.pending.clear(PendingEventSet::PREFETCH_DONE);
                inner.prefetch_waiting = 0;
                inner.audio.flush();
                inner.video.flush();
                inner.starvation.cancel();
                // The clock keeps reporting the pre-seek position until the
                // grant arrives.
                inner.clock.stop_interpolating();
                inner.seek_outstanding = true;
                let stale_backends = STREAMS
                    .iter()
                    .filter_map(|stream| inner.job(*stream).backend())
                    .collect();
                debug!(position = ?inner.seek_target, kind = ?inner.seek_kind, "issuing demuxer seek");
                EventFollowup::Seek(inner.seek_target, inner.seek_kind, stale_backends)
            } else {
                if inner.pending.contains(PendingEventSet::SURFACE_CHANGE) {
                    inner.pending.clear(PendingEventSet::SURFACE_CHANGE);
                    let surface = inner.next_surface.take().flatten();
                    debug!(?surface, "applying surface change");
                    inner.surface = surface;
                    inner.video.release_backend();
                }
                if inner.pending.contains(PendingEventSet::DECODER_CREATION) {
                    inner.pending.clear(PendingEventSet::DECODER_CREATION);
                }
                if inner.pending.contains(PendingEventSet::PREFETCH_REQUEST) && !inner.released {
                    inner.pending.clear(PendingEventSet::PREFETCH_REQUEST);
                    let mut waiting = 0usize;
                    let mut requests = Vec::new();
                    for stream in STREAMS {
                        let job = inner.job_mut(stream);
                        if !job.has_configs() || job.is_finished() {
                            continue;
                        }
                        match job.prefetch() {
                            PrefetchAction::RequestData => {
                                waiting += 1;
                                requests.push(stream);
                            }
                            PrefetchAction::AwaitingData => waiting += 1,
                            PrefetchAction::AlreadyBuffered => {}
                        }
                    }
                    inner.prefetch_waiting = waiting;
                    if waiting == 0 {
                        inner.pending.set(PendingEventSet::PREFETCH_DONE);
                        EventFollowup::PostProcess
                    } else {
                        debug!(waiting, "prefetching");
                        EventFollowup::Request(requests)
                    }
                } else if inner.pending.contains(PendingEventSet::PREFETCH_DONE) {
                    if inner.playing && !inner.released {
                        inner.pending.clear(PendingEventSet::PREFETCH_DONE);
                        EventFollowup::Resume
                    } else {
                        // Stays pending; consumed when playback starts.
                        EventFollowup::None
                    }
                } else if inner.pending.is_empty()
                    && inner.playing
                    && !inner.released
                    && !inner.seek_outstanding
                {
                    EventFollowup::Resume
                } else {
                    EventFollowup::None
                }
            }
        };

        match followup {
            EventFollowup::None => {}
            EventFollowup::Seek(position, kind, stale_backends) => {
                for backend in stale_backends {
                    task::spawn(async move {
                        backend.flush().await;
                    });
                }
                self.demuxer.request_seek(position, kind);
            }
            EventFollowup::Request(streams) => {
                for stream in streams {
                    self.demuxer.request_data(stream);
                }
            }
            EventFollowup::PostProcess => self.post_process_events(),
            EventFollowup::Resume => {
                self.pump(StreamType::Audio);
                self.pump(StreamType::Video);
            }
        }
    }

    /// Re-enters event processing as a posted task.
    fn post_process_events(&self) {
        let weak = self.weak_self.clone();
        task::spawn(async move {
            if let Some(player) = weak.upgrade() {
                player.process_pending_events();
            }
        });
    }

    // ------------------------------------------------------------------
    // Decode pump
    // ------------------------------------------------------------------

    /// Drives one job until it has a decode in flight, is waiting on
    /// something external, or hands control to pending-event processing.
    fn pump(&self, stream: StreamType) {
        loop {
            let mut inner = self.inner.lock();
            // No decode while a seek grant is pending; the grant restarts
            // the prefetch cycle.
            if inner.failed || inner.released || !inner.playing || inner.seek_outstanding {
                return;
            }
            if !inner.pending.is_empty() {
                drop(inner);
                self.process_pending_events();
                return;
            }
            if !inner.job(stream).has_configs() {
                return;
            }
            match inner.job_mut(stream).decode() {
                DecodeAction::Submit {
                    backend,
                    unit,
                    render,
                } => {
                    drop(inner);
                    let Some(player) = self.weak_self.upgrade() else {
                        return;
                    };
                    task::spawn(async move {
                        let result = backend.decode(unit, render).await;
                        player.handle_decode_completed(stream, result);
                    });
                    return;
                }
                DecodeAction::Complete(result) => {
                    // Posted, never inline, so it obeys the same re-entrancy
                    // rules as a real backend completion.
                    drop(inner);
                    let Some(player) = self.weak_self.upgrade() else {
                        return;
                    };
                    task::spawn(async move {
                        player.handle_decode_completed(stream, result);
                    });
                    return;
                }
                DecodeAction::RequestData => {
                    drop(inner);
                    self.demuxer.request_data(stream);
                    return;
                }
                DecodeAction::CreateBackend => {
                    match self.create_backend_locked(&mut inner, stream) {
                        CreateOutcome::Created => {
                            drop(inner);
                            continue;
                        }
                        CreateOutcome::Waiting => return,
                        CreateOutcome::Failed(message) => {
                            self.fail_locked(&mut inner, message);
                            return;
                        }
                    }
                }
                DecodeAction::KeyFrameRequired => {
                    Self::schedule_key_frame_seek(&mut inner);
                    drop(inner);
                    self.process_pending_events();
                    return;
                }
                DecodeAction::ConfigApplied => {
                    drop(inner);
                    continue;
                }
                DecodeAction::Idle => return,
            }
        }
    }

    /// Creates the backend for `stream` if configs, surface, and crypto are
    /// all satisfied; otherwise parks on the decoder-creation event.
    fn create_backend_locked(&self, inner: &mut PlayerInner, stream: StreamType) -> CreateOutcome {
        let crypto = if inner.job(stream).is_content_encrypted() {
            match inner.crypto {
                Some(context) => Some(context),
                None => {
                    debug!(stream = %stream, "decoder creation waits for decryption context");
                    inner.pending.set(PendingEventSet::DECODER_CREATION);
                    return CreateOutcome::Waiting;
                }
            }
        } else {
            None
        };

        let created = match inner.job(stream).configs().cloned() {
            Some(StreamConfigs::Audio(configs)) => self.factory.create_audio(&configs, crypto),
            Some(StreamConfigs::Video(configs)) => {
                let Some(surface) = inner.surface else {
                    debug!("decoder creation waits for a video surface");
                    inner.pending.set(PendingEventSet::DECODER_CREATION);
                    return CreateOutcome::Waiting;
                };
                self.factory.create_video(&configs, surface, crypto)
            }
            None => return CreateOutcome::Waiting,
        };

        match created {
            Ok(backend) => {
                inner.job_mut(stream).attach_backend(backend);
                debug!(stream = %stream, "decoder backend created");
                CreateOutcome::Created
            }
            Err(error) => CreateOutcome::Failed(error.to_string()),
        }
    }

    /// Schedules an internal key-frame resync seek to the current position.
    /// No-op if any seek is already scheduled; an external seek resyncs
    /// anyway.
    fn schedule_key_frame_seek(inner: &mut PlayerInner) {
        if inner.seek_scheduled() {
            return;
        }
        inner.seek_target = inner.clock.current_time();
        inner.seek_kind = SeekKind::KeyFrameSync;
        inner.pending.set(PendingEventSet::SEEK);
        debug!(position = ?inner.seek_target, "key-frame resync seek scheduled");
    }

    fn fail_locked(&self, inner: &mut PlayerInner, message: String) {
        error!(%message, "entering terminal error state");
        inner.failed = true;
        inner.playing = false;
        inner.clock.stop_interpolating();
        inner.starvation.cancel();
        self.notify(PlayerEvent::Error { message });
    }

    // ------------------------------------------------------------------
    // Decode completions
    // ------------------------------------------------------------------

    fn handle_decode_completed(&self, stream: StreamType, result: DecodeResult) {
        let mut inner = self.inner.lock();
        if inner.failed {
            let _ = inner.job_mut(stream).on_decode_done(result);
            return;
        }

        let video_size = match (stream, &result) {
            (
                StreamType::Video,
                DecodeResult::Ok {
                    video_size: Some(size),
                    ..
                },
            ) => Some(*size),
            _ => None,
        };

        let progress = inner.job_mut(stream).on_decode_done(result);
        trace!(stream = %stream, ?progress, "decode completed");

        if let Some(size) = video_size {
            if inner.video_size != Some(size) {
                inner.video_size = Some(size);
                self.notify(PlayerEvent::VideoSizeChanged {
                    width: size.width,
                    height: size.height,
                });
                self.notify(PlayerEvent::MediaMetadataChanged {
                    duration: inner.duration,
                    width: size.width,
                    height: size.height,
                    success: true,
                });
            }
        }

        match &progress {
            JobProgress::Decoded { pts, .. } => {
                let pts = *pts;
                let manages_clock = match stream {
                    StreamType::Audio => true,
                    StreamType::Video => {
                        !inner.audio.has_configs() || inner.audio.is_finished()
                    }
                };
                if manages_clock {
                    let upper = inner
                        .job(stream)
                        .max_buffered_pts()
                        .map_or(pts, |max| max.max(pts));
                    if let Err(err) = inner.clock.set_bounds(pts, upper) {
                        warn!(%err, "rejected clock anchor");
                    }
                    let prerolling =
                        inner.audio.is_prerolling() || inner.video.is_prerolling();
                    if inner.playing && !prerolling && !inner.clock.is_interpolating() {
                        inner.clock.start_interpolating();
                    }
                }
                if inner.playing {
                    let now = Instant::now();
                    let due = inner
                        .last_time_update
                        .is_none_or(|at| now.duration_since(at) >= self.config.time_update_interval);
                    if due {
                        inner.last_time_update = Some(now);
                        let position = inner.clock.current_time();
                        self.notify(PlayerEvent::TimeUpdate { position });
                    }

                    let reference = match stream {
                        StreamType::Audio => inner.audio.max_buffered_pts(),
                        StreamType::Video => inner.video.next_unit_pts(),
                    };
                    if let Some(reference) = reference {
                        let timeout = starvation_timeout(
                            stream,
                            inner.clock.current_time(),
                            reference,
                            &self.config,
                        );
                        let weak = self.weak_self.clone();
                        inner.starvation.arm(timeout, move || async move {
                            if let Some(player) = weak.upgrade() {
                                player.handle_starvation(stream);
                            }
                        });
                    }
                }
            }
            JobProgress::Finished => {
                let audio_done = !inner.audio.has_configs() || inner.audio.is_finished();
                let video_done = !inner.video.has_configs() || inner.video.is_finished();
                let any_configured = inner.audio.has_configs() || inner.video.has_configs();
                // A seek scheduled while the final units were in flight wins
                // over completion.
                if any_configured && audio_done && video_done && !inner.seek_scheduled() {
                    info!("playback complete");
                    inner.playing = false;
                    inner.clock.stop_interpolating();
                    inner.starvation.cancel();
                    self.notify(PlayerEvent::PlaybackComplete);
                }
            }
            JobProgress::WaitingForKey => {
                debug!(stream = %stream, "parked waiting for decryption key");
                inner.clock.stop_interpolating();
                inner.starvation.cancel();
                self.notify(PlayerEvent::WaitingForDecryptionKey);
            }
            JobProgress::Failed(message) => {
                let message = message.clone();
                self.fail_locked(&mut inner, message);
                return;
            }
            JobProgress::ConfigsApplied | JobProgress::Stopped | JobProgress::Released => {}
        }

        if !inner.pending.is_empty() {
            if !inner.any_decoding() {
                drop(inner);
                self.process_pending_events();
            }
            return;
        }

        let resume = matches!(
            progress,
            JobProgress::Decoded { .. } | JobProgress::Stopped | JobProgress::ConfigsApplied
        ) && inner.playing
            && !inner.released;
        if resume {
            drop(inner);
            self.pump(stream);
        }
    }

    // ------------------------------------------------------------------
    // Starvation
    // ------------------------------------------------------------------

    fn handle_starvation(&self, stream: StreamType) {
        let mut inner = self.inner.lock();
        if inner.failed || inner.released || !inner.playing {
            return;
        }
        if !inner.pending.is_empty() || inner.any_decoding() {
            return;
        }
        if inner.job(stream).has_data() {
            // Not actually starved; resume decode instead.
            drop(inner);
            self.pump(stream);
            return;
        }
        debug!(stream = %stream, "starved; requesting prefetch");
        inner.clock.stop_interpolating();
        inner.pending.set(PendingEventSet::PREFETCH_REQUEST);
        drop(inner);
        self.process_pending_events();
    }

    // ------------------------------------------------------------------
    // Demuxer callbacks
    // ------------------------------------------------------------------

    fn handle_configs(&self, configs: DemuxerConfigs) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        let duration = configs.duration;
        let (width, height) = configs
            .video
            .as_ref()
            .map_or((0, 0), |v| (v.size.width, v.size.height));
        debug!(?duration, width, height, "demuxer configs available");

        inner.duration = duration;
        inner.clock.set_duration(duration);
        if let Some(audio) = configs.audio {
            inner.audio.set_configs(StreamConfigs::Audio(audio));
        }
        if let Some(video) = configs.video {
            inner.video_size = Some(video.size);
            inner.video.set_configs(StreamConfigs::Video(video));
        }
        self.notify(PlayerEvent::MediaMetadataChanged {
            duration,
            width,
            height,
            success: true,
        });
    }

    fn handle_data(&self, data: DemuxerData) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        let stream = data.stream;
        trace!(stream = %stream, units = data.access_units.len(), "demuxer data");
        let satisfied_prefetch = inner
            .job_mut(stream)
            .on_data_received(data.access_units, data.demuxer_configs);

        if let Some(max) = inner.job(stream).max_buffered_pts() {
            let percent = buffered_percent(max, inner.duration);
            if inner.last_buffering != Some(percent) {
                inner.last_buffering = Some(percent);
                self.notify(PlayerEvent::BufferingUpdate { percent });
            }
        }

        if satisfied_prefetch {
            inner.prefetch_waiting = inner.prefetch_waiting.saturating_sub(1);
            if inner.prefetch_waiting == 0 {
                inner.pending.set(PendingEventSet::PREFETCH_DONE);
                drop(inner);
                self.post_process_events();
            }
            return;
        }

        // Data landing between request_seek and its grant is only queued;
        // an aborted read in that window must not trigger a fresh request.
        if inner.playing
            && !inner.released
            && !inner.seek_outstanding
            && inner.pending.is_empty()
            && !inner.job(stream).is_decoding()
        {
            drop(inner);
            self.pump(stream);
        }
    }

    fn handle_duration_changed(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        debug!(?duration, "duration changed");
        inner.duration = duration;
        inner.clock.set_duration(duration);
        self.notify(PlayerEvent::DurationChanged { duration });
    }

    fn handle_seek_done(&self, actual_time: Option<Duration>) {
        let mut inner = self.inner.lock();
        if inner.failed || !inner.seek_outstanding {
            return;
        }
        inner.seek_outstanding = false;
        let kind = inner.seek_kind;
        let target = inner.seek_target;

        if let Some(next) = inner.deferred_seek.take() {
            // A newer external seek superseded this one before the grant.
            debug!(?next, "re-issuing deferred seek");
            inner.seek_target = next;
            inner.seek_kind = SeekKind::Accurate;
            inner.pending.set(PendingEventSet::SEEK);
            drop(inner);
            self.process_pending_events();
            return;
        }

        let position = match kind {
            SeekKind::Accurate => {
                inner.clock.reset_to(target);
                if inner.audio.has_configs() {
                    inner.audio.begin_prerolling(target);
                }
                if inner.video.has_configs() {
                    inner.video.begin_prerolling(target);
                }
                target
            }
            SeekKind::KeyFrameSync => {
                // Playback resumes from the granted key frame; no preroll.
                let granted = actual_time.unwrap_or(target);
                inner.clock.reset_to(granted);
                granted
            }
        };
        debug!(?position, ?kind, "seek granted");
        self.notify(PlayerEvent::SeekComplete { position });

        if inner.released {
            return;
        }
        inner.pending.set(PendingEventSet::PREFETCH_REQUEST);
        drop(inner);
        self.process_pending_events();
    }

    // ------------------------------------------------------------------
    // CDM callbacks
    // ------------------------------------------------------------------

    fn handle_key_added(&self) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        let mut resumed = Vec::new();
        for stream in STREAMS {
            if inner.job_mut(stream).on_key_added() {
                resumed.push(stream);
            }
        }
        if resumed.is_empty() || !inner.playing || !inner.pending.is_empty() {
            return;
        }
        debug!(?resumed, "key added; resuming parked decode");
        drop(inner);
        for stream in resumed {
            self.pump(stream);
        }
    }

    fn handle_decryption_context_ready(&self) {
        let mut inner = self.inner.lock();
        if inner.failed {
            return;
        }
        inner.crypto = inner.cdm.as_ref().and_then(|cdm| cdm.decryption_context());
        let retry = inner.pending.contains(PendingEventSet::DECODER_CREATION);
        drop(inner);
        if retry {
            self.process_pending_events();
        }
    }

    fn handle_cdm_unset(&self) {
        let mut inner = self.inner.lock();
        debug!("cdm unset");
        inner.crypto = None;
        for stream in STREAMS {
            if inner.job(stream).is_content_encrypted() {
                inner.job_mut(stream).stop_decode();
                inner.job_mut(stream).release_resources();
            }
        }
    }
}

fn buffered_percent(buffered: Duration, duration: Duration) -> u8 {
    if duration.is_zero() || duration == Duration::MAX {
        return 0;
    }
    let ratio = buffered.as_millis().saturating_mul(100) / duration.as_millis().max(1);
    ratio.min(100) as u8
}

impl Drop for SourcePlayer {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let (Some(cdm), Some(id)) = (inner.cdm.take(), inner.cdm_registration.take()) {
            cdm.unregister_listener(id);
        }
    }
}

#[async_trait]
impl DemuxerClient for SourcePlayer {
    async fn on_demuxer_configs_available(&self, configs: DemuxerConfigs) {
        self.handle_configs(configs);
    }

    async fn on_demuxer_data_available(&self, data: DemuxerData) {
        self.handle_data(data);
    }

    async fn on_demuxer_duration_changed(&self, duration: Duration) {
        self.handle_duration_changed(duration);
    }

    async fn on_demuxer_seek_done(&self, actual_time: Option<Duration>) {
        self.handle_seek_done(actual_time);
    }
}

#[async_trait]
impl CdmListener for SourcePlayer {
    async fn on_key_added(&self) {
        self.handle_key_added();
    }

    async fn on_decryption_context_ready(&self) {
        self.handle_decryption_context_ready();
    }

    async fn on_cdm_unset(&self) {
        self.handle_cdm_unset();
    }
}
