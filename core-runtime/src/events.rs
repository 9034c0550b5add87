//! # Player Event Bus
//!
//! Delivers player manager notifications using `tokio::sync::broadcast`. The
//! playback core publishes typed [`PlayerEvent`]s; any number of host-side
//! subscribers (UI, session controller, diagnostics) can listen independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ SourcePlayer ├──────────────>│ EventBus  ├─────────────────>│ Subscriber │
//! └──────────────┘               │ (broadcast│                  └────────────┘
//!                                │  channel) │     subscribe    ┌────────────┐
//!                                │           ├─────────────────>│ Subscriber │
//!                                └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, PlayerEvent};
//! use std::time::Duration;
//!
//! let bus = EventBus::new(100);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(PlayerEvent::TimeUpdate {
//!     position: Duration::from_millis(1500),
//! })
//! .ok();
//!
//! let event = subscriber.try_recv().unwrap();
//! assert!(matches!(event, PlayerEvent::TimeUpdate { .. }));
//! ```
//!
//! ## Error Handling
//!
//! The bus uses `tokio::sync::broadcast`, which can produce two receive errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates
//!   shutdown.
//!
//! Emission is fire-and-forget: a lagging or absent subscriber never blocks
//! the player control loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events (time updates arrive once per decode completion). Subscribers that
/// can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Player Event Types
// ============================================================================

/// Notifications published by the playback core toward the player manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerEvent {
    /// Media clock advanced; emitted on decode completions while playing.
    TimeUpdate {
        /// Current interpolated playback position.
        position: Duration,
    },
    /// Stream metadata became available or changed.
    MediaMetadataChanged {
        /// Total media duration.
        duration: Duration,
        /// Video width in pixels, 0 for audio-only streams.
        width: u32,
        /// Video height in pixels, 0 for audio-only streams.
        height: u32,
        /// Whether the metadata was extracted successfully.
        success: bool,
    },
    /// Duration reported by the demuxer changed mid-stream.
    DurationChanged {
        /// The updated media duration.
        duration: Duration,
    },
    /// Every configured stream decoded end-of-stream.
    PlaybackComplete,
    /// Buffered data level changed.
    BufferingUpdate {
        /// Percentage of the media duration buffered so far.
        percent: u8,
    },
    /// A seek was granted by the demuxer and decode resumed.
    SeekComplete {
        /// The position playback resumed from.
        position: Duration,
    },
    /// Unrecoverable player error; the player is in its terminal state.
    Error {
        /// Human-readable error message.
        message: String,
    },
    /// Decoded video dimensions changed.
    VideoSizeChanged {
        /// New video width in pixels.
        width: u32,
        /// New video height in pixels.
        height: u32,
    },
    /// Decode is parked until a decryption key becomes available.
    WaitingForDecryptionKey,
}

impl PlayerEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PlayerEvent::TimeUpdate { .. } => "Playback position updated",
            PlayerEvent::MediaMetadataChanged { .. } => "Media metadata changed",
            PlayerEvent::DurationChanged { .. } => "Media duration changed",
            PlayerEvent::PlaybackComplete => "Playback completed",
            PlayerEvent::BufferingUpdate { .. } => "Buffering level changed",
            PlayerEvent::SeekComplete { .. } => "Seek completed",
            PlayerEvent::Error { .. } => "Player error",
            PlayerEvent::VideoSizeChanged { .. } => "Video size changed",
            PlayerEvent::WaitingForDecryptionKey => "Waiting for decryption key",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PlayerEvent::Error { .. } => EventSeverity::Error,
            PlayerEvent::WaitingForDecryptionKey => EventSeverity::Warning,
            PlayerEvent::PlaybackComplete
            | PlayerEvent::SeekComplete { .. }
            | PlayerEvent::MediaMetadataChanged { .. }
            | PlayerEvent::DurationChanged { .. }
            | PlayerEvent::VideoSizeChanged { .. } => EventSeverity::Info,
            PlayerEvent::TimeUpdate { .. } | PlayerEvent::BufferingUpdate { .. } => {
                EventSeverity::Debug
            }
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for player notifications.
///
/// Cloning the bus is cheap; all clones publish into the same channel. Each
/// call to [`EventBus::subscribe`] creates an independent receiver that
/// observes all future events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// `capacity` is the maximum number of events buffered per subscriber.
    /// When a subscriber falls behind by more than this amount, it will
    /// receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: PlayerEvent) -> Result<usize, SendError<PlayerEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&PlayerEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering
/// capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, PlayerEvent};
///
/// let bus = EventBus::new(100);
/// let stream = EventStream::new(bus.subscribe());
///
/// // Only observe error notifications
/// let mut errors = stream.filter(|event| matches!(event, PlayerEvent::Error { .. }));
/// ```
pub struct EventStream {
    receiver: Receiver<PlayerEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<PlayerEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PlayerEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<PlayerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<PlayerEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_count_tracks_subscriptions() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _a = bus.subscribe();
        let _b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(PlayerEvent::PlaybackComplete).is_err());
    }

    #[test]
    fn all_subscribers_receive_events() {
        let bus = EventBus::new(10);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(PlayerEvent::PlaybackComplete).unwrap();

        assert_eq!(a.try_recv().unwrap(), PlayerEvent::PlaybackComplete);
        assert_eq!(b.try_recv().unwrap(), PlayerEvent::PlaybackComplete);
    }

    #[core_async::test]
    async fn stream_filter_skips_non_matching_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, PlayerEvent::Error { .. }));

        bus.emit(PlayerEvent::TimeUpdate {
            position: Duration::from_millis(40),
        })
        .unwrap();
        bus.emit(PlayerEvent::Error {
            message: "decoder failed".to_string(),
        })
        .unwrap();

        let event = stream.recv().await.unwrap();
        assert!(matches!(event, PlayerEvent::Error { .. }));
    }

    #[test]
    fn severity_classification() {
        let error = PlayerEvent::Error {
            message: "x".to_string(),
        };
        assert_eq!(error.severity(), EventSeverity::Error);
        assert_eq!(
            PlayerEvent::WaitingForDecryptionKey.severity(),
            EventSeverity::Warning
        );
        assert_eq!(
            PlayerEvent::PlaybackComplete.severity(),
            EventSeverity::Info
        );
        let tick = PlayerEvent::TimeUpdate {
            position: Duration::ZERO,
        };
        assert_eq!(tick.severity(), EventSeverity::Debug);
    }

    #[test]
    fn events_round_trip_through_serde() {
        let event = PlayerEvent::VideoSizeChanged {
            width: 1280,
            height: 720,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: PlayerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
