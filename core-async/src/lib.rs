//! Runtime abstraction layer for the media playback core.
//!
//! This crate provides a unified async API over the Tokio runtime. All core-*
//! crates depend on this crate instead of directly depending on tokio, so the
//! executor surface the playback engine relies on stays in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Time-related operations (sleep, duration, instant)
//! - `sync`: Synchronization primitives (Mutex, channels, cancellation)
//! - `runtime`: Runtime construction and `block_on`
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!
//!     // handle is a JoinHandle and can be awaited for the result
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

// Core modules
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Re-export commonly used types at crate root for convenience
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
