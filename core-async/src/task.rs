//! Task spawning and execution abstractions.
//!
//! Thin wrappers over `tokio::task`. The playback core posts every internal
//! callback through [`spawn`] rather than invoking it inline, so this module
//! is the single chokepoint for task scheduling.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     let result = handle.await.unwrap();
//!     assert_eq!(result, 42);
//! }
//! ```

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task using the Tokio runtime.
///
/// The spawned task runs concurrently with other tasks and may run on a
/// different thread on a multi-threaded runtime.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
