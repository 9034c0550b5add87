//! Synchronization primitives.
//!
//! Re-exports the async-aware primitives from `tokio::sync`, plus the
//! `CancellationToken` from `tokio-util` used throughout the playback core
//! for invalidating deferred callbacks and one-shot timers.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::Mutex;
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     let mut guard = mutex.lock().await;
//!     *guard += 1;
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Barrier, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
