//! Runtime utilities that abstract over the underlying async executor.
//!
//! Wraps Tokio's runtime primitives so that downstream crates never need to
//! depend on Tokio directly.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion using a lightweight runtime.
///
/// The runtime is single-threaded, which gives tests deterministic task
/// interleaving: spawned tasks only make progress while the driving future
/// is awaiting.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}
