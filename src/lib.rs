//! # `promissory`: promises on a thread pool
//!
//! This crate lets a caller schedule work onto a pool of worker threads, chain
//! dependent steps into pipelines, aggregate the results of many parallel
//! tasks, and bound waits with timeouts and cancellation.
//!
//! A [Promise](promise::Promise) settles exactly once: completed with a value,
//! failed with an [Error](error::Error), or cancelled. Whichever of those
//! happens first wins, even when several threads race to settle it. Errors
//! and panics raised inside scheduled work are caught and stored in the
//! promise, never lost on a worker thread.
//!
//! For the worker pool, see the [task] module. For the combinators, see the
//! [promise] module. Ambient per-request state that should follow work onto
//! worker threads is handled by the [context] module.
//!
//! ## Example
//!
//! ```
//! use promissory::promise::Promise;
//! use promissory::error::Error;
//!
//! let doubled = Promise::completed(5).then(|x| Ok(x * 2));
//! assert_eq!(doubled.get().unwrap(), 10);
//!
//! let recovered = Promise::<&str>::new()
//!     .run(|| Err(Error::msg("boom")))
//!     .exceptionally(|_| Ok("recovered"));
//! assert_eq!(recovered.get().unwrap(), "recovered");
//!
//! let a = Promise::supply_async(|| Ok(2));
//! let b = Promise::supply_async(|| Ok(3));
//! assert_eq!(a.then_combine(&b, |a, b| Ok(a + b)).get().unwrap(), 5);
//!
//! promissory::task::shutdown_default();
//! ```
pub mod config;
pub mod context;
pub mod error;
pub mod promise;
pub mod task;
pub mod timeout;

pub use error::{Error, Result};
pub use promise::Promise;
pub use task::{interrupted, shutdown_default, Executor};

/// Route `log` output through the test harness. Safe to call from every test.
#[cfg(test)]
pub(crate) fn test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
