//! Promises.
//!
//! A [Promise] is a handle to a value that becomes available once some work
//! has finished. Handles are cheap to clone and all clones observe the same
//! outcome. A promise settles exactly once, into one of three terminal
//! [State]s: completed with a value, failed with an [Error], or cancelled.
//! The first of [Promise::complete], [Promise::complete_exceptionally] and
//! [Promise::cancel] to get there wins; later attempts return `false`.
//!
//! # Example
//!
//! ```
//! use promissory::promise::Promise;
//!
//! let p = Promise::new();
//! assert!(!p.is_done());
//! assert_eq!(p.get_now(0).unwrap(), 0);
//!
//! assert!(p.complete(5));
//! assert!(!p.complete(6));
//! assert_eq!(p.then(|x| Ok(x * 2)).get().unwrap(), 10);
//! ```
//!
//! Work submitted with [Promise::supply_async] runs on an
//! [Executor](crate::task::Executor); combinators such as [Promise::then],
//! [Promise::then_combine] and [Promise::all_of] build pipelines out of
//! promises. Failures never unwind through the pool, they are stored in the
//! promise and handed to every reader:
//!
//! ```
//! use promissory::{error::Error, promise::Promise};
//!
//! let p = Promise::supply_async(|| Err::<i32, _>(Error::msg("boom")))
//!     .exceptionally(|_| Ok(-1));
//! assert_eq!(p.get().unwrap(), -1);
//! ```
use std::{fmt, sync::Arc, time::Duration};

use crate::{
    config,
    context::Captured,
    error::{Error, Result},
    task::{
        adapter::{Adapter, Callable, Sink},
        default_executor, Executor, Interrupt,
    },
    timeout::{TimeUnit, TimeoutPolicy},
};

mod aggregate;
mod combinators;
mod state;

pub use aggregate::Source;
pub use state::State;

use state::Shared;

#[derive(Clone)]
pub(crate) struct Options {
    executor: Option<Executor>,
    debug: bool,
    propagate_context: bool,
    timeout: TimeoutPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            executor: None,
            debug: config::debug_default(),
            propagate_context: true,
            timeout: TimeoutPolicy::FOREVER,
        }
    }
}

/// A handle to the eventual outcome of some work.
///
/// See the [module-level documentation](self) for more information.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
    options: Options,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .field("timeout", &self.options.timeout)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a new promise starts from.
pub enum Seed<T> {
    /// Nothing yet; the promise stays pending until completed by hand.
    Empty,
    /// Already completed with this value.
    Value(T),
    /// Completed by running this supplier on the executor.
    Supplier(Box<dyn FnOnce() -> Result<T> + Send>),
}

/// Builds promises with non-default options.
///
/// ```
/// use promissory::{promise::PromiseBuilder, task::Executor, timeout::TimeUnit};
///
/// let exec = Executor::new(2).unwrap();
/// let p = PromiseBuilder::new()
///     .executor(exec.clone())
///     .debug(true)
///     .propagate_context(false)
///     .timeout(1, TimeUnit::Seconds)
///     .supply(|| Ok("hello"));
/// assert_eq!(p.get().unwrap(), "hello");
/// exec.shutdown();
/// ```
#[derive(Clone, Default)]
pub struct PromiseBuilder {
    options: Options,
}

impl PromiseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run scheduled work on `exec` instead of the default pool.
    pub fn executor(mut self, exec: Executor) -> Self {
        self.options.executor = Some(exec);
        self
    }

    /// Trace thread hops of this promise and everything derived from it.
    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Carry the scheduling thread's ambient context onto worker threads.
    /// On by default.
    pub fn propagate_context(mut self, propagate: bool) -> Self {
        self.options.propagate_context = propagate;
        self
    }

    pub fn timeout(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.options.timeout = TimeoutPolicy::new(amount, unit);
        self
    }

    pub fn build<T: Clone + Send + 'static>(self, seed: Seed<T>) -> Promise<T> {
        match seed {
            Seed::Empty => self.pending(),
            Seed::Value(v) => self.value(v),
            Seed::Supplier(f) => self.supply(f),
        }
    }

    pub fn pending<T: Clone + Send + 'static>(self) -> Promise<T> {
        Promise {
            shared: Arc::new(Shared::pending()),
            options: self.options,
        }
    }

    pub fn value<T: Clone + Send + 'static>(self, value: T) -> Promise<T> {
        Promise {
            shared: Arc::new(Shared::completed(value)),
            options: self.options,
        }
    }

    pub fn supply<T, F>(self, f: F) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let promise = self.pending();
        let exec = promise.executor();
        let context = promise.capture_context(&exec);
        promise.schedule_on(&exec, Callable::supplier(f), context);
        promise
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// A pending promise, to be settled by hand.
    pub fn new() -> Self {
        PromiseBuilder::new().pending()
    }

    pub fn builder() -> PromiseBuilder {
        PromiseBuilder::new()
    }

    /// A promise already completed with `value`.
    pub fn completed(value: T) -> Self {
        PromiseBuilder::new().value(value)
    }

    /// A promise already failed with `err`.
    pub fn failed(err: Error) -> Self {
        let p = Self::new();
        p.shared.fail(err);
        p
    }

    /// Complete with `value`. Returns false if the promise had already
    /// settled, in which case `value` is discarded.
    pub fn complete(&self, value: T) -> bool {
        let won = self.shared.complete(value);
        self.trace("completed", won);
        won
    }

    /// Fail with `err`. Same first-writer-wins contract as
    /// [Promise::complete].
    pub fn complete_exceptionally(&self, err: Error) -> bool {
        let won = self.shared.fail(err);
        self.trace("failed", won);
        won
    }

    /// Cancel the promise if it has not settled yet.
    ///
    /// Work for this promise that has not started yet is skipped when its
    /// turn comes. With `may_interrupt`, work already running for this promise has its
    /// [Interrupt] raised. That work keeps running until it notices through
    /// [interrupted](crate::task::interrupted); whatever it produces is then
    /// discarded.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let won = self.shared.cancel();
        self.trace("cancelled", won);

        if won && may_interrupt {
            if let Some(interrupt) = self.shared.interrupt() {
                interrupt.raise();
            }
        }

        won
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn is_done(&self) -> bool {
        self.state() != State::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == State::Cancelled
    }

    pub fn is_completed_exceptionally(&self) -> bool {
        self.state() == State::Exceptional
    }

    /// Block until the promise settles.
    ///
    /// *Note* this waits forever on a promise nobody settles. Use
    /// [Promise::get_timeout] for a bounded wait.
    pub fn get(&self) -> Result<T> {
        self.shared.wait(None).unwrap_or_else(|| Err(Error::Timeout(Duration::MAX)))
    }

    /// Block for at most `timeout`, failing with [Error::Timeout] if the
    /// promise is still pending by then.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        self.shared
            .wait(Some(timeout))
            .unwrap_or(Err(Error::Timeout(timeout)))
    }

    /// [Promise::get_timeout] with the bound given as an amount and unit.
    pub fn get_within(&self, amount: u64, unit: TimeUnit) -> Result<T> {
        self.get_timeout(unit.to_duration(amount))
    }

    /// The value if completed, the error if failed, and `default` if pending
    /// or cancelled. Never blocks.
    pub fn get_now(&self, default: T) -> Result<T> {
        match self.shared.peek() {
            Some(Ok(v)) => Ok(v),
            Some(Err(Error::Cancelled)) if self.is_cancelled() => Ok(default),
            Some(Err(e)) => Err(e),
            None => Ok(default),
        }
    }

    /// Set the bound that [Promise::all_of] and [Promise::all_apply] wait
    /// for. It does not affect [Promise::get].
    pub fn with_timeout(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.options.timeout = TimeoutPolicy::new(amount, unit);
        self
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.options.timeout
    }

    /// The executor this promise schedules work on.
    pub fn executor(&self) -> Executor {
        self.options.executor.clone().unwrap_or_else(default_executor)
    }

    /// A fresh pending promise inheriting this one's options.
    pub(crate) fn derive<U: Clone + Send + 'static>(&self) -> Promise<U> {
        Promise {
            shared: Arc::new(Shared::pending()),
            options: self.options.clone(),
        }
    }

    /// A sink that settles this promise with whatever outcome it is given.
    pub(crate) fn sink(&self) -> Sink<T> {
        let target = self.clone();
        Box::new(move |outcome| {
            match outcome {
                Ok(v) => target.complete(v),
                Err(e) => target.complete_exceptionally(e),
            };
        })
    }

    pub(crate) fn capture_context(&self, exec: &Executor) -> Option<Captured> {
        self.options
            .propagate_context
            .then(|| exec.capture_context())
    }

    /// Queue `callable` on `exec`; its outcome settles this promise.
    pub(crate) fn schedule_on<A, B>(
        &self,
        exec: &Executor,
        callable: Callable<T, A, B>,
        context: Option<Captured>,
    ) where
        A: Send + 'static,
        B: Send + 'static,
    {
        let interrupt = Interrupt::new();
        self.shared.attach_interrupt(interrupt.clone());

        if self.options.debug {
            log::debug!(
                "scheduling task on executor {} from thread {}",
                exec.name(),
                std::thread::current().name().unwrap_or("<unnamed>")
            );
        }

        exec.execute(self.adapter(callable).with_context(context), interrupt);
    }

    /// Run `callable` right here; its outcome settles this promise.
    pub(crate) fn run_inline<A, B>(&self, callable: Callable<T, A, B>) {
        self.adapter(callable).run();
    }

    /// Bind `callable` to this promise. It is skipped if the promise has
    /// already settled by the time it would run, e.g. after a cancel.
    fn adapter<A, B>(&self, callable: Callable<T, A, B>) -> Adapter<T, A, B> {
        let shared = self.shared.clone();
        Adapter::new(callable, self.sink())
            .skip_if(move || shared.is_settled())
            .debug(self.options.debug)
    }

    fn trace(&self, what: &str, won: bool) {
        if self.options.debug {
            log::debug!(
                "promise {what} on thread {} ({})",
                std::thread::current().name().unwrap_or("<unnamed>"),
                if won { "settled" } else { "already settled" }
            );
        }
    }
}

impl<U: Clone + Send + 'static> Promise<Option<U>> {
    /// Block until settled; a completed `None` reads as `default`.
    pub fn get_or(&self, default: U) -> Result<U> {
        self.get().map(|v| v.unwrap_or(default))
    }

    /// [Promise::get_timeout], reading a completed `None` as `default`.
    pub fn get_timeout_or(&self, timeout: Duration, default: U) -> Result<U> {
        self.get_timeout(timeout).map(|v| v.unwrap_or(default))
    }
}
