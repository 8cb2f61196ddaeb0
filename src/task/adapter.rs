//! Callable adapters.
//!
//! User callables come in three shapes: suppliers, one-argument transforms and
//! two-argument combiners. An [Adapter] binds one of them to its arguments,
//! the context it should run under, and a sink that receives the outcome. The
//! same adapter runs inline on the completing thread or on a worker; either
//! way a panic or an `Err` becomes the outcome handed to the sink and never
//! escapes.
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    thread,
};

use crate::{
    context::Captured,
    error::{Error, Result},
};

/// A user callable, tagged by arity, with its arguments bound.
pub(crate) enum Callable<R, A = (), B = ()> {
    Supplier(Box<dyn FnOnce() -> Result<R> + Send>),
    Function(Box<dyn FnOnce(A) -> Result<R> + Send>, A),
    BiFunction(Box<dyn FnOnce(A, B) -> Result<R> + Send>, A, B),
}

impl<R> Callable<R> {
    pub fn supplier(f: impl FnOnce() -> Result<R> + Send + 'static) -> Self {
        Callable::Supplier(Box::new(f))
    }
}

impl<R, A> Callable<R, A> {
    pub fn function(f: impl FnOnce(A) -> Result<R> + Send + 'static, a: A) -> Self {
        Callable::Function(Box::new(f), a)
    }
}

impl<R, A, B> Callable<R, A, B> {
    pub fn bi_function(f: impl FnOnce(A, B) -> Result<R> + Send + 'static, a: A, b: B) -> Self {
        Callable::BiFunction(Box::new(f), a, b)
    }

    fn arity(&self) -> usize {
        match self {
            Callable::Supplier(_) => 0,
            Callable::Function(..) => 1,
            Callable::BiFunction(..) => 2,
        }
    }

    fn call(self) -> Result<R> {
        match self {
            Callable::Supplier(f) => f(),
            Callable::Function(f, a) => f(a),
            Callable::BiFunction(f, a, b) => f(a, b),
        }
    }
}

pub(crate) type Sink<R> = Box<dyn FnOnce(Result<R>) + Send>;

/// Checked right before the callable would run; `true` skips it.
pub(crate) type SkipIf = Box<dyn Fn() -> bool + Send>;

/// A callable ready to run, plus where its outcome goes.
///
/// Dropping an adapter that never ran (for example because the executor
/// refused the job) reports [Error::Rejected] to the sink. An adapter whose
/// skip check passes drops its callable and sink without calling either.
pub(crate) struct Adapter<R, A = (), B = ()> {
    callable: Option<Callable<R, A, B>>,
    sink: Option<Sink<R>>,
    context: Option<Captured>,
    skip_if: Option<SkipIf>,
    debug: bool,
}

impl<R, A, B> Adapter<R, A, B> {
    pub fn new(callable: Callable<R, A, B>, sink: Sink<R>) -> Self {
        Self {
            callable: Some(callable),
            sink: Some(sink),
            context: None,
            skip_if: None,
            debug: false,
        }
    }

    /// Skip the callable if `check` holds once the adapter gets to run,
    /// typically because its promise has been settled in the meantime.
    pub fn skip_if(mut self, check: impl Fn() -> bool + Send + 'static) -> Self {
        self.skip_if = Some(Box::new(check));
        self
    }

    pub fn with_context(mut self, context: Option<Captured>) -> Self {
        self.context = context;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn run(mut self) {
        let (Some(callable), Some(sink)) = (self.callable.take(), self.sink.take()) else {
            return;
        };

        if self.skip_if.as_ref().is_some_and(|check| check()) {
            if self.debug {
                log::debug!(
                    "skipping {}-ary callable, its promise already settled",
                    callable.arity()
                );
            }
            return;
        }

        if self.debug && self.context.is_some() {
            log::debug!(
                "restoring captured context on thread {}",
                thread::current().name().unwrap_or("<unnamed>")
            );
        }
        let _scope = self.context.take().map(Captured::enter);

        if self.debug {
            log::debug!(
                "running {}-ary callable on thread {}",
                callable.arity(),
                thread::current().name().unwrap_or("<unnamed>")
            );
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| callable.call()))
            .unwrap_or_else(|payload| Err(panic_error(payload)));

        if self.debug {
            if let Err(e) = &outcome {
                log::debug!("callable failed: {e}");
            }
        }

        sink(outcome);
    }
}

impl<R, A, B> Drop for Adapter<R, A, B> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            if self.debug {
                log::debug!("callable dropped before it could run");
            }
            sink(Err(Error::Rejected));
        }
    }
}

pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> Error {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string());

    Error::msg(format!("panicked: {msg}"))
}
