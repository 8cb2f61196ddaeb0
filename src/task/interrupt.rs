//! Cooperative interruption.
//!
//! Cancelling a promise with `may_interrupt` set does not stop the code that
//! is computing it. It raises that task's [Interrupt] token, which the task can
//! observe by calling [interrupted] and choose to bail out early.
use std::{
    cell::RefCell,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// A shared flag raised to ask a running task to stop.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Interrupt>> = const { RefCell::new(None) };
}

/// Returns true if the task running on this worker thread has been asked to
/// stop. Always false outside of executor tasks.
pub fn interrupted() -> bool {
    CURRENT.with(|c| c.borrow().as_ref().is_some_and(Interrupt::is_raised))
}

/// Make `token` the current thread's interrupt until the guard drops.
pub(crate) fn enter(token: Interrupt) -> InterruptGuard {
    CURRENT.with(|c| *c.borrow_mut() = Some(token));
    InterruptGuard
}

pub(crate) struct InterruptGuard;

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.borrow_mut().take());
    }
}
