use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    mem,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    error::{Error, Result},
    task::Interrupt,
};

/// Where a promise is in its life. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Completed,
    Exceptional,
    Cancelled,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Pending => "pending",
            State::Completed => "completed",
            State::Exceptional => "exceptional",
            State::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A continuation, handed the outcome once the promise settles.
pub(crate) type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;

enum Slot<T> {
    Pending(Vec<Callback<T>>),
    Completed(T),
    Exceptional(Error),
    Cancelled,
}

impl<T: Clone> Slot<T> {
    fn state(&self) -> State {
        match self {
            Slot::Pending(_) => State::Pending,
            Slot::Completed(_) => State::Completed,
            Slot::Exceptional(_) => State::Exceptional,
            Slot::Cancelled => State::Cancelled,
        }
    }

    fn outcome(&self) -> Option<Result<T>> {
        match self {
            Slot::Pending(_) => None,
            Slot::Completed(v) => Some(Ok(v.clone())),
            Slot::Exceptional(e) => Some(Err(e.clone())),
            Slot::Cancelled => Some(Err(Error::Cancelled)),
        }
    }
}

type Deferred = Box<dyn FnOnce()>;

thread_local! {
    /// Continuations waiting to run on this thread. `Some` while a settle
    /// further up the stack is draining it.
    static DEFERRED: RefCell<Option<VecDeque<Deferred>>> = const { RefCell::new(None) };
}

/// Run the continuations of one settle.
///
/// A settle that happens inside a running continuation does not recurse:
/// its continuations go to the front of the queue, in order, and the
/// outermost settle runs them once the current one returns. Long chains
/// therefore settle in constant stack depth, in the same order a recursive
/// walk would visit them.
fn dispatch(jobs: Vec<Deferred>) {
    let jobs = DEFERRED.with(|d| match d.borrow_mut().as_mut() {
        Some(queue) => {
            for job in jobs.into_iter().rev() {
                queue.push_front(job);
            }
            None
        }
        None => Some(jobs),
    });

    let Some(jobs) = jobs else {
        return;
    };

    DEFERRED.with(|d| *d.borrow_mut() = Some(VecDeque::from(jobs)));
    let _drain = Drain;

    while let Some(job) = DEFERRED.with(|d| d.borrow_mut().as_mut().and_then(VecDeque::pop_front)) {
        job();
    }
}

/// Ends the drain, also if a continuation unwinds.
struct Drain;

impl Drop for Drain {
    fn drop(&mut self) {
        DEFERRED.with(|d| d.borrow_mut().take());
    }
}

/// The single-write slot behind a promise and all of its handles.
pub(crate) struct Shared<T> {
    slot: Mutex<Slot<T>>,
    done: Condvar,
    interrupt: Mutex<Option<Interrupt>>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    pub fn pending() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending(Vec::new())),
            done: Condvar::new(),
            interrupt: Mutex::new(None),
        }
    }

    pub fn completed(value: T) -> Self {
        Self {
            slot: Mutex::new(Slot::Completed(value)),
            done: Condvar::new(),
            interrupt: Mutex::new(None),
        }
    }

    pub fn state(&self) -> State {
        self.slot.lock().state()
    }

    pub fn is_settled(&self) -> bool {
        self.state() != State::Pending
    }

    pub fn complete(&self, value: T) -> bool {
        self.settle(Slot::Completed(value))
    }

    pub fn fail(&self, err: Error) -> bool {
        self.settle(Slot::Exceptional(err))
    }

    pub fn cancel(&self) -> bool {
        self.settle(Slot::Cancelled)
    }

    /// Move from pending to `next`. Only the first caller wins; the
    /// continuations registered so far then run on this thread, in
    /// registration order, after the lock is released. See `dispatch` for
    /// settles nested inside a continuation.
    fn settle(&self, next: Slot<T>) -> bool {
        let (callbacks, outcome) = {
            let mut slot = self.slot.lock();
            let Slot::Pending(callbacks) = &mut *slot else {
                return false;
            };

            let callbacks = mem::take(callbacks);
            *slot = next;
            self.done.notify_all();

            (callbacks, slot.outcome())
        };

        if let Some(outcome) = outcome {
            let jobs = callbacks
                .into_iter()
                .map(|callback| {
                    let outcome = outcome.clone();
                    Box::new(move || callback(outcome)) as Deferred
                })
                .collect();
            dispatch(jobs);
        }

        true
    }

    /// Run `callback` once the promise settles: immediately on this thread if
    /// it already has, otherwise on whichever thread settles it.
    pub fn on_settle(&self, callback: Callback<T>) {
        let mut slot = self.slot.lock();
        match slot.outcome() {
            None => {
                if let Slot::Pending(callbacks) = &mut *slot {
                    callbacks.push(callback);
                }
            }
            Some(outcome) => {
                drop(slot);
                callback(outcome);
            }
        }
    }

    /// The outcome if settled, without blocking.
    pub fn peek(&self) -> Option<Result<T>> {
        self.slot.lock().outcome()
    }

    /// Block until settled or `timeout` elapses. `None` means the wait timed
    /// out with the promise still pending.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<Result<T>> {
        let deadline = timeout.and_then(|d| Instant::now().checked_add(d));
        let mut slot = self.slot.lock();

        loop {
            if let Some(outcome) = slot.outcome() {
                return Some(outcome);
            }

            // A timeout too large to represent waits forever.
            match deadline {
                Some(at) => {
                    if self.done.wait_until(&mut slot, at).timed_out() {
                        return slot.outcome();
                    }
                }
                None => self.done.wait(&mut slot),
            }
        }
    }

    pub fn attach_interrupt(&self, interrupt: Interrupt) {
        *self.interrupt.lock() = Some(interrupt);
    }

    pub fn interrupt(&self) -> Option<Interrupt> {
        self.interrupt.lock().clone()
    }
}
