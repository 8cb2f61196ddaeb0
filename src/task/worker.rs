use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use slab::Slab;

use super::{
    adapter::panic_error,
    interrupt::{self, Interrupt},
};

/// A unit of work queued on the pool, and the token used to interrupt it.
pub(crate) struct Job {
    pub interrupt: Interrupt,
    pub run: Box<dyn FnOnce() + Send>,
}

/// State shared between the pool handle and its worker threads.
#[derive(Default)]
pub(crate) struct WorkerShared {
    /// Interrupt tokens of the jobs currently executing.
    pub in_flight: Mutex<Slab<Interrupt>>,
    /// Set by `shutdown_now`; workers drop queued jobs instead of running them.
    pub discard: AtomicBool,
}

impl WorkerShared {
    pub fn interrupt_all(&self) -> usize {
        let in_flight = self.in_flight.lock();
        for (_, token) in in_flight.iter() {
            token.raise();
        }
        in_flight.len()
    }
}

pub(crate) fn worker_loop(rx: Receiver<Job>, shared: Arc<WorkerShared>) {
    while let Ok(job) = rx.recv() {
        if shared.discard.load(Ordering::Acquire) {
            // Dropping the job reports it as rejected to whoever waits on it.
            drop(job);
            continue;
        }

        let key = shared.in_flight.lock().insert(job.interrupt.clone());

        {
            let _guard = interrupt::enter(job.interrupt);
            if let Err(payload) = catch_unwind(AssertUnwindSafe(job.run)) {
                log::warn!("job panicked on worker: {}", panic_error(payload));
            }
        }

        shared.in_flight.lock().remove(key);
    }

    log::debug!(
        "worker {} exiting",
        std::thread::current().name().unwrap_or("<unnamed>")
    );
}
