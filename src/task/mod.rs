//! Task execution.
//!
//! This module provides the worker pool that promises run their work on. An
//! [Executor] is a cheap, clonable handle to a fixed set of worker threads fed
//! from a shared queue. Scheduling never blocks the caller: the job is queued
//! and the calling thread carries on.
//!
//! Promises that were not given an executor use the process-wide default
//! pool, see [default_executor]. It is created on first use, sized from
//! [Config::from_env](crate::config::Config::from_env), and can be torn down
//! with [shutdown_default].
//!
//! # Example
//!
//! ```
//! use promissory::task::Executor;
//! use std::sync::mpsc::channel;
//!
//! let exec = Executor::builder().threads(2).name_prefix("demo").build().unwrap();
//! let (tx, rx) = channel();
//! exec.spawn(move || tx.send(2 + 8).unwrap()).unwrap();
//! assert_eq!(rx.recv().unwrap(), 10);
//! exec.shutdown();
//! ```
//!
//! # Shutting down
//!
//! [Executor::shutdown] stops accepting work, lets the queue drain and joins
//! the workers. [Executor::shutdown_now] additionally drops whatever is still
//! queued (those promises fail with [Error::Rejected](crate::error::Error::Rejected))
//! and raises the interrupt of every running task, see [interrupted].
use std::{
    fmt,
    sync::{atomic::Ordering, Arc},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{const_mutex, Mutex};

use crate::{
    config::Config,
    context::{self, Captured, ContextHook},
    error::{Error, Result},
};

pub(crate) mod adapter;
mod interrupt;
mod worker;

pub use interrupt::{interrupted, Interrupt};

use adapter::Adapter;
use worker::{worker_loop, Job, WorkerShared};

struct Pool {
    name: String,
    threads: usize,
    tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<WorkerShared>,
    hook: Option<Arc<dyn ContextHook>>,
}

/// A handle to a pool of worker threads.
///
/// Clones refer to the same pool. The workers exit once the pool is shut down,
/// or once every handle has been dropped and the queue is empty.
#[derive(Clone)]
pub struct Executor {
    pool: Arc<Pool>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.pool.name)
            .field("threads", &self.pool.threads)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Configures and starts an [Executor].
pub struct ExecutorBuilder {
    threads: usize,
    name_prefix: String,
    hook: Option<Arc<dyn ContextHook>>,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            name_prefix: "promissory".to_string(),
            hook: None,
        }
    }
}

impl ExecutorBuilder {
    /// Number of worker threads. Must be at least one.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Workers are named `<prefix>-<n>`.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Use `hook` instead of the process-wide one to carry context onto this
    /// pool's workers.
    pub fn context_hook(mut self, hook: Arc<dyn ContextHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<Executor> {
        if self.threads == 0 {
            return Err(Error::Validation(
                "an executor needs at least one worker thread".into(),
            ));
        }

        let (tx, rx) = unbounded();
        let shared = Arc::new(WorkerShared::default());
        let mut workers = Vec::with_capacity(self.threads);

        for n in 0..self.threads {
            let rx = rx.clone();
            let shared = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{n}", self.name_prefix))
                .spawn(move || worker_loop(rx, shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Disconnect the queue so the workers already started exit.
                    drop(tx);
                    for w in workers {
                        let _ = w.join();
                    }
                    return Err(e.into());
                }
            }
        }

        log::debug!(
            "started executor {} with {} workers",
            self.name_prefix,
            self.threads
        );

        Ok(Executor {
            pool: Arc::new(Pool {
                name: self.name_prefix,
                threads: self.threads,
                tx: Mutex::new(Some(tx)),
                workers: Mutex::new(workers),
                shared,
                hook: self.hook,
            }),
        })
    }
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    /// A pool with `threads` workers and default settings otherwise.
    pub fn new(threads: usize) -> Result<Self> {
        Self::builder().threads(threads).build()
    }

    /// An executor that rejects everything. Used when the default pool cannot
    /// be started.
    fn closed(name: &str) -> Self {
        Executor {
            pool: Arc::new(Pool {
                name: name.to_string(),
                threads: 0,
                tx: Mutex::new(None),
                workers: Mutex::new(Vec::new()),
                shared: Arc::new(WorkerShared::default()),
                hook: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.pool.name
    }

    pub fn threads(&self) -> usize {
        self.pool.threads
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.tx.lock().is_none()
    }

    /// Queue a fire-and-forget closure. Fails with [Error::Rejected] if the
    /// pool has been shut down.
    pub fn spawn<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Job {
            interrupt: Interrupt::new(),
            run: Box::new(f),
        })
    }

    fn submit(&self, job: Job) -> Result<()> {
        // A refused job may complete promises when dropped, so it must not be
        // dropped while the lock is held.
        let tx = self.pool.tx.lock().clone();
        let Some(tx) = tx else {
            return Err(Error::Rejected);
        };

        tx.send(job).map_err(|_| Error::Rejected)
    }

    /// Queue an adapter. If the pool refuses it, dropping the adapter reports
    /// the rejection to its sink.
    pub(crate) fn execute<R, A, B>(&self, adapter: Adapter<R, A, B>, interrupt: Interrupt)
    where
        R: 'static,
        A: Send + 'static,
        B: Send + 'static,
    {
        let job = Job {
            interrupt,
            run: Box::new(move || adapter.run()),
        };

        if self.submit(job).is_err() {
            log::warn!("executor {} rejected a task after shutdown", self.pool.name);
        }
    }

    /// Snapshot the calling thread's context with this pool's hook.
    pub(crate) fn capture_context(&self) -> Captured {
        let hook = self.pool.hook.clone().unwrap_or_else(context::hook);
        Captured::capture(hook)
    }

    /// Stop accepting work, let queued jobs finish and join the workers.
    ///
    /// Called from one of this pool's own workers, the calling worker is not
    /// joined; it exits after its current job.
    pub fn shutdown(&self) {
        let Some(tx) = self.pool.tx.lock().take() else {
            return;
        };
        drop(tx);

        let me = thread::current().id();
        let workers = std::mem::take(&mut *self.pool.workers.lock());
        for w in workers {
            if w.thread().id() == me {
                continue;
            }
            if w.join().is_err() {
                log::warn!("a worker of executor {} panicked", self.pool.name);
            }
        }

        log::debug!("executor {} shut down", self.pool.name);
    }

    /// Drop queued work, interrupt running tasks, then [Executor::shutdown].
    pub fn shutdown_now(&self) {
        self.pool.shared.discard.store(true, Ordering::Release);
        let interrupted = self.pool.shared.interrupt_all();
        log::debug!(
            "executor {} interrupting {interrupted} running tasks",
            self.pool.name
        );
        self.shutdown();
    }
}

static DEFAULT: Mutex<Option<Executor>> = const_mutex(None);

/// The process-wide pool used by promises that were not given an executor.
///
/// Created on first use. If it was shut down with [shutdown_default] a fresh
/// one is started.
pub fn default_executor() -> Executor {
    let mut default = DEFAULT.lock();

    if let Some(exec) = default.as_ref().filter(|e| !e.is_shutdown()) {
        return exec.clone();
    }

    let config = Config::from_env().unwrap_or_else(|e| {
        log::warn!("ignoring bad environment configuration: {e}");
        Config::default()
    });

    let exec = Executor::builder()
        .threads(config.workers)
        .name_prefix("promissory-default")
        .build()
        .unwrap_or_else(|e| {
            log::error!("could not start the default executor: {e}");
            Executor::closed("promissory-default")
        });

    *default = Some(exec.clone());
    exec
}

/// Shut down the default pool, waiting for queued work to finish. Call this
/// before process exit to join the workers.
pub fn shutdown_default() {
    let exec = DEFAULT.lock().take();
    if let Some(exec) = exec {
        exec.shutdown();
    }
}
