//! Ambient execution context.
//!
//! Work scheduled on an [Executor](crate::task::Executor) runs on a different
//! thread from the one that scheduled it. Hosts often keep per-request state in
//! thread-locals (a request id, a tenant, a tracing span) that the scheduled
//! code expects to find. A [ContextHook] snapshots that state on the scheduling
//! thread and restores it on the worker for exactly the duration of the task.
//!
//! The default hook, [ThreadLocalContext], carries a single value set with
//! [set_current]:
//!
//! ```
//! use promissory::{context, promise::Promise};
//!
//! #[derive(Debug, PartialEq)]
//! struct RequestId(u32);
//!
//! context::set_current(RequestId(7));
//! let seen = Promise::supply_async(|| Ok(context::current::<RequestId>().map(|id| id.0)));
//! assert_eq!(seen.get().unwrap(), Some(7));
//! context::clear_current();
//! ```
//!
//! Hosts with their own notion of context install a different hook with
//! [install_hook], or per executor through
//! [ExecutorBuilder::context_hook](crate::task::ExecutorBuilder::context_hook).
use std::{
    any::Any,
    cell::RefCell,
    sync::Arc,
};

use parking_lot::{const_rwlock, RwLock};

/// An opaque snapshot produced by [ContextHook::capture].
pub type Snapshot = Box<dyn Any + Send>;

/// Capture and restore of a host's ambient context.
pub trait ContextHook: Send + Sync {
    /// Snapshot the context of the calling thread.
    fn capture(&self) -> Snapshot;

    /// Make `snapshot` the context of the calling thread.
    fn restore(&self, snapshot: Snapshot);

    /// Remove whatever [ContextHook::restore] installed.
    fn clear(&self);
}

type Value = Arc<dyn Any + Send + Sync>;

thread_local! {
    static CURRENT: RefCell<Option<Value>> = const { RefCell::new(None) };
}

/// Set the calling thread's ambient value, replacing any previous one.
pub fn set_current<T: Any + Send + Sync>(value: T) {
    CURRENT.with(|c| *c.borrow_mut() = Some(Arc::new(value)));
}

/// The calling thread's ambient value, if one of type `T` is set.
pub fn current<T: Any + Send + Sync>() -> Option<Arc<T>> {
    CURRENT.with(|c| c.borrow().clone().and_then(|v| v.downcast::<T>().ok()))
}

pub fn clear_current() {
    CURRENT.with(|c| c.borrow_mut().take());
}

/// The default hook: a single thread-local value.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLocalContext;

impl ContextHook for ThreadLocalContext {
    fn capture(&self) -> Snapshot {
        Box::new(CURRENT.with(|c| c.borrow().clone()))
    }

    fn restore(&self, snapshot: Snapshot) {
        match snapshot.downcast::<Option<Value>>() {
            Ok(value) => CURRENT.with(|c| *c.borrow_mut() = *value),
            Err(_) => log::warn!("ignoring context snapshot from a different hook"),
        }
    }

    fn clear(&self) {
        clear_current();
    }
}

static HOOK: RwLock<Option<Arc<dyn ContextHook>>> = const_rwlock(None);

/// Install the process-wide hook used by executors that were not given one.
pub fn install_hook(hook: Arc<dyn ContextHook>) {
    *HOOK.write() = Some(hook);
}

/// Go back to [ThreadLocalContext] as the process-wide hook.
pub fn reset_hook() {
    HOOK.write().take();
}

pub(crate) fn hook() -> Arc<dyn ContextHook> {
    HOOK.read()
        .clone()
        .unwrap_or_else(|| Arc::new(ThreadLocalContext))
}

/// A snapshot together with the hook that can restore it.
pub(crate) struct Captured {
    hook: Arc<dyn ContextHook>,
    snapshot: Snapshot,
}

impl Captured {
    pub fn capture(hook: Arc<dyn ContextHook>) -> Self {
        let snapshot = hook.capture();
        Self { hook, snapshot }
    }

    /// Restore the snapshot on this thread until the returned scope drops.
    pub fn enter(self) -> Scope {
        self.hook.restore(self.snapshot);
        Scope { hook: self.hook }
    }
}

/// Clears the restored context when dropped, including during unwinding.
pub(crate) struct Scope {
    hook: Arc<dyn ContextHook>,
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.hook.clear();
    }
}
