//! Sequential combinators.
//!
//! Each combinator returns a new promise and leaves its parent untouched. The
//! parent only keeps the continuation until it settles; after that the
//! derived promise holds no reference back to it.
//!
//! The plain variants ([Promise::then], [Promise::exceptionally], ...) run
//! their callable on whichever thread settles the parent, or straight away on
//! the calling thread if the parent has already settled. The `_async`
//! variants always queue the callable on an executor.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    task::{adapter::Callable, Executor},
};

use super::{Promise, PromiseBuilder};

impl<T: Clone + Send + 'static> Promise<T> {
    /// Run `f` on the default executor and return a promise of its result.
    pub fn supply_async<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        PromiseBuilder::new().supply(f)
    }

    /// Run `f` on `exec` and return a promise of its result. Promises derived
    /// from the returned one keep scheduling on `exec`.
    pub fn supply_async_on<F>(f: F, exec: &Executor) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        PromiseBuilder::new().executor(exec.clone()).supply(f)
    }

    /// Run `f` on this promise's executor, with this promise's options. The
    /// new promise does not depend on this one.
    pub fn run<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce() -> Result<U> + Send + 'static,
    {
        self.run_on(f, &self.executor())
    }

    pub(crate) fn run_on<U, F>(&self, f: F, exec: &Executor) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce() -> Result<U> + Send + 'static,
    {
        let derived = self.derive::<U>();
        let context = derived.capture_context(exec);
        derived.schedule_on(exec, Callable::supplier(f), context);
        derived
    }

    /// Apply `f` to the value once this promise completes.
    ///
    /// If this promise fails, `f` is skipped and the error passes through
    /// unchanged.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let derived = self.derive::<U>();
        let target = derived.clone();

        self.shared.on_settle(Box::new(move |outcome| match outcome {
            Ok(value) => target.run_inline(Callable::function(f, value)),
            Err(e) => {
                target.complete_exceptionally(e);
            }
        }));

        derived
    }

    /// Alias of [Promise::then].
    pub fn then_apply<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.then(f)
    }

    /// Like [Promise::then], but `f` is queued on this promise's executor.
    pub fn then_async<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.then_async_on(f, &self.executor())
    }

    /// Alias of [Promise::then_async].
    pub fn then_apply_async<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.then_async(f)
    }

    /// Like [Promise::then], but `f` is queued on `exec`.
    ///
    /// The ambient context is captured now, on the calling thread, and
    /// restored around `f` on the worker.
    pub fn then_async_on<U, F>(&self, f: F, exec: &Executor) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let derived = self.derive::<U>();
        let target = derived.clone();
        let context = derived.capture_context(exec);
        let exec = exec.clone();

        self.shared.on_settle(Box::new(move |outcome| match outcome {
            Ok(value) => target.schedule_on(&exec, Callable::function(f, value), context),
            Err(e) => {
                target.complete_exceptionally(e);
            }
        }));

        derived
    }

    /// Chain a step that itself returns a promise, and flatten the result.
    ///
    /// The returned promise settles with the inner promise's value. If the
    /// inner promise fails, the failure is reported as
    /// [Error::Composition].
    pub fn then_compose<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let derived = self.derive::<U>();
        let target = derived.clone();
        let stage = self.derive::<Promise<U>>();

        stage.shared.on_settle(Box::new(move |inner| match inner {
            Ok(inner) => inner.shared.on_settle(Box::new(move |outcome| {
                match outcome {
                    Ok(v) => target.complete(v),
                    Err(e) => target.complete_exceptionally(Error::composition(e)),
                };
            })),
            Err(e) => {
                target.complete_exceptionally(e);
            }
        }));

        self.shared.on_settle(Box::new(move |outcome| match outcome {
            Ok(value) => stage.run_inline(Callable::function(move |v| Ok(f(v)), value)),
            Err(e) => {
                stage.complete_exceptionally(e);
            }
        }));

        derived
    }

    /// Combine this promise with `other` once both complete.
    ///
    /// `f` runs on the thread that completes the second of the two. If either
    /// side fails, the first failure observed is reported as
    /// [Error::Composition] and `f` never runs.
    pub fn then_combine<U, R, F>(&self, other: &Promise<U>, f: F) -> Promise<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> Result<R> + Send + 'static,
    {
        let derived = self.derive::<R>();
        let pair = Arc::new(Mutex::new(Pair {
            left: None,
            right: None,
            f: Some(f),
        }));

        {
            let pair = pair.clone();
            let target = derived.clone();
            self.shared.on_settle(Box::new(move |outcome| match outcome {
                Ok(v) => {
                    pair.lock().left = Some(v);
                    fire(&pair, &target);
                }
                Err(e) => {
                    target.complete_exceptionally(Error::composition(e));
                }
            }));
        }

        {
            let target = derived.clone();
            other.shared.on_settle(Box::new(move |outcome| match outcome {
                Ok(v) => {
                    pair.lock().right = Some(v);
                    fire(&pair, &target);
                }
                Err(e) => {
                    target.complete_exceptionally(Error::composition(e));
                }
            }));
        }

        derived
    }

    /// Recover from a failure.
    ///
    /// `h` runs only if this promise fails (or is cancelled); its result
    /// becomes the value of the returned promise. A successful value passes
    /// through untouched.
    pub fn exceptionally<F>(&self, h: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        let derived = self.derive::<T>();
        let target = derived.clone();

        self.shared.on_settle(Box::new(move |outcome| match outcome {
            Ok(v) => {
                target.complete(v);
            }
            Err(e) => target.run_inline(Callable::function(h, e)),
        }));

        derived
    }

    /// Alias of [Promise::exceptionally].
    pub fn on_exception<F>(&self, h: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        self.exceptionally(h)
    }
}

impl Promise<()> {
    /// Run `f` for its side effects on the default executor.
    pub fn run_async<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self::supply_async(f)
    }
}

struct Pair<T, U, F> {
    left: Option<T>,
    right: Option<U>,
    f: Option<F>,
}

/// Run the combiner once both sides are in. Whichever side arrives second
/// takes everything out of the pair.
fn fire<T, U, R, F>(pair: &Mutex<Pair<T, U, F>>, target: &Promise<R>)
where
    T: Send + 'static,
    U: Send + 'static,
    R: Clone + Send + 'static,
    F: FnOnce(T, U) -> Result<R> + Send + 'static,
{
    let ready = {
        let mut pair = pair.lock();
        if pair.left.is_none() || pair.right.is_none() {
            return;
        }
        (pair.left.take(), pair.right.take(), pair.f.take())
    };

    if let (Some(a), Some(b), Some(f)) = ready {
        target.run_inline(Callable::bi_function(f, a, b));
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc::channel,
            Arc,
        },
        thread,
        time::Duration,
    };

    use anyhow::Result;

    use crate::{
        context,
        error::Error,
        promise::{Promise, PromiseBuilder},
        task::Executor,
    };

    #[test]
    fn then_on_completed() {
        assert_eq!(Promise::completed(5).then(|x| Ok(x * 2)).get().unwrap(), 10);
    }

    #[test]
    fn then_runs_on_completing_thread() {
        let p = Promise::new();
        let (tx, rx) = channel();

        let derived = p.then(move |x: u32| {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
            Ok(x + 1)
        });

        thread::Builder::new()
            .name("completer".into())
            .spawn(move || p.complete(1))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(rx.recv().unwrap(), Some("completer".to_string()));
        assert_eq!(derived.get().unwrap(), 2);
    }

    #[test]
    fn then_skipped_on_failure() {
        let p = Promise::<u32>::failed(Error::msg("boom"));
        let (tx, rx) = channel::<()>();

        let derived = p.then(move |x| {
            tx.send(()).unwrap();
            Ok(x)
        });

        assert!(matches!(derived.get(), Err(Error::Execution(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn error_in_transform_is_captured() {
        let p = Promise::completed(1).then(|_| Err::<u32, _>(Error::msg("nope")));
        assert_eq!(p.get().unwrap_err().to_string(), "task failed: nope");

        let p = Promise::completed(1).then(|_| -> crate::error::Result<u32> { panic!("oops") });
        assert!(p.get().unwrap_err().to_string().contains("oops"));
    }

    #[test]
    fn then_async_hops_to_executor() -> Result<()> {
        let exec = Executor::builder().threads(1).name_prefix("hop").build()?;
        let p = Promise::completed(3);

        let derived = p.then_async_on(
            |x| Ok((x, thread::current().name().map(str::to_string))),
            &exec,
        );

        assert_eq!(derived.get()?, (3, Some("hop-0".to_string())));
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn then_async_carries_context() -> Result<()> {
        let exec = Executor::new(1)?;
        let p = PromiseBuilder::new().executor(exec.clone()).pending();

        context::set_current("request-17".to_string());
        let derived = p.then_async(|x: u32| {
            Ok((x, context::current::<String>().map(|s| (*s).clone())))
        });
        context::clear_current();

        p.complete(1);
        assert_eq!(derived.get()?, (1, Some("request-17".to_string())));
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn context_not_carried_when_disabled() -> Result<()> {
        let exec = Executor::new(1)?;
        context::set_current(5u16);

        let p = PromiseBuilder::new()
            .executor(exec.clone())
            .propagate_context(false)
            .supply(|| Ok(context::current::<u16>().is_some()));

        context::clear_current();
        assert!(!p.get()?);
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn then_async_passes_failure_through() -> Result<()> {
        let exec = Executor::new(1)?;
        let (tx, rx) = channel::<()>();
        let parent = Promise::<u32>::failed(Error::Validation("bad input".into()));

        let derived = parent.then_async_on(
            move |x| {
                tx.send(()).unwrap();
                Ok(x)
            },
            &exec,
        );

        assert!(matches!(derived.get(), Err(Error::Validation(m)) if m == "bad input"));
        exec.shutdown();
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn cancelled_dependent_skips_transform() -> Result<()> {
        let exec = Executor::new(1)?;
        let runs = Arc::new(AtomicUsize::new(0));
        let parent = PromiseBuilder::new().executor(exec.clone()).pending::<u32>();

        let counted = |runs: &Arc<AtomicUsize>| {
            let runs = runs.clone();
            move |x: u32| -> crate::error::Result<u32> {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(x)
            }
        };
        let inline = parent.then(counted(&runs));
        let queued = parent.then_async(counted(&runs));

        assert!(inline.cancel(false));
        assert!(queued.cancel(true));
        parent.complete(1);
        exec.shutdown();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(inline.is_cancelled() && queued.is_cancelled());
        Ok(())
    }

    #[test]
    fn long_chain_settles_on_small_stack() -> Result<()> {
        let value = thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let head = Promise::<u64>::new();
                let mut tail = head.clone();
                for _ in 0..10_000 {
                    tail = tail.then(|x| Ok(x + 1));
                }

                head.complete(0);
                tail.get()
            })?
            .join()
            .unwrap()?;

        assert_eq!(value, 10_000);
        Ok(())
    }

    #[test]
    fn long_chain_settles_on_worker() -> Result<()> {
        let exec = Executor::new(1)?;
        let head = PromiseBuilder::new().executor(exec.clone()).pending::<u64>();
        let mut tail = head.clone();
        for _ in 0..10_000 {
            tail = tail.then(|x| Ok(x + 1));
        }

        let completer = head.clone();
        exec.spawn(move || {
            completer.complete(0);
        })?;

        assert_eq!(tail.get()?, 10_000);
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn then_compose_flattens() -> Result<()> {
        let exec = Executor::new(2)?;
        let inner_exec = exec.clone();

        let p = Promise::supply_async_on(|| Ok(4), &exec)
            .then_compose(move |x| Promise::supply_async_on(move || Ok(x * 10), &inner_exec));

        assert_eq!(p.get()?, 40);
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn then_compose_inner_failure() {
        let p = Promise::completed(1)
            .then_compose(|_| Promise::<u8>::failed(Error::msg("inner")));

        let err = p.get().unwrap_err();
        assert!(matches!(err, Error::Composition(_)));
        assert_eq!(err.root_cause().to_string(), "task failed: inner");
    }

    #[test]
    fn then_combine_adds() {
        let a = Promise::completed(2);
        let b = Promise::completed(3);

        assert_eq!(a.then_combine(&b, |a, b| Ok(a + b)).get().unwrap(), 5);
    }

    #[test]
    fn then_combine_waits_for_both() {
        let a = Promise::new();
        let b = Promise::new();
        let sum = a.then_combine(&b, |a: u32, b: u32| Ok(a + b));

        a.complete(2);
        assert!(!sum.is_done());

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            b.complete(40);
        });

        assert_eq!(sum.get().unwrap(), 42);
    }

    #[test]
    fn then_combine_reports_first_failure() {
        let a = Promise::<u32>::new();
        let b = Promise::<u32>::new();
        let sum = a.then_combine(&b, |a, b| Ok(a + b));

        b.complete_exceptionally(Error::msg("right side"));
        a.complete_exceptionally(Error::msg("left side"));

        let err = sum.get().unwrap_err();
        assert_eq!(err.root_cause().to_string(), "task failed: right side");
    }

    #[test]
    fn exceptionally_recovers() {
        let p = Promise::<&str>::failed(Error::msg("boom")).exceptionally(|e| {
            assert_eq!(e.to_string(), "task failed: boom");
            Ok("recovered")
        });

        assert_eq!(p.get().unwrap(), "recovered");
    }

    #[test]
    fn exceptionally_passes_values_through() {
        let (tx, rx) = channel::<()>();
        let p = Promise::completed(8).on_exception(move |_| {
            tx.send(()).unwrap();
            Ok(0)
        });

        assert_eq!(p.get().unwrap(), 8);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn exceptionally_sees_cancellation() {
        let p = Promise::<u8>::new();
        let recovered = p.exceptionally(|e| Ok(if e.is_cancelled() { 1 } else { 2 }));

        p.cancel(false);
        assert_eq!(recovered.get().unwrap(), 1);
    }

    #[test]
    fn run_then_recover() {
        let p = Promise::<&str>::new()
            .run(|| -> crate::error::Result<&'static str> { Err("boom".into()) })
            .exceptionally(|_| Ok("recovered"));

        assert_eq!(p.get().unwrap(), "recovered");
    }

    #[test]
    fn run_async_for_side_effects() {
        let (tx, rx) = channel();
        let p = Promise::run_async(move || {
            tx.send(1).unwrap();
            Ok(())
        });

        p.get().unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
    }

    #[test]
    fn continuations_keep_registration_order() {
        let p = Promise::new();
        let (tx, rx) = channel();

        let derived: Vec<_> = (0..4)
            .map(|i| {
                let tx = tx.clone();
                p.then(move |x: u32| {
                    tx.send(i).unwrap();
                    Ok(x + i)
                })
            })
            .collect();

        p.complete(10);

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        for (i, d) in derived.iter().enumerate() {
            assert_eq!(d.get().unwrap(), 10 + i as u32);
        }
    }
}
