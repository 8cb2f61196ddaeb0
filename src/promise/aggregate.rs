//! Fan-out and fan-in.
//!
//! [Promise::all_of] and [Promise::all_apply] block the caller until every
//! member has settled, bounded by the timeout configured with
//! [Promise::with_timeout], and return values in input order no matter which
//! member finished first. [Promise::any_of] does not block; it returns a
//! promise that takes the outcome of whichever member settles first.
//!
//! ```
//! use promissory::promise::{Promise, Source};
//! use promissory::timeout::TimeUnit;
//!
//! let slow = Promise::supply_async(|| {
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//!     Ok(1)
//! });
//! let values = Promise::<()>::new()
//!     .with_timeout(5, TimeUnit::Seconds)
//!     .all_of([Source::from(slow), Source::supplier(|| Ok(2)), Source::from(Promise::completed(3))])
//!     .unwrap();
//! assert_eq!(values, vec![1, 2, 3]);
//! ```
use std::sync::Arc;

use crate::{
    error::{Error, Result},
    task::Executor,
};

use super::Promise;

/// A member of an aggregate: an existing promise, or a supplier to schedule.
pub enum Source<T> {
    Promise(Promise<T>),
    Supplier(Box<dyn FnOnce() -> Result<T> + Send>),
}

impl<T> Source<T> {
    pub fn supplier<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Source::Supplier(Box::new(f))
    }
}

impl<T> From<Promise<T>> for Source<T> {
    fn from(p: Promise<T>) -> Self {
        Source::Promise(p)
    }
}

impl<T> From<&Promise<T>> for Source<T> {
    fn from(p: &Promise<T>) -> Self {
        Source::Promise(p.clone())
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    fn resolve<U: Clone + Send + 'static>(&self, source: Source<U>) -> Promise<U> {
        match source {
            Source::Promise(p) => p,
            Source::Supplier(f) => self.run(f),
        }
    }

    /// Wait for every source and return their values in input order.
    ///
    /// Suppliers are scheduled on this promise's executor first. The whole
    /// wait is bounded by this promise's timeout policy; running out of time
    /// fails with [Error::Timeout]. A member that fails makes the aggregate
    /// fail with [Error::Composition], reporting the first failing member in
    /// input order.
    pub fn all_of<U, I>(&self, sources: I) -> Result<Vec<U>>
    where
        U: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Source<U>>,
    {
        let members: Vec<Promise<U>> = sources
            .into_iter()
            .map(|s| self.resolve(s.into()))
            .collect();

        if self.options.debug {
            log::debug!("waiting for {} promises", members.len());
        }

        let deadline = self.options.timeout.deadline();

        members
            .iter()
            .map(|p| match p.shared.wait(deadline.remaining()) {
                None => Err(deadline.error()),
                Some(Ok(v)) => Ok(v),
                Some(Err(e)) => Err(Error::composition(e)),
            })
            .collect()
    }

    /// Apply `f` to every item in parallel on this promise's executor and
    /// collect the results in input order.
    ///
    /// Each result is waited for with this promise's timeout. Failures are
    /// reported like in [Promise::all_of].
    pub fn all_apply<I, U, F>(&self, items: I, f: F) -> Result<Vec<U>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        U: Clone + Send + 'static,
        F: Fn(I::Item) -> Result<U> + Send + Sync + 'static,
    {
        self.all_apply_on(items, f, &self.executor())
    }

    /// [Promise::all_apply] on a given executor.
    pub fn all_apply_on<I, U, F>(&self, items: I, f: F, exec: &Executor) -> Result<Vec<U>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        U: Clone + Send + 'static,
        F: Fn(I::Item) -> Result<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let members: Vec<Promise<U>> = items
            .into_iter()
            .map(|item| {
                let f = f.clone();
                self.run_on(move || f(item), exec)
            })
            .collect();

        if self.options.debug {
            log::debug!(
                "applied function to {} items on executor {}",
                members.len(),
                exec.name()
            );
        }

        let timeout = self.options.timeout.duration();

        members
            .iter()
            .map(|p| match p.shared.wait(timeout) {
                None => Err(Error::Timeout(timeout.unwrap_or_default())),
                Some(Ok(v)) => Ok(v),
                Some(Err(e)) => Err(Error::composition(e)),
            })
            .collect()
    }

    /// A promise that settles like whichever source settles first, value or
    /// error. The rest keep running; their outcomes are ignored.
    ///
    /// Fails with [Error::Validation] if there are no sources.
    pub fn any_of<U, I>(&self, sources: I) -> Result<Promise<U>>
    where
        U: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Source<U>>,
    {
        let members: Vec<Promise<U>> = sources
            .into_iter()
            .map(|s| self.resolve(s.into()))
            .collect();

        if members.is_empty() {
            return Err(Error::Validation("any_of needs at least one source".into()));
        }

        let winner = self.derive::<U>();
        for member in members {
            member.shared.on_settle(winner.sink());
        }

        Ok(winner)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use anyhow::Result;

    use crate::{
        error::Error,
        promise::{Promise, PromiseBuilder},
        task::Executor,
        timeout::TimeUnit,
    };

    use super::Source;

    fn after<T: Clone + Send + 'static>(exec: &Executor, ms: u64, value: T) -> Promise<T> {
        Promise::supply_async_on(
            move || {
                thread::sleep(Duration::from_millis(ms));
                Ok(value)
            },
            exec,
        )
    }

    #[test]
    fn all_of_keeps_input_order() -> Result<()> {
        let exec = Executor::new(3)?;
        let f1 = after(&exec, 150, 1);
        let f2 = after(&exec, 50, 2);
        let f3 = after(&exec, 100, 3);

        let values = PromiseBuilder::new()
            .executor(exec.clone())
            .pending::<()>()
            .all_of([f1, f2, f3])?;

        assert_eq!(values, vec![1, 2, 3]);
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn all_of_schedules_suppliers() -> Result<()> {
        let exec = Executor::new(2)?;
        let parent = PromiseBuilder::new().executor(exec.clone()).pending::<()>();

        let values = parent.all_of([
            Source::supplier(|| Ok("a")),
            Source::from(Promise::completed("b")),
            Source::supplier(|| Ok("c")),
        ])?;

        assert_eq!(values, vec!["a", "b", "c"]);
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn all_of_empty() {
        let values: Vec<u8> = Promise::<()>::new()
            .all_of(Vec::<Promise<u8>>::new())
            .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn all_of_times_out() {
        let never = Promise::<u8>::new();
        let before = Instant::now();

        let result = Promise::<()>::new()
            .with_timeout(50, TimeUnit::Milliseconds)
            .all_of([&never]);

        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_millis(50)));
        assert!(before.elapsed() >= Duration::from_millis(50));
        assert!(before.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn all_of_reports_member_failure() {
        let ok = Promise::completed(1);
        let bad = Promise::<i32>::failed(Error::msg("member"));

        let err = Promise::<()>::new().all_of([ok, bad]).unwrap_err();

        assert!(matches!(err, Error::Composition(_)));
        assert_eq!(err.root_cause().to_string(), "task failed: member");
    }

    #[test]
    fn all_apply_in_parallel() -> Result<()> {
        let exec = Executor::new(4)?;
        let before = Instant::now();

        let values = PromiseBuilder::new()
            .executor(exec.clone())
            .pending::<()>()
            .all_apply(vec![4u64, 3, 2, 1], |x| {
                thread::sleep(Duration::from_millis(x * 50));
                Ok(x * 10)
            })?;

        assert_eq!(values, vec![40, 30, 20, 10]);
        assert!(before.elapsed() < Duration::from_millis(400));
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn all_apply_on_given_executor() -> Result<()> {
        let exec = Executor::builder().threads(2).name_prefix("apply").build()?;

        let names = Promise::<()>::new().all_apply_on(
            0..3,
            |_| Ok(thread::current().name().unwrap_or_default().to_string()),
            &exec,
        )?;

        assert!(names.iter().all(|n| n.starts_with("apply-")));
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn all_apply_reports_first_failure_in_input_order() -> Result<()> {
        crate::test_logger();
        let exec = Executor::new(3)?;

        let err = PromiseBuilder::new()
            .executor(exec.clone())
            .pending::<()>()
            .all_apply([1u64, 2, 3], |x| {
                // Item 3 fails well before item 2 does.
                thread::sleep(Duration::from_millis(if x == 2 { 150 } else { 10 }));
                match x {
                    1 => Ok(x),
                    _ => Err(Error::msg(format!("item {x}"))),
                }
            })
            .unwrap_err();

        assert!(matches!(err, Error::Composition(_)));
        assert_eq!(err.root_cause().to_string(), "task failed: item 2");
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn all_apply_times_out_per_item() -> Result<()> {
        let exec = Executor::new(1)?;

        let result = PromiseBuilder::new()
            .executor(exec.clone())
            .timeout(20, TimeUnit::Milliseconds)
            .pending::<()>()
            .all_apply([300u64], |ms| {
                thread::sleep(Duration::from_millis(ms));
                Ok(ms)
            });

        assert!(matches!(result, Err(e) if e.is_timeout()));
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn any_of_takes_first() -> Result<()> {
        let exec = Executor::new(2)?;
        let slow = after(&exec, 300, "slow");
        let fast = after(&exec, 20, "fast");

        let winner = Promise::<()>::new().any_of([slow, fast])?;

        assert_eq!(winner.get()?, "fast");
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn any_of_takes_first_error() -> Result<()> {
        let exec = Executor::new(2)?;
        let slow = after(&exec, 300, 1);
        let fast = Promise::supply_async_on(
            || {
                thread::sleep(Duration::from_millis(20));
                Err(Error::msg("fast failure"))
            },
            &exec,
        );

        let winner = Promise::<()>::new().any_of([slow, fast])?;

        assert_eq!(winner.get().unwrap_err().to_string(), "task failed: fast failure");
        exec.shutdown();
        Ok(())
    }

    #[test]
    fn any_of_needs_sources() {
        let result = Promise::<()>::new().any_of(Vec::<Promise<u8>>::new());
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
