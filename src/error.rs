//! Error types.
//!
//! Every fallible operation in this crate returns [Result], whose error side is
//! [Error]. Blocking reads ([crate::promise::Promise::get] and friends) report
//! timeouts and cancellation through the same type, so callers match on the
//! kind instead of catching anything.
//!
//! A promise stores its failure once and hands a clone to every reader, which is
//! why [Error] is `Clone` and wraps foreign errors in an [Arc].
use std::{error::Error as StdError, fmt, sync::Arc, time::Duration};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds a promise can fail or a blocking read can return with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Bad arguments to a combinator or builder, detected at call time.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A bounded wait elapsed before the promise reached a terminal state.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The promise (or one it depends on) was cancelled.
    #[error("promise was cancelled")]
    Cancelled,

    /// Scheduled work failed. The original cause is kept as the source.
    #[error("task failed: {0}")]
    Execution(#[source] Arc<dyn StdError + Send + Sync>),

    /// A dependency of a composite (`then_compose`, `then_combine`,
    /// `all_of`, `all_apply`) failed.
    #[error("dependency failed: {0}")]
    Composition(#[source] Box<Error>),

    /// Work was offered to an executor that has been shut down.
    #[error("executor has shut down")]
    Rejected,
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

impl Error {
    /// An [Error::Execution] carrying only a message.
    pub fn msg(msg: impl fmt::Display) -> Self {
        Self::Execution(Arc::new(Message(msg.to_string())))
    }

    /// Wrap an arbitrary error as the cause of a failed task.
    pub fn execution<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Execution(Arc::new(err))
    }

    pub(crate) fn composition(err: Error) -> Self {
        Self::Composition(Box::new(err))
    }

    /// Strip any [Error::Composition] layers and return the failure that
    /// started the chain.
    pub fn root_cause(&self) -> &Error {
        let mut err = self;
        while let Error::Composition(inner) = err {
            err = inner;
        }
        err
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Error::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Error::Cancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::execution(err)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Self::msg(msg)
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Self::msg(msg)
    }
}
