//! Timeout policies.
//!
//! A promise carries a [TimeoutPolicy] that bounds the aggregating operations
//! (`all_of` and `all_apply`). By default a promise waits forever. The policy
//! is set with an amount and a [TimeUnit]:
//!
//! ```
//! use promissory::{promise::Promise, timeout::TimeUnit};
//! use std::time::Duration;
//!
//! let p = Promise::<u32>::new().with_timeout(50, TimeUnit::Milliseconds);
//! assert_eq!(p.timeout_policy().duration(), Some(Duration::from_millis(50)));
//!
//! let unit: TimeUnit = "seconds".parse().unwrap();
//! assert_eq!(unit.to_duration(2), Duration::from_secs(2));
//! ```
use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use crate::error::Error;

/// The unit an integer timeout amount is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert `amount` of this unit to a [Duration], saturating on overflow.
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(60 * 60)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(24 * 60 * 60)),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "ns" | "nanos" | "nanosecond" | "nanoseconds" => TimeUnit::Nanoseconds,
            "us" | "micros" | "microsecond" | "microseconds" => TimeUnit::Microseconds,
            "ms" | "millis" | "millisecond" | "milliseconds" => TimeUnit::Milliseconds,
            "s" | "sec" | "secs" | "second" | "seconds" => TimeUnit::Seconds,
            "m" | "min" | "mins" | "minute" | "minutes" => TimeUnit::Minutes,
            "h" | "hour" | "hours" => TimeUnit::Hours,
            "d" | "day" | "days" => TimeUnit::Days,
            other => return Err(Error::Validation(format!("unknown time unit `{other}`"))),
        };

        Ok(unit)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        f.write_str(name)
    }
}

/// How long a blocking aggregate may wait. `None` means forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutPolicy(Option<Duration>);

impl TimeoutPolicy {
    pub const FOREVER: TimeoutPolicy = TimeoutPolicy(None);

    pub fn new(amount: u64, unit: TimeUnit) -> Self {
        Self(Some(unit.to_duration(amount)))
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(Some(d))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    pub fn is_forever(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn deadline(&self) -> Deadline {
        // A bound too far out to represent is no bound at all.
        Deadline(
            self.0
                .and_then(|d| Instant::now().checked_add(d).map(|at| (at, d))),
        )
    }
}

/// A point in time a sequence of waits must finish by.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<(Instant, Duration)>);

impl Deadline {
    /// Time left before the deadline, `None` if unbounded. Once the deadline
    /// has passed this returns a zero duration.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|(at, _)| at.saturating_duration_since(Instant::now()))
    }

    /// The timeout error to report, carrying the full bound.
    pub fn error(&self) -> Error {
        Error::Timeout(self.0.map(|(_, d)| d).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{TimeUnit, TimeoutPolicy};

    #[test]
    fn parse_units() {
        assert_eq!("milliseconds".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert_eq!(" MS ".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert_eq!("minutes".parse::<TimeUnit>().unwrap(), TimeUnit::Minutes);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn conversions() {
        assert_eq!(TimeUnit::Minutes.to_duration(2), Duration::from_secs(120));
        assert_eq!(TimeUnit::Days.to_duration(1), Duration::from_secs(86_400));
        assert_eq!(TimeUnit::Microseconds.to_duration(1500), Duration::from_micros(1500));
        assert_eq!(
            TimeUnit::Days.to_duration(u64::MAX),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn display_round_trips() {
        for unit in [TimeUnit::Seconds, TimeUnit::Hours, TimeUnit::Nanoseconds] {
            assert_eq!(unit.to_string().parse::<TimeUnit>().unwrap(), unit);
        }
    }

    #[test]
    fn default_is_forever() {
        let policy = TimeoutPolicy::default();
        assert!(policy.is_forever());
        assert_eq!(policy.deadline().remaining(), None);
    }

    #[test]
    fn deadline_counts_down() {
        let deadline = TimeoutPolicy::new(20, TimeUnit::Milliseconds).deadline();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn from_duration_matches_amount_and_unit() {
        let policy = TimeoutPolicy::from_duration(Duration::from_secs(90));
        assert_eq!(policy, TimeoutPolicy::new(90, TimeUnit::Seconds));
        assert_eq!(policy.duration(), Some(Duration::from_secs(90)));
        assert!(!policy.is_forever());
    }

    #[test]
    fn unrepresentable_deadline_is_unbounded() {
        let deadline = TimeoutPolicy::new(u64::MAX, TimeUnit::Days).deadline();
        assert_eq!(deadline.remaining(), None);
    }
}
