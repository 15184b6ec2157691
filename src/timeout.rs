//! Deadlines for blocking transfers.
//!
//! A configured [`Timeout`] (milliseconds or infinite) is turned into a
//! [`Deadline`] when a blocking Read or Write begins. The deadline is measured
//! on the monotonic clock (`Instant`), so wall-clock adjustments can neither
//! shorten nor lengthen a wait that is already in flight.
//!
//! Waiting is cooperative: [`Deadline::wait`] parks the caller on a condition
//! variable until it is notified or the deadline passes.

use crate::error::{TransferError, TransferResult};
use parking_lot::{Condvar, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Sentinel used by the millisecond-based surface for "never expires".
pub const INFINITE_TIMEOUT: i64 = -1;

/// Configured timeout for a blocking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "i64", try_from = "i64")]
pub enum Timeout {
    /// Wait forever.
    #[default]
    Infinite,
    /// Wait at most this many milliseconds. Zero means "fail immediately
    /// unless the operation can already complete".
    Millis(u64),
}

impl Timeout {
    /// Convert the millisecond representation used in configuration and on
    /// the caller surface. `-1` is infinite; any other negative value is
    /// rejected.
    pub fn from_millis(ms: i64) -> TransferResult<Self> {
        match ms {
            INFINITE_TIMEOUT => Ok(Self::Infinite),
            ms if ms < 0 => Err(TransferError::invalid_argument(
                "timeout",
                format!("{ms} is negative and not the infinite sentinel ({INFINITE_TIMEOUT})"),
            )),
            ms => Ok(Self::Millis(ms as u64)),
        }
    }

    /// The millisecond representation, `-1` for infinite.
    pub fn as_millis(&self) -> i64 {
        match self {
            Self::Infinite => INFINITE_TIMEOUT,
            Self::Millis(ms) => i64::try_from(*ms).unwrap_or(i64::MAX),
        }
    }

    /// The timeout as a `Duration`, `None` for infinite.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::Millis(ms) => Some(Duration::from_millis(*ms)),
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<Timeout> for i64 {
    fn from(timeout: Timeout) -> Self {
        timeout.as_millis()
    }
}

impl TryFrom<i64> for Timeout {
    type Error = TransferError;

    fn try_from(ms: i64) -> Result<Self, Self::Error> {
        Self::from_millis(ms)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => write!(f, "infinite"),
            Self::Millis(ms) => write!(f, "{ms}ms"),
        }
    }
}

/// What is left of a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// The deadline never expires.
    Unbounded,
    /// Time left before expiry.
    Left(Duration),
    /// The deadline has passed.
    Expired,
}

/// An absolute point after which a blocking operation gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    timeout: Timeout,
    started: Instant,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Start the clock for an operation governed by `timeout`.
    pub fn begin(timeout: Timeout) -> Self {
        let started = Instant::now();
        let expires_at = timeout.as_duration().map(|d| {
            // Saturate absurdly large timeouts instead of overflowing `Instant`.
            started
                .checked_add(d)
                .unwrap_or_else(|| started + Duration::from_secs(60 * 60 * 24 * 365))
        });
        Self {
            timeout,
            started,
            expires_at,
        }
    }

    /// A deadline that never expires.
    pub fn never() -> Self {
        Self::begin(Timeout::Infinite)
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Time since the deadline was started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The absolute expiry instant, `None` if the deadline never expires.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn remaining(&self) -> Remaining {
        match self.expires_at {
            None => Remaining::Unbounded,
            Some(at) => {
                let now = Instant::now();
                if now >= at {
                    Remaining::Expired
                } else {
                    Remaining::Left(at - now)
                }
            }
        }
    }

    pub fn has_expired(&self) -> bool {
        matches!(self.remaining(), Remaining::Expired)
    }

    /// Park on `condvar` until notified or until the deadline passes.
    ///
    /// Returns `false` when the deadline had already expired or expired while
    /// waiting; the caller must re-check its completion condition either way,
    /// since a notification and the expiry can race.
    pub fn wait<T: ?Sized>(&self, condvar: &Condvar, guard: &mut MutexGuard<'_, T>) -> bool {
        match self.expires_at {
            None => {
                condvar.wait(guard);
                true
            }
            Some(at) => {
                if Instant::now() >= at {
                    return false;
                }
                let result = condvar.wait_until(guard, at);
                !result.timed_out() || Instant::now() < at
            }
        }
    }
}
