//! Request identifiers and lifecycle status.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Identifier of one request issued by the engine.
///
/// Ids grow monotonically and are never reused for the lifetime of the
/// process. Two values are reserved: [`RequestId::INVALID`] for a rejected
/// request and [`RequestId::PASSIVE`] for fire-and-forget requests that
/// cannot be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(i64);

impl RequestId {
    /// Returned when the engine refuses a request.
    pub const INVALID: RequestId = RequestId(-1);

    /// Returned for fire-and-forget requests.
    pub const PASSIVE: RequestId = RequestId(0);

    /// Wraps a raw id value.
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Raw id value.
    pub const fn as_raw(self) -> i64 {
        self.0
    }

    /// Returns true for ids that name a real, cancellable request.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RequestId::INVALID => write!(f, "req-invalid"),
            RequestId::PASSIVE => write!(f, "req-passive"),
            RequestId(n) => write!(f, "req-{}", n),
        }
    }
}

/// Hands out request ids starting at 1.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicI64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Returns the next unused id.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle status of a request.
///
/// Transitions only move forward:
/// `Created -> Queued -> InFlight -> {Completed | Aborted}`.
/// A queued request may also go straight to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RequestStatus {
    Created = 0,
    Queued = 1,
    InFlight = 2,
    Completed = 3,
    Aborted = 4,
}

impl RequestStatus {
    /// Returns true for `Completed` and `Aborted`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: RequestStatus) -> bool {
        match (self, next) {
            (Self::Created, Self::Queued) => true,
            (Self::Queued, Self::InFlight) => true,
            (Self::Created | Self::Queued | Self::InFlight, Self::Aborted) => true,
            (Self::InFlight, Self::Completed) => true,
            _ => false,
        }
    }

    /// Returns the status name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::InFlight => "in-flight",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
