//! RPC status codes, call-level error signals, completion events and
//! deadlines.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// The 17 canonical RPC status codes carried in `grpc-status` trailers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Wire integer for the `grpc-status` trailer.
    pub fn as_wire(self) -> i32 {
        self as i32
    }

    /// Parse a `grpc-status` trailer value. Unrecognized integers map to
    /// `Unknown`, matching how peers are expected to treat codes they do not
    /// know.
    pub fn from_wire(value: i32) -> StatusCode {
        match value {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            2 => StatusCode::Unknown,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }
}

/// Terminal status of a call: code plus optional human-readable detail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub detail: Option<String>,
}

impl Status {
    pub fn new(code: StatusCode, detail: impl Into<String>) -> Status {
        Status {
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn ok() -> Status {
        Status {
            code: StatusCode::Ok,
            detail: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// Synchronous batch-acceptance errors. These are returned from
/// `Call::start_batch` and never appear as completion events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("operation is not valid on a server-side call")]
    NotOnServer,
    #[error("operation is not valid on a client-side call")]
    NotOnClient,
    #[error("operation was already performed on this call")]
    AlreadyInvoked,
    #[error("operation requires the call to be invoked first")]
    NotInvoked,
    #[error("call has already finished")]
    AlreadyFinished,
    #[error("too many (or duplicate) operations in batch")]
    TooManyOperations,
    #[error("invalid operation flags")]
    InvalidFlags,
    #[error("call failed")]
    Failed,
}

/// Opaque completion tag. Returned verbatim with the event that completes the
/// tagged batch.
pub type Tag = u64;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A batch finished (successfully or not).
    OpComplete,
    /// The completion queue was shut down and is drained.
    Shutdown,
    /// The wait deadline passed without an event.
    Timeout,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub success: bool,
    pub tag: Tag,
}

impl Event {
    pub fn op_complete(tag: Tag, success: bool) -> Event {
        Event {
            kind: EventKind::OpComplete,
            success,
            tag,
        }
    }

    pub(crate) fn shutdown() -> Event {
        Event {
            kind: EventKind::Shutdown,
            success: false,
            tag: 0,
        }
    }

    pub(crate) fn timeout() -> Event {
        Event {
            kind: EventKind::Timeout,
            success: false,
            tag: 0,
        }
    }
}

/// Wall-clock instant as (seconds, nanoseconds), both normalized so
/// `0 <= nanos < 1_000_000_000`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    pub secs: i64,
    pub nanos: u32,
}

impl Timespec {
    pub fn new(secs: i64, nanos: i64) -> Timespec {
        Timespec {
            secs: secs + nanos.div_euclid(1_000_000_000),
            nanos: nanos.rem_euclid(1_000_000_000) as u32,
        }
    }

    pub fn now() -> Timespec {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timespec {
            secs: since_epoch.as_secs() as i64,
            nanos: since_epoch.subsec_nanos(),
        }
    }
}

/// Absolute deadline on the monotonic clock.
///
/// Deadlines deliberately do not use wall-clock time: a clock jump must not
/// expire (or indefinitely extend) an in-flight call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn infinite() -> Deadline {
        Deadline { at: None }
    }

    pub fn after(timeout: Duration) -> Deadline {
        Deadline {
            at: Some(Instant::now() + timeout),
        }
    }

    pub fn after_millis(millis: u64) -> Deadline {
        Deadline::after(Duration::from_millis(millis))
    }

    pub fn expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Time left before expiry. `None` for an infinite deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}
