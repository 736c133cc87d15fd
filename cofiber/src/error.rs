//! Typed errors for the scheduler crate: a `Snafu`-derived enum plus an
//! `ErrorExt` impl mapping each variant to a [`StatusCode`].

use std::any::Any;
use std::fmt;

use cofiber_error::ErrorExt;
use cofiber_error::StatusCode;
use snafu::Snafu;

/// The outcome of a unit of work submitted to a worker thread, or of a
/// fiber body run directly by the driver: either it produced a value, it
/// was cancelled before it could, or it unwound via panic.
#[derive(Debug)]
pub enum JobOutcome<T> {
    Ok(T),
    Cancelled,
    Exception(Exception),
}

/// A captured panic payload, downgraded to a displayable message since
/// panic payloads are `Any`, not necessarily `Display` or even `Send`
/// once unwound past `catch_unwind`.
#[derive(Debug, Clone)]
pub struct Exception {
    message: String,
}

impl Exception {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "fiber body panicked with a non-string payload".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Exception {}

/// A cancelled task, timer arming, or sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Errors `run`/`run_result` can surface once the driver stops.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum SchedulerError {
    /// A fiber body raised an exception that nothing caught.
    #[snafu(display("uncaught exception: {source}"))]
    Uncaught { source: Exception },

    /// `abort()` was called.
    #[snafu(display("scheduler aborted"))]
    AbortRequested,

    /// `events_pending` reached zero with the channel empty while fibers
    /// remain blocked: no in-flight work can ever wake them.
    #[snafu(display("deadlock: no pending events but fibers remain blocked"))]
    Never,

    /// A thread was asked to accept work, or a timer/process handle was
    /// used, after it had already been stopped.
    #[snafu(display("operation used a stopped resource: {what}"))]
    Stopped { what: String },

    /// An internal invariant was violated. This indicates a bug in this
    /// crate rather than in caller code.
    #[snafu(display("internal invariant violated: {what}"))]
    CodeBug { what: String },
}

impl ErrorExt for SchedulerError {
    fn status_code(&self) -> StatusCode {
        match self {
            SchedulerError::Uncaught { .. } => StatusCode::Internal,
            SchedulerError::AbortRequested => StatusCode::Cancelled,
            SchedulerError::Never => StatusCode::Internal,
            SchedulerError::Stopped { .. } => StatusCode::InvalidArguments,
            SchedulerError::CodeBug { .. } => StatusCode::Internal,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "error.test.rs"]
mod tests;
