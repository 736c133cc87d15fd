//! Extension trait shared by every typed error enum in this workspace.
//!
//! Each crate's error type implements [`ErrorExt`] instead of leaking raw
//! strings across crate boundaries, so callers can make retry/log decisions
//! without matching on `Display` text.

use std::error::Error as StdError;
use std::fmt;

use crate::status_code::StatusCode;

/// Classification shared by every error type in the workspace.
pub trait ErrorExt: StdError {
    /// The status code classifying this error.
    fn status_code(&self) -> StatusCode;

    /// Whether retrying the operation that produced this error might succeed.
    fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }

    /// A message safe to show to the caller.
    ///
    /// Errors classified as internal bugs (`status_code().should_log_error()`)
    /// have their message suppressed so implementation details never leak
    /// past the crate boundary; the status code is shown instead.
    fn output_msg(&self) -> String {
        if self.status_code().should_log_error() {
            format!("Internal error: {}", self.status_code() as i32)
        } else {
            self.to_string()
        }
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

/// A minimal [`ErrorExt`] impl for ad-hoc errors that don't warrant their own enum.
#[derive(Debug)]
pub struct PlainError {
    message: String,
    status_code: StatusCode,
}

impl PlainError {
    pub fn new(message: impl Into<String>, status_code: StatusCode) -> Self {
        Self {
            message: message.into(),
            status_code,
        }
    }
}

impl fmt::Display for PlainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for PlainError {}

impl ErrorExt for PlainError {
    fn status_code(&self) -> StatusCode {
        self.status_code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A boxed third-party error annotated with a [`StatusCode`].
#[derive(Debug)]
pub struct BoxedError {
    source: Box<dyn StdError + Send + Sync + 'static>,
    status_code: StatusCode,
}

impl fmt::Display for BoxedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl StdError for BoxedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl ErrorExt for BoxedError {
    fn status_code(&self) -> StatusCode {
        self.status_code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Wraps any third-party error with a [`StatusCode`] classification.
pub fn boxed(
    source: impl StdError + Send + Sync + 'static,
    status_code: StatusCode,
) -> BoxedError {
    BoxedError {
        source: Box::new(source),
        status_code,
    }
}

#[cfg(test)]
#[path = "ext.test.rs"]
mod tests;
