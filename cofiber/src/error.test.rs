use cofiber_error::ErrorExt;
use cofiber_error::StatusCode;

use super::*;

#[test]
fn exception_from_str_panic_keeps_message() {
    let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
    let exc = Exception::from_panic(payload);
    assert_eq!(exc.message(), "boom");
}

#[test]
fn exception_from_string_panic_keeps_message() {
    let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
    let exc = Exception::from_panic(payload);
    assert_eq!(exc.message(), "kaboom");
}

#[test]
fn exception_from_opaque_panic_falls_back() {
    let payload: Box<dyn std::any::Any + Send> = Box::new(42i32);
    let exc = Exception::from_panic(payload);
    assert!(!exc.message().is_empty());
}

#[test]
fn abort_requested_is_not_retryable() {
    let err = SchedulerError::AbortRequested;
    assert_eq!(err.status_code(), StatusCode::Cancelled);
    assert!(!err.is_retryable());
}

#[test]
fn never_is_classified_internal() {
    let err = SchedulerError::Never;
    assert_eq!(err.status_code(), StatusCode::Internal);
    assert!(err.status_code().should_log_error());
}

#[test]
fn stopped_output_msg_shows_detail() {
    let err = SchedulerError::Stopped {
        what: "worker thread".to_string(),
    };
    assert!(err.output_msg().contains("worker thread"));
}
