use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::cell::Cell;
use crate::cell::CellRecv;

use super::*;

#[test]
fn runs_a_ready_future_to_completion() {
    let exec = Executor::new();
    let done = Arc::new(AtomicBool::new(false));
    let done_clone = done.clone();
    exec.spawn(async move {
        done_clone.store(true, Ordering::SeqCst);
    });
    exec.run_runnable();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn parks_on_an_unfilled_cell_and_resumes_after_fill() {
    let exec = Executor::new();
    let cell = Arc::new(Cell::<u32>::new());
    let result = Arc::new(Mutex::new(None));
    let result_clone = result.clone();
    let recv = CellRecv::new(cell.clone());
    exec.spawn(async move {
        let value = recv.await;
        *result_clone.lock().unwrap() = Some(value);
    });

    exec.run_runnable();
    assert!(result.lock().unwrap().is_none(), "future should have parked");

    cell.fill(99);
    exec.run_runnable();
    assert_eq!(*result.lock().unwrap(), Some(99));
}

#[test]
fn wake_during_poll_reschedules_task() {
    // A future that wakes itself immediately on its first poll, then
    // completes on the second. Exercises the self-requeue path where
    // `wake_by_ref` fires before `poll` returns `Pending`.
    struct SelfWaking {
        polled_once: bool,
    }
    impl Future for SelfWaking {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.polled_once {
                Poll::Ready(())
            } else {
                self.polled_once = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    let exec = Executor::new();
    exec.spawn(SelfWaking { polled_once: false });
    exec.run_runnable();
}

#[test]
fn catch_unwind_reports_ready_value() {
    let exec = Executor::new();
    let result = Arc::new(Mutex::new(None));
    let result_clone = result.clone();
    exec.spawn(async move {
        let outcome = CatchUnwind::new(async { 42 }).await;
        *result_clone.lock().unwrap() = Some(outcome.is_ok());
    });
    exec.run_runnable();
    assert_eq!(*result.lock().unwrap(), Some(true));
}

#[test]
fn catch_unwind_converts_panic_to_err() {
    let exec = Executor::new();
    let result = Arc::new(Mutex::new(None));
    let result_clone = result.clone();
    exec.spawn(async move {
        let outcome = CatchUnwind::new(async {
            panic!("fiber body exploded");
        })
        .await;
        *result_clone.lock().unwrap() = Some(outcome.is_err());
    });

    // catch_unwind inside poll still prints the default panic hook;
    // suppress it so the test output stays clean.
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    exec.run_runnable();
    std::panic::set_hook(prev_hook);

    assert_eq!(*result.lock().unwrap(), Some(true));
}
