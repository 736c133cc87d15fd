use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use crate::cell::Cell;
use crate::event::EventChannel;
use crate::event::Recv;

use super::*;

fn submit<A: Send + 'static>(
    thread: &Thread,
    events_pending: &AtomicU64,
    f: impl FnOnce() -> A + Send + 'static,
) -> Arc<Cell<JobOutcome<A>>> {
    let cell = Arc::new(Cell::new());
    let cell_for_job = cell.clone();
    thread
        .add_work(
            events_pending,
            Box::new(move || {
                let outcome = run_protected(f);
                Fill::new(cell_for_job, outcome)
            }),
        )
        .unwrap();
    cell
}

#[test]
fn job_runs_and_posts_completion_event() {
    let events = Arc::new(EventChannel::new());
    let pending = AtomicU64::new(0);
    let thread = Thread::spawn(events.clone());

    let cell = submit(&thread, &pending, || 2 + 2);
    assert_eq!(pending.load(Ordering::SeqCst), 1);

    match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell.is_ready());

    thread.stop();
    thread.join();
}

#[test]
fn panicking_job_yields_exception_outcome() {
    let events = Arc::new(EventChannel::new());
    let pending = AtomicU64::new(0);
    let thread = Thread::spawn(events.clone());

    let cell = submit(&thread, &pending, || -> u32 { panic!("boom") });

    match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }

    // We can't move the outcome out of the cell without an async poll,
    // so just confirm the completion made it through without the worker
    // thread itself dying.
    assert!(cell.is_ready());
    thread.stop();
    thread.join();
}

#[test]
fn cancel_removes_still_queued_job() {
    // No background thread running, so the job is guaranteed to still be
    // queued when we cancel it.
    let thread = Thread::new_idle();
    let pending = AtomicU64::new(0);

    let id = thread
        .add_work(&pending, Box::new(|| Fill::new(Arc::new(Cell::new()), ())))
        .unwrap();

    assert!(thread.cancel_if_not_consumed(id));
    assert!(!thread.cancel_if_not_consumed(id));
}

#[test]
fn stop_drains_remaining_queue_before_exiting() {
    let events = Arc::new(EventChannel::new());
    let pending = AtomicU64::new(0);
    let thread = Thread::spawn(events.clone());

    let cell = submit(&thread, &pending, || 1);
    thread.stop();
    thread.join();

    // The job enqueued before stop() still ran; its completion is on the channel.
    std::thread::sleep(Duration::from_millis(20));
    match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell.is_ready());
}
