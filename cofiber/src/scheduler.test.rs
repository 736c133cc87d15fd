use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use super::*;

fn config() -> SchedulerConfig {
    SchedulerConfig::new()
        .with_timer_resolution(Duration::from_millis(5))
        .with_windows_poll_interval(Duration::from_millis(5))
}

#[test]
fn run_returns_the_fiber_result() {
    let sched = Scheduler::create(config());
    let value = sched.run(|| async { 1 + 1 });
    assert_eq!(value, 2);
}

#[test]
fn run_result_reports_uncaught_panic() {
    let sched = Scheduler::create(config());
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let err = sched
        .run_result(|| async {
            panic!("exploded");
        })
        .unwrap_err();
    std::panic::set_hook(prev_hook);
    assert!(matches!(err, SchedulerError::Uncaught { .. }));
}

#[test]
fn submit_runs_work_on_a_worker_thread() {
    let sched = Scheduler::create(config());
    let value = sched.run(|| async {
        let thread = create_thread();
        let task = submit(&thread, || 6 * 7).unwrap();
        match task.await {
            JobOutcome::Ok(v) => v,
            other => panic!("unexpected outcome: {other:?}"),
        }
    });
    assert_eq!(value, 42);
}

#[test]
fn cancel_before_worker_picks_up_job_resolves_cancelled() {
    let sched = Scheduler::create(config());
    let outcome = sched.run(|| async {
        let thread = create_thread();
        let task = submit(&thread, || {
            std::thread::sleep(Duration::from_millis(50));
            1
        })
        .unwrap();
        // Cancel a second job before the (single) worker thread could
        // possibly have reached it, since it's still busy on the first.
        let second = submit(&thread, || 2).unwrap();
        second.cancel();
        let first = task.await;
        let second = second.await;
        (matches!(first, JobOutcome::Ok(1)), matches!(second, JobOutcome::Cancelled))
    });
    assert_eq!(outcome, (true, true));
}

#[test]
fn sleep_suspends_and_resumes() {
    let sched = Scheduler::create(config());
    let started = std::time::Instant::now();
    sched.run(|| async {
        sleep(Duration::from_millis(20)).await;
    });
    assert!(started.elapsed() >= Duration::from_millis(15));
}

// `schedule` is an `async fn`: calling it only builds a future, it does
// not arm the timer until that future is first polled. To exercise real
// overlap between two armings (the debounce case) each arming below runs
// in its own detached fiber, so both get polled within the same runnable
// pass as the timer operations that displace or cancel them.

#[test]
fn debounced_schedule_only_runs_the_final_arming() {
    let sched = Scheduler::create(config());
    let first_result = Arc::new(Mutex::new(None));
    let second_result = Arc::new(Mutex::new(None));
    let runs = Arc::new(AtomicUsize::new(0));

    let first_result_outer = first_result.clone();
    let second_result_outer = second_result.clone();
    let runs_outer = runs.clone();
    sched.run(move || async move {
        let timer = Arc::new(create_timer(Duration::from_millis(200)));

        let timer_a = timer.clone();
        detach(move || async move {
            let outcome = schedule(&timer_a, || async { 1 }).await;
            *first_result_outer.lock().unwrap() = Some(outcome);
        });

        sleep(Duration::from_millis(10)).await;

        let timer_b = timer.clone();
        let runs_b = runs_outer.clone();
        detach(move || async move {
            let outcome = schedule(&timer_b, move || async move {
                runs_b.fetch_add(1, Ordering::SeqCst);
                2
            })
            .await;
            *second_result_outer.lock().unwrap() = Some(outcome);
        });

        // Long enough for the (200ms) second arming to fire.
        sleep(Duration::from_millis(260)).await;
    });

    assert_eq!(*first_result.lock().unwrap(), Some(Err(Cancelled)));
    assert_eq!(*second_result.lock().unwrap(), Some(Ok(2)));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_timer_resolves_cancelled_without_running_body() {
    let sched = Scheduler::create(config());
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let result = Arc::new(Mutex::new(None));

    let ran_outer = ran.clone();
    let result_outer = result.clone();
    sched.run(move || async move {
        let timer = Arc::new(create_timer(Duration::from_millis(200)));
        let timer_for_detach = timer.clone();
        detach(move || async move {
            let outcome = schedule(&timer_for_detach, move || async move {
                ran_outer.store(true, Ordering::SeqCst);
            })
            .await;
            *result_outer.lock().unwrap() = Some(outcome);
        });

        sleep(Duration::from_millis(20)).await;
        cancel_timer(&timer);
        // Give the detached fiber a chance to observe the cancellation.
        sleep(Duration::from_millis(20)).await;
    });

    assert_eq!(*result.lock().unwrap(), Some(Err(Cancelled)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn detach_holds_events_pending_until_it_finishes() {
    let sched = Scheduler::create(config());
    let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let finished_for_detach = finished.clone();

    sched.run(move || async move {
        detach(move || async move {
            sleep(Duration::from_millis(30)).await;
            finished_for_detach.store(true, Ordering::SeqCst);
        });
        // The top-level fiber resolves immediately, well before the
        // detached sleep does; `run` must still wait for it.
    });

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(sched.inner.events_pending.load(Ordering::SeqCst), 0);
}

#[test]
fn abort_closes_the_event_channel() {
    let sched = Scheduler::create(config());
    let _ = sched.run_result(|| async {
        abort();
    });

    // `abort` closes the channel itself rather than leaving that to
    // `shutdown`; a send reaching a closed channel now fails fast.
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        sched.inner.events.send_many([Event::Abort]);
    }));
    std::panic::set_hook(prev_hook);

    assert!(result.is_err());
}

#[test]
fn abort_short_circuits_a_blocked_fiber() {
    let sched = Scheduler::create(config());
    let err = sched
        .run_result(|| async {
            detach(|| async {
                sleep(Duration::from_millis(10)).await;
                abort();
            });
            // Sleeps far longer than the detached fiber's abort delay.
            sleep(Duration::from_secs(10)).await;
        })
        .unwrap_err();
    assert!(matches!(err, SchedulerError::AbortRequested));
}

#[test]
fn deadlock_with_no_pending_work_is_reported_as_never() {
    let sched = Scheduler::create(config());
    let cell: Arc<Cell<()>> = Arc::new(Cell::new());
    let err = sched
        .run_result(move || {
            let cell = cell.clone();
            async move {
                // Awaits a cell nothing will ever fill and that was never
                // registered as a pending event.
                CellRecv::new(cell).await;
            }
        })
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Never));
}

#[cfg(unix)]
#[test]
fn wait_for_process_resolves_on_exit() {
    let sched = Scheduler::create(config());
    let status = sched.run(|| async {
        let child = std::process::Command::new("true")
            .spawn()
            .expect("failed to spawn test child");
        wait_for_process(child.id()).await
    });
    assert_eq!(status.code, Some(0));
}
