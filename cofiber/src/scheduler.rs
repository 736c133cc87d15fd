//! The scheduler core and its public primitives.
//!
//! This is where the four subsystems — [`crate::event`], [`crate::worker`],
//! [`crate::timer`] and [`crate::process`] — are wired together behind a
//! single `events_pending` counter and driven by the [`crate::fiber`]
//! executor. A shared `Inner` behind an `Arc`, reached through a
//! thread-local slot, lets a running fiber recover "the current
//! scheduler" without threading a handle through every call site.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use tracing::info;
use tracing::warn;

use crate::cell::Cell;
use crate::cell::CellRecv;
use crate::config::SchedulerConfig;
use crate::error::Cancelled;
use crate::error::Exception;
use crate::error::JobOutcome;
use crate::error::SchedulerError;
use crate::event::Event;
use crate::event::EventChannel;
use crate::event::Fill;
use crate::event::Recv;
use crate::fiber::CatchUnwind;
use crate::fiber::Executor;
use crate::process::ExitStatus;
use crate::process::ProcessWatcher;
use crate::timer::TimerOutcome;
use crate::timer::TimerWheel;
use crate::worker;

pub(crate) struct Inner {
    events: Arc<EventChannel>,
    events_pending: AtomicU64,
    executor: Executor,
    timer_wheel: Arc<TimerWheel>,
    process_watcher: Arc<ProcessWatcher>,
    aborted: AtomicBool,
    threads: Mutex<Vec<Arc<worker::Thread>>>,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<Inner>>> = const { RefCell::new(None) };
}

fn current() -> Arc<Inner> {
    CURRENT.with(|slot| slot.borrow().clone()).unwrap_or_else(|| {
        panic!(
            "cofiber primitive called with no scheduler driving the current thread; \
             this must be called from within a fiber running inside `Scheduler::run` \
             or `Scheduler::run_result`"
        )
    })
}

/// Owns the worker, timer and process-watcher threads for one run of the
/// cooperative scheduler. Create one with [`Scheduler::create`] and drive
/// it with [`Scheduler::run`] or [`Scheduler::run_result`].
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// An opaque handle to the scheduler driving the calling fiber, as
/// returned by [`scheduler`]. Carries no public operations today: every
/// primitive a caller would reach for one to use it with (`create_thread`,
/// `submit`, `create_timer`, `sleep`, `detach`, `wait_for_process`,
/// `abort`) already resolves the same handle internally via [`current`].
pub struct SchedulerHandle {
    #[allow(dead_code)]
    inner: Arc<Inner>,
}

/// Retrieves a handle to the scheduler driving the calling fiber. Panics
/// if called outside a running scheduler, same as every other primitive
/// in this module.
pub fn scheduler() -> SchedulerHandle {
    SchedulerHandle { inner: current() }
}

impl Scheduler {
    pub fn create(config: SchedulerConfig) -> Self {
        crate::process::block_exit_signals();
        let events = Arc::new(EventChannel::new());
        let inner = Arc::new(Inner {
            events: events.clone(),
            events_pending: AtomicU64::new(0),
            executor: Executor::new(),
            timer_wheel: TimerWheel::spawn(events.clone(), config.timer_resolution),
            process_watcher: ProcessWatcher::spawn(events, config.windows_poll_interval),
            aborted: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
        });
        Self { inner }
    }

    /// Runs `fiber` to completion, panicking if the scheduler aborts,
    /// deadlocks, or the fiber body itself panics. Prefer
    /// [`Scheduler::run_result`] if any of those outcomes is expected.
    pub fn run<F, Fut, T>(&self, fiber: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match self.run_result(fiber) {
            Ok(value) => value,
            Err(err) => panic!("cofiber scheduler did not complete normally: {err}"),
        }
    }

    /// Runs `fiber` to completion, returning `Err` instead of hanging or
    /// panicking when the scheduler aborts, deadlocks, or the fiber body
    /// panics.
    pub fn run_result<F, Fut, T>(&self, fiber: F) -> Result<T, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let result_cell: Arc<Cell<JobOutcome<T>>> = Arc::new(Cell::new());
        let producer_cell = result_cell.clone();

        CURRENT.with(|slot| *slot.borrow_mut() = Some(self.inner.clone()));
        let drive_result = self.drive(fiber, producer_cell, &result_cell);
        CURRENT.with(|slot| *slot.borrow_mut() = None);

        self.shutdown();
        drive_result
    }

    fn drive<F, Fut, T>(
        &self,
        fiber: F,
        producer_cell: Arc<Cell<JobOutcome<T>>>,
        result_cell: &Arc<Cell<JobOutcome<T>>>,
    ) -> Result<T, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.executor.spawn(async move {
            match CatchUnwind::new(fiber()).await {
                Ok(value) => {
                    producer_cell.fill(JobOutcome::Ok(value));
                }
                Err(payload) => {
                    producer_cell.fill(JobOutcome::Exception(Exception::from_panic(payload)));
                }
            }
        });

        let mut result = None;

        loop {
            self.inner.executor.run_runnable();

            if result.is_none() {
                if let Some(outcome) = result_cell.try_take() {
                    result = Some(match outcome {
                        JobOutcome::Ok(value) => Ok(value),
                        JobOutcome::Exception(exc) => Err(SchedulerError::Uncaught { source: exc }),
                        JobOutcome::Cancelled => Err(SchedulerError::CodeBug {
                            what: "top-level fiber resolved as Cancelled".to_string(),
                        }),
                    });
                }
            }

            if self.inner.aborted.load(Ordering::SeqCst) {
                return Err(SchedulerError::AbortRequested);
            }

            let pending = self.inner.events_pending.load(Ordering::SeqCst);
            if pending == 0 && self.inner.events.is_empty() {
                return match result {
                    Some(result) => result,
                    None => {
                        warn!("no pending events but the top-level fiber has not resolved");
                        Err(SchedulerError::Never)
                    }
                };
            }

            match self.inner.events.get() {
                Recv::Event(Event::JobCompleted(fill)) => {
                    self.inner.events_pending.fetch_sub(1, Ordering::SeqCst);
                    fill.apply();
                }
                Recv::Event(Event::Abort) => {
                    return Err(SchedulerError::AbortRequested);
                }
                Recv::Closed => {
                    return Err(SchedulerError::CodeBug {
                        what: "event channel closed while scheduler was still running".to_string(),
                    });
                }
            }
        }
    }

    fn shutdown(&self) {
        info!("scheduler shutting down");
        for thread in self.inner.threads.lock().unwrap().drain(..) {
            thread.stop();
            thread.join();
        }
        self.inner.timer_wheel.shutdown(&self.inner.events_pending);
        self.inner.process_watcher.killall();
        self.inner.process_watcher.shutdown();
        self.inner.events.close();
    }
}

/// A handle to a worker thread created with [`create_thread`].
pub struct Thread {
    inner: Arc<worker::Thread>,
}

impl Thread {
    /// Stops accepting new work once the currently queued jobs drain.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

/// Spawns a new worker thread for the currently running scheduler.
pub fn create_thread() -> Thread {
    let inner = current();
    let thread = Arc::new(worker::Thread::spawn(inner.events.clone()));
    inner.threads.lock().unwrap().push(thread.clone());
    Thread { inner: thread }
}

/// A handle to work submitted to a [`Thread`]. `.await` it for the
/// result, or call [`Task::cancel`] to request cancellation.
pub struct Task<A> {
    cell: Arc<Cell<JobOutcome<A>>>,
    thread: Arc<worker::Thread>,
    job_id: worker::JobId,
    events: Arc<EventChannel>,
}

impl<A> Task<A> {
    /// Requests cancellation. Has no effect if the job already started or
    /// finished running; otherwise the job is removed from its thread's
    /// queue and the cell resolves to `JobOutcome::Cancelled` through the
    /// normal event-delivery path, preserving the `events_pending`
    /// accounting invariant.
    pub fn cancel(&self)
    where
        A: Send + 'static,
    {
        if self.thread.cancel_if_not_consumed(self.job_id) {
            self.events.send_many([Event::JobCompleted(Fill::new(
                self.cell.clone(),
                JobOutcome::Cancelled,
            ))]);
        }
    }
}

impl<A> Future for Task<A> {
    type Output = JobOutcome<A>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut recv = CellRecv::new(self.cell.clone());
        Pin::new(&mut recv).poll(cx)
    }
}

/// Awaits `task`'s result without first requesting cancellation. Identical
/// to `.await`ing `task` directly: a `Task` in this design never cancels
/// on drop, only an explicit [`Task::cancel`] call does, so there is no
/// separate "don't cancel on the way out" behavior to opt into.
pub async fn await_no_cancel<A>(task: Task<A>) -> JobOutcome<A> {
    task.await
}

/// Submits `f` to run on `thread`, returning a handle to its eventual
/// result. `f` runs on `thread`'s OS thread, not the driver thread.
pub fn submit<F, A>(thread: &Thread, f: F) -> Result<Task<A>, SchedulerError>
where
    F: FnOnce() -> A + Send + 'static,
    A: Send + 'static,
{
    let inner = current();
    let cell = Arc::new(Cell::new());
    let cell_for_job = cell.clone();
    let job_id = thread
        .inner
        .add_work(
            &inner.events_pending,
            Box::new(move || {
                let outcome = worker::run_protected(f);
                Fill::new(cell_for_job, outcome)
            }),
        )
        .map_err(|()| SchedulerError::Stopped {
            what: "worker thread".to_string(),
        })?;
    Ok(Task {
        cell,
        thread: thread.inner.clone(),
        job_id,
        events: inner.events.clone(),
    })
}

/// A named, re-armable timer created with [`create_timer`].
pub struct Timer {
    id: crate::timer::TimerId,
    delay: Mutex<Duration>,
    wheel: Arc<TimerWheel>,
}

/// Creates a new timer armed with an initial delay. Nothing fires until
/// [`schedule`] is called on it.
pub fn create_timer(delay: Duration) -> Timer {
    let inner = current();
    Timer {
        id: inner.timer_wheel.new_timer_id(),
        delay: Mutex::new(delay),
        wheel: inner.timer_wheel.clone(),
    }
}

/// Changes the delay used by the *next* `schedule` call. Has no effect on
/// an arming already in flight.
pub fn set_delay(timer: &Timer, delay: Duration) {
    *timer.delay.lock().unwrap() = delay;
}

/// Arms `timer` and waits for it to fire, then runs `f` and returns its
/// result. If a later `schedule` or `cancel_timer` call displaces this
/// arming first, resolves to `Err(Cancelled)` instead of running `f`
/// (debounce semantics).
pub async fn schedule<F, Fut, A>(timer: &Timer, f: F) -> Result<A, Cancelled>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = A>,
{
    let inner = current();
    let delay = *timer.delay.lock().unwrap();
    let cell = timer.wheel.schedule(timer.id, delay, &inner.events_pending);
    match CellRecv::new(cell).await {
        TimerOutcome::Resolved => Ok(f().await),
        TimerOutcome::Cancelled => Err(Cancelled),
    }
}

/// Cancels `timer` if it is currently armed. No-op otherwise.
pub fn cancel_timer(timer: &Timer) {
    let inner = current();
    timer.wheel.cancel(timer.id, &inner.events_pending);
}

/// Suspends the calling fiber for at least `delay`.
pub async fn sleep(delay: Duration) {
    let inner = current();
    let cell = inner.timer_wheel.sleep_until(delay, &inner.events_pending);
    CellRecv::new(cell).await;
}

/// Spawns `fiber` to run independently of the caller. The new fiber is
/// driven by the same scheduler and holds `events_pending` open for its
/// whole lifetime, on top of whatever it increments itself through the
/// primitives it awaits: `run`/`run_result` do not return `Ok` until it
/// (and everything else in flight) has finished, even after the
/// top-level fiber has already resolved.
pub fn detach<F, Fut>(fiber: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let inner = current();
    inner.events_pending.fetch_add(1, Ordering::SeqCst);
    let for_task = inner.clone();
    inner.executor.spawn(async move {
        if let Err(payload) = CatchUnwind::new(fiber()).await {
            warn!(
                message = %Exception::from_panic(payload),
                "detached fiber panicked"
            );
        }
        for_task.events_pending.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Waits for the process identified by `pid` to exit, resolving the
/// `Running`/already-exited race.
pub async fn wait_for_process(pid: u32) -> ExitStatus {
    let inner = current();
    let cell = inner.process_watcher.register(pid, &inner.events_pending);
    CellRecv::new(cell).await
}

/// Requests that the running scheduler stop as soon as possible. Any
/// fiber currently blocked in `await`/`sleep`/`schedule`/`wait_for_process`
/// is simply abandoned rather than resumed.
pub fn abort() {
    let inner = current();
    inner.aborted.store(true, Ordering::SeqCst);
    inner.events.send_many([Event::Abort]);
    inner.events.close();
}

#[cfg(test)]
#[path = "scheduler.test.rs"]
mod tests;
