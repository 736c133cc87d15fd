//! Worker threads: one OS thread per [`Thread`], each draining its own
//! FIFO job queue, pairing the background thread with a completion handle
//! per submitted unit of work and reusing the blocking `Mutex + Condvar`
//! queue shape already established in [`crate::event`].

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::thread::JoinHandle;

use tracing::debug;
use tracing::warn;

use crate::error::Exception;
use crate::error::JobOutcome;
use crate::event::EventChannel;
use crate::event::Event;
use crate::event::Fill;

pub(crate) type JobId = u64;

struct Job {
    id: JobId,
    run: Box<dyn FnOnce() -> Fill + Send>,
}

struct Inner {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    stopped: Mutex<bool>,
    next_job_id: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// A handle to a single worker thread.
pub(crate) struct Thread {
    inner: Arc<Inner>,
}

impl Thread {
    /// Spawns the OS thread and returns a handle to it.
    pub(crate) fn spawn(events: Arc<EventChannel>) -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stopped: Mutex::new(false),
            next_job_id: AtomicU64::new(0),
            handle: Mutex::new(None),
        });

        let worker_inner = inner.clone();
        let handle = std::thread::Builder::new()
            .name("cofiber-worker".to_string())
            .spawn(move || worker_loop(worker_inner, events))
            .expect("failed to spawn worker thread");
        *inner.handle.lock().unwrap() = Some(handle);

        Self { inner }
    }

    /// Enqueues a unit of work, incrementing `events_pending` before the
    /// job becomes observable to the worker thread (the accounting
    /// invariant: the increment must happen-before enqueue).
    pub(crate) fn add_work(
        &self,
        events_pending: &AtomicU64,
        run: Box<dyn FnOnce() -> Fill + Send>,
    ) -> Result<JobId, ()> {
        let id = self.inner.next_job_id.fetch_add(1, Ordering::SeqCst);
        if *self.inner.stopped.lock().unwrap() {
            return Err(());
        }
        events_pending.fetch_add(1, Ordering::SeqCst);
        self.inner.queue.lock().unwrap().push_back(Job { id, run });
        self.inner.condvar.notify_one();
        Ok(id)
    }

    #[cfg(test)]
    pub(crate) fn new_idle() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
                stopped: Mutex::new(false),
                next_job_id: AtomicU64::new(0),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Removes a still-queued job. Returns `true` if it was found and
    /// removed (meaning the caller must still post a `Cancelled` fill
    /// through the event channel to preserve the accounting invariant);
    /// `false` if the job had already been picked up or had already run.
    pub(crate) fn cancel_if_not_consumed(&self, id: JobId) -> bool {
        let mut queue = self.inner.queue.lock().unwrap();
        let before = queue.len();
        queue.retain(|job| job.id != id);
        queue.len() != before
    }

    /// Signals the worker thread to exit once its queue drains, without
    /// running any further jobs submitted after this call.
    pub(crate) fn stop(&self) {
        *self.inner.stopped.lock().unwrap() = true;
        self.inner.condvar.notify_all();
    }

    pub(crate) fn join(&self) {
        let handle = self.inner.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: Arc<Inner>, events: Arc<EventChannel>) {
    crate::process::block_exit_signals();
    loop {
        let job = {
            let mut queue = inner.queue.lock().unwrap();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if *inner.stopped.lock().unwrap() {
                    break None;
                }
                queue = inner.condvar.wait(queue).unwrap();
            }
        };
        let Some(job) = job else {
            debug!("worker thread stopping, queue drained");
            return;
        };
        let fill = (job.run)();
        events.send_many([Event::JobCompleted(fill)]);
    }
}

/// Runs `f` with panics converted into [`JobOutcome::Exception`] rather
/// than unwinding across the worker thread boundary.
pub(crate) fn run_protected<A: Send + 'static>(f: impl FnOnce() -> A) -> JobOutcome<A> {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => JobOutcome::Ok(value),
        Err(payload) => {
            warn!("worker job panicked");
            JobOutcome::Exception(Exception::from_panic(payload))
        }
    }
}

#[cfg(test)]
#[path = "worker.test.rs"]
mod tests;
