//! The fiber driver: a minimal single-threaded, non-work-stealing task
//! executor.
//!
//! There is no native fiber/coroutine primitive in stable Rust, so a
//! fiber body is realized as a boxed `Future`; suspension happens only at
//! the primitives in this crate (`await`, `sleep`, `schedule`,
//! `wait_for_process`, `detach`), each of which parks on a [`crate::cell::Cell`]
//! rather than yielding arbitrarily the way a generic `.await` point
//! could. The executor is the usual `Task`/`Waker`/run-queue shape, with no
//! work-stealing: this driver is always run by exactly one OS thread.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::task::Context;
use std::task::Poll;
use std::task::Wake;
use std::task::Waker;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Task {
    future: Mutex<Option<BoxFuture>>,
    run_queue: Arc<Mutex<VecDeque<Arc<Task>>>>,
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.run_queue.lock().unwrap().push_back(self.clone());
    }
}

/// The runnable-queue executor backing a single scheduler.
pub(crate) struct Executor {
    run_queue: Arc<Mutex<VecDeque<Arc<Task>>>>,
}

impl Executor {
    pub(crate) fn new() -> Self {
        Self {
            run_queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Spawns a new fiber body onto the runnable queue. Used both for the
    /// top-level fiber passed to `run`/`run_result` and for `detach`.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = Arc::new(Task {
            future: Mutex::new(Some(Box::pin(future))),
            run_queue: self.run_queue.clone(),
        });
        self.run_queue.lock().unwrap().push_back(task);
    }

    /// Polls every currently-runnable task once, repeating as polls wake
    /// further tasks, until the runnable queue drains. Every task is then
    /// either finished or parked awaiting a cell that only a background
    /// thread (via the event channel) or a direct synchronous fill can
    /// complete — at that point there is nothing left for this thread to
    /// do until the next event arrives.
    pub(crate) fn run_runnable(&self) {
        loop {
            let task = { self.run_queue.lock().unwrap().pop_front() };
            let Some(task) = task else {
                break;
            };
            let mut slot = task.future.lock().unwrap();
            let Some(mut fut) = slot.take() else {
                continue;
            };
            let waker = Waker::from(task.clone());
            let mut cx = Context::from_waker(&waker);
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {}
                Poll::Pending => *slot = Some(fut),
            }
        }
    }
}

/// Wraps a future so a panic during any single `poll` call surfaces as
/// `Err` instead of unwinding across the driver thread. `run`/`run_result`
/// use this to turn a panicking fiber body into [`crate::error::Exception`]
/// the same way [`crate::worker::run_protected`] does for worker jobs.
pub(crate) struct CatchUnwind<F> {
    inner: Option<F>,
}

impl<F> CatchUnwind<F> {
    pub(crate) fn new(future: F) -> Self {
        Self {
            inner: Some(future),
        }
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = std::thread::Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: we never move `inner` out except on completion, and we
        // never hand out a `&mut F` that outlives this call.
        let this = unsafe { self.get_unchecked_mut() };
        let fut = this
            .inner
            .as_mut()
            .expect("CatchUnwind polled after completion");
        let fut = unsafe { Pin::new_unchecked(fut) };
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fut.poll(cx))) {
            Ok(Poll::Ready(value)) => {
                this.inner = None;
                Poll::Ready(Ok(value))
            }
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => {
                this.inner = None;
                Poll::Ready(Err(payload))
            }
        }
    }
}

#[cfg(test)]
#[path = "fiber.test.rs"]
mod tests;
