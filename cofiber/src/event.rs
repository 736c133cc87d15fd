//! The event channel: the single rendezvous point between the worker,
//! timer and process-watcher threads and the fiber driver thread. A plain
//! `Mutex<VecDeque> + Condvar` waiter, favoring blocking std-only
//! synchronization at this lowest layer over an async channel crate.

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::Arc;

use crate::cell::Cell;

/// A type-erased "complete this cell" action. Carrying the action itself
/// (rather than a tag the driver has to look up) is what lets `Worker`,
/// `TimerWheel` and `ProcessWatcher` all post onto the same channel
/// despite each producing a different cell type.
pub(crate) struct Fill(Box<dyn FnOnce() + Send>);

impl Fill {
    pub(crate) fn new<T: Send + 'static>(cell: Arc<Cell<T>>, value: T) -> Self {
        Fill(Box::new(move || {
            cell.fill(value);
        }))
    }

    pub(crate) fn apply(self) {
        (self.0)()
    }
}

/// An item posted to the event channel.
pub(crate) enum Event {
    /// A background thread finished work and is handing a fill to the driver.
    JobCompleted(Fill),
    /// The scheduler is shutting down; wakes a blocked `get()` immediately.
    Abort,
}

struct Inner {
    queue: VecDeque<Event>,
    closed: bool,
}

/// Multi-producer, single-consumer FIFO of [`Event`]s.
pub(crate) struct EventChannel {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

pub(crate) enum Recv {
    Event(Event),
    Closed,
}

impl EventChannel {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Posts one or more events atomically and in order, preserving
    /// temporal-fairness ordering established by the caller.
    ///
    /// Panics if the channel is already closed: every producer thread is
    /// stopped before the channel is closed, so a post reaching this point
    /// afterward means a producer outlived its shutdown, a scheduler bug.
    pub(crate) fn send_many(&self, events: impl IntoIterator<Item = Event>) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.closed, "send_many called on a closed event channel");
        inner.queue.extend(events);
        self.condvar.notify_all();
    }

    /// Blocks until an event is available or the channel is closed.
    pub(crate) fn get(&self) -> Recv {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(event) = inner.queue.pop_front() {
                return Recv::Event(event);
            }
            if inner.closed {
                return Recv::Closed;
            }
            inner = self.condvar.wait(inner).unwrap();
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    /// Marks the channel closed and wakes anyone blocked in `get()`.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
#[path = "event.test.rs"]
mod tests;
