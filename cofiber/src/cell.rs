//! One-shot synchronization cell: the Rust realization of the "cell" and
//! "fill" data model.
//!
//! Exactly one producer calls [`Cell::fill`]; exactly one consumer later
//! takes the value out via [`CellRecv`]. A second `fill` on an
//! already-resolved cell is a no-op rather than a panic — this is the
//! idempotence the design notes call for so that a worker completion
//! racing a `cancel_task` cannot double-account `events_pending`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::Context;
use std::task::Poll;
use std::task::Waker;

enum State<T> {
    Pending(Option<Waker>),
    Ready(T),
}

/// A single-fill, single-take synchronization cell.
pub(crate) struct Cell<T> {
    state: Mutex<State<T>>,
}

impl<T> Cell<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending(None)),
        }
    }

    /// Completes the cell with `value`. Returns `true` if this call was the
    /// one that filled it, `false` if the cell was already resolved.
    pub(crate) fn fill(&self, value: T) -> bool {
        let waker = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                State::Ready(_) => return false,
                State::Pending(_) => {
                    let prev = std::mem::replace(&mut *state, State::Ready(value));
                    match prev {
                        State::Pending(waker) => waker,
                        State::Ready(_) => unreachable!(),
                    }
                }
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn poll_take(&self, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            State::Ready(_) => {
                let prev = std::mem::replace(&mut *state, State::Pending(None));
                match prev {
                    State::Ready(value) => Poll::Ready(value),
                    State::Pending(_) => unreachable!(),
                }
            }
            State::Pending(waker) => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), State::Ready(_))
    }

    /// Synchronously takes the value if the cell is already resolved,
    /// without registering a waker. Used by the driver loop to read a
    /// top-level fiber's result once it is known to be ready, outside of
    /// any `Future::poll` call.
    pub(crate) fn try_take(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        if matches!(&*state, State::Ready(_)) {
            let prev = std::mem::replace(&mut *state, State::Pending(None));
            match prev {
                State::Ready(value) => Some(value),
                State::Pending(_) => unreachable!(),
            }
        } else {
            None
        }
    }
}

/// A `Future` that resolves once its [`Cell`] has been filled.
pub(crate) struct CellRecv<T> {
    cell: std::sync::Arc<Cell<T>>,
}

impl<T> CellRecv<T> {
    pub(crate) fn new(cell: std::sync::Arc<Cell<T>>) -> Self {
        Self { cell }
    }
}

impl<T> Future for CellRecv<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.cell.poll_take(cx)
    }
}

#[cfg(test)]
#[path = "cell.test.rs"]
mod tests;
