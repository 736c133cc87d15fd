use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures_lite_waker::noop_waker;

use super::*;

// A tiny no-op waker so we can poll futures by hand without a real executor.
mod futures_lite_waker {
    use std::task::RawWaker;
    use std::task::RawWakerVTable;
    use std::task::Waker;

    fn clone(_: *const ()) -> RawWaker {
        raw()
    }
    fn noop(_: *const ()) {}

    fn raw() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    pub fn noop_waker() -> Waker {
        unsafe { Waker::from_raw(raw()) }
    }
}

#[test]
fn fill_then_poll_resolves_immediately() {
    let cell = Arc::new(Cell::new());
    assert!(cell.fill(42));
    assert!(cell.is_ready());

    let mut recv = CellRecv::new(cell);
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let pinned = std::pin::pin!(&mut recv);
    match pinned.poll(&mut cx) {
        Poll::Ready(v) => assert_eq!(v, 42),
        Poll::Pending => panic!("expected Ready"),
    }
}

#[test]
fn poll_then_fill_wakes() {
    let cell = Arc::new(Cell::new());
    let mut recv = CellRecv::new(cell.clone());
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    {
        let pinned = std::pin::pin!(&mut recv);
        assert_eq!(pinned.poll(&mut cx), Poll::Pending);
    }

    assert!(cell.fill("done"));

    let pinned = std::pin::pin!(&mut recv);
    match pinned.poll(&mut cx) {
        Poll::Ready(v) => assert_eq!(v, "done"),
        Poll::Pending => panic!("expected Ready after fill"),
    }
}

#[test]
fn try_take_is_none_until_filled() {
    let cell = Cell::new();
    assert_eq!(cell.try_take(), None);
    assert!(cell.fill(5));
    assert_eq!(cell.try_take(), Some(5));
    // Taken exactly once.
    assert_eq!(cell.try_take(), None);
}

#[test]
fn second_fill_is_a_noop() {
    let cell = Cell::new();
    assert!(cell.fill(1));
    assert!(!cell.fill(2));
    assert!(cell.is_ready());
}
