use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cell::Cell;

use super::*;

#[test]
fn fifo_order_is_preserved() {
    let chan = EventChannel::new();
    let cell_a = Arc::new(Cell::new());
    let cell_b = Arc::new(Cell::new());

    chan.send_many([
        Event::JobCompleted(Fill::new(cell_a.clone(), 1)),
        Event::JobCompleted(Fill::new(cell_b.clone(), 2)),
    ]);

    match chan.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell_a.is_ready());
    assert!(!cell_b.is_ready());

    match chan.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell_b.is_ready());
}

#[test]
fn get_blocks_until_send() {
    let chan = Arc::new(EventChannel::new());
    let producer = chan.clone();
    let cell = Arc::new(Cell::new());
    let producer_cell = cell.clone();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        producer.send_many([Event::JobCompleted(Fill::new(producer_cell, 7))]);
    });

    match chan.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell.is_ready());
    handle.join().unwrap();
}

#[test]
fn close_unblocks_waiting_receiver() {
    let chan = Arc::new(EventChannel::new());
    let closer = chan.clone();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        closer.close();
    });

    match chan.get() {
        Recv::Closed => {}
        Recv::Event(_) => panic!("expected Closed"),
    }
    handle.join().unwrap();
}

#[test]
fn send_after_close_panics() {
    let chan = EventChannel::new();
    chan.close();

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        chan.send_many([Event::Abort]);
    }));
    std::panic::set_hook(prev_hook);

    assert!(result.is_err());
}
