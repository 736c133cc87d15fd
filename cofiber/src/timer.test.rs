use std::sync::atomic::AtomicU64;
use std::time::Duration;

use crate::event::Recv;

use super::*;

#[test]
fn schedule_fires_via_channel_after_resolution_elapses() {
    let events = Arc::new(EventChannel::new());
    let wheel = TimerWheel::spawn(events.clone(), Duration::from_millis(10));
    let pending = AtomicU64::new(0);

    let id = wheel.new_timer_id();
    let cell = wheel.schedule(id, Duration::from_millis(5), &pending);
    assert_eq!(pending.load(Ordering::SeqCst), 1);

    match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell.is_ready());

    wheel.shutdown(&pending);
}

#[test]
fn rescheduling_displaces_previous_arming_with_direct_cancel() {
    let events = Arc::new(EventChannel::new());
    let wheel = TimerWheel::spawn(events.clone(), Duration::from_millis(500));
    let pending = AtomicU64::new(0);

    let id = wheel.new_timer_id();
    let first = wheel.schedule(id, Duration::from_secs(10), &pending);
    assert_eq!(pending.load(Ordering::SeqCst), 1);

    let second = wheel.schedule(id, Duration::from_secs(10), &pending);
    // Re-arming the same id does not add a second pending slot.
    assert_eq!(pending.load(Ordering::SeqCst), 1);
    assert!(first.is_ready());
    assert!(!second.is_ready());

    wheel.shutdown(&pending);
}

#[test]
fn cancel_decrements_directly_without_a_channel_event() {
    let events = Arc::new(EventChannel::new());
    let wheel = TimerWheel::spawn(events.clone(), Duration::from_millis(500));
    let pending = AtomicU64::new(0);

    let id = wheel.new_timer_id();
    let cell = wheel.schedule(id, Duration::from_secs(10), &pending);
    wheel.cancel(id, &pending);

    assert_eq!(pending.load(Ordering::SeqCst), 0);
    assert!(cell.is_ready());
    assert!(events.is_empty());

    wheel.shutdown(&pending);
}

#[test]
fn cancel_of_unknown_id_is_a_noop() {
    let events = Arc::new(EventChannel::new());
    let wheel = TimerWheel::spawn(events.clone(), Duration::from_millis(500));
    let pending = AtomicU64::new(0);

    wheel.cancel(999, &pending);
    assert_eq!(pending.load(Ordering::SeqCst), 0);

    wheel.shutdown(&pending);
}

#[test]
fn same_tick_fills_are_delivered_in_scheduled_order() {
    let events = Arc::new(EventChannel::new());
    // A long tick so both sleepers land in the same pass despite their
    // different delays.
    let wheel = TimerWheel::spawn(events.clone(), Duration::from_millis(300));
    let pending = AtomicU64::new(0);

    // Registered first but due later than the one registered after it.
    let later = wheel.sleep_until(Duration::from_millis(100), &pending);
    let earlier = wheel.sleep_until(Duration::from_millis(10), &pending);

    let first_fill = match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill,
        _ => panic!("expected JobCompleted"),
    };
    let second_fill = match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill,
        _ => panic!("expected JobCompleted"),
    };

    first_fill.apply();
    assert!(earlier.is_ready());
    assert!(!later.is_ready());
    second_fill.apply();
    assert!(later.is_ready());

    wheel.shutdown(&pending);
}

#[test]
fn sleep_fires_after_delay() {
    let events = Arc::new(EventChannel::new());
    let wheel = TimerWheel::spawn(events.clone(), Duration::from_millis(10));
    let pending = AtomicU64::new(0);

    let cell = wheel.sleep_until(Duration::from_millis(5), &pending);
    match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell.is_ready());

    wheel.shutdown(&pending);
}
