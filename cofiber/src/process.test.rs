#![cfg(unix)]

use std::sync::atomic::AtomicU64;
use std::time::Duration;

use crate::event::Recv;

use super::*;

#[test]
fn register_then_exit_resolves_via_channel() {
    let events = Arc::new(EventChannel::new());
    let watcher = ProcessWatcher::spawn(events.clone(), Duration::from_millis(50));
    let pending = AtomicU64::new(0);

    // Short-lived but not instant, so `register` is guaranteed to run
    // before the child exits.
    let mut child = std::process::Command::new("sleep")
        .arg("0.2")
        .spawn()
        .expect("failed to spawn test child");
    let pid = child.id();

    let cell = watcher.register(pid, &pending);
    assert_eq!(pending.load(Ordering::SeqCst), 1);

    match events.get() {
        Recv::Event(Event::JobCompleted(fill)) => fill.apply(),
        _ => panic!("expected JobCompleted"),
    }
    assert!(cell.is_ready());

    let _ = child.wait();
    watcher.shutdown();
}

#[test]
fn killall_terminates_a_still_watched_child() {
    let events = Arc::new(EventChannel::new());
    let watcher = ProcessWatcher::spawn(events.clone(), Duration::from_millis(50));
    let pending = AtomicU64::new(0);

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("failed to spawn test child");
    let pid = child.id();
    let _cell = watcher.register(pid, &pending);

    watcher.killall();

    let exited = child.wait().expect("wait failed");
    assert!(!exited.success());
    watcher.shutdown();
}

#[test]
fn registering_an_already_watched_pid_is_a_caller_bug() {
    let events = Arc::new(EventChannel::new());
    let watcher = ProcessWatcher::spawn(events.clone(), Duration::from_millis(50));
    let pending = AtomicU64::new(0);

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("failed to spawn test child");
    let pid = child.id();
    let _first = watcher.register(pid, &pending);

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        watcher.register(pid, &pending)
    }));
    std::panic::set_hook(prev_hook);
    assert!(result.is_err());

    watcher.killall();
    let _ = child.wait();
    watcher.shutdown();
}

#[test]
fn exit_before_register_resolves_immediately_without_accounting() {
    let events = Arc::new(EventChannel::new());
    let watcher = ProcessWatcher::spawn(events.clone(), Duration::from_millis(50));
    let pending = AtomicU64::new(0);

    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("failed to spawn test child");
    let pid = child.id();
    let _ = child.wait();

    // Give the watcher thread time to reap it opportunistically before
    // anyone registered interest.
    std::thread::sleep(Duration::from_millis(200));

    let cell = watcher.register(pid, &pending);
    assert!(cell.is_ready());
    assert_eq!(pending.load(Ordering::SeqCst), 0);

    watcher.shutdown();
}
