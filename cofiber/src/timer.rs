//! The timer wheel: a dedicated thread that polls at a fixed cadence,
//! plus the arm/debounce/cancel bookkeeping for named timers and the
//! separate list of one-shot sleepers.
//!
//! A bounded polling resolution is favored here over a heap-of-deadlines
//! plus `Condvar`-sleep-until-next-deadline approach, because the coarser
//! cadence also gives `schedule`'s debounce semantics a natural batching
//! point: a `Mutex`-guarded table of armings, each cancellable by a
//! direct fill of its cell.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use tracing::trace;

use crate::cell::Cell;
use crate::event::Event;
use crate::event::EventChannel;
use crate::event::Fill;

pub(crate) type TimerId = u64;

/// Outcome delivered to a fiber blocked in `schedule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerOutcome {
    Resolved,
    Cancelled,
}

struct ActiveTimer {
    scheduled_at: Instant,
    delay: Duration,
    cell: Arc<Cell<TimerOutcome>>,
}

struct Sleeper {
    due_at: Instant,
    cell: Arc<Cell<()>>,
}

struct Tables {
    timers: HashMap<TimerId, ActiveTimer>,
    sleepers: Vec<Sleeper>,
    running: bool,
}

/// Shared state for the timer subsystem; owned by the scheduler and
/// polled by its own dedicated thread.
pub(crate) struct TimerWheel {
    tables: Mutex<Tables>,
    next_timer_id: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerWheel {
    pub(crate) fn spawn(events: Arc<EventChannel>, resolution: Duration) -> Arc<Self> {
        let wheel = Arc::new(Self {
            tables: Mutex::new(Tables {
                timers: HashMap::new(),
                sleepers: Vec::new(),
                running: true,
            }),
            next_timer_id: AtomicU64::new(0),
            handle: Mutex::new(None),
        });

        let loop_wheel = wheel.clone();
        let handle = std::thread::Builder::new()
            .name("cofiber-timer".to_string())
            .spawn(move || tick_loop(loop_wheel, events, resolution))
            .expect("failed to spawn timer thread");
        *wheel.handle.lock().unwrap() = Some(handle);
        wheel
    }

    pub(crate) fn new_timer_id(&self) -> TimerId {
        self.next_timer_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Arms `id` to fire after `delay` from now, returning the cell the
    /// caller should await. If `id` was already armed, the previous
    /// arming's cell is filled with `Cancelled` directly (debounce).
    pub(crate) fn schedule(
        &self,
        id: TimerId,
        delay: Duration,
        events_pending: &AtomicU64,
    ) -> Arc<Cell<TimerOutcome>> {
        let cell = Arc::new(Cell::new());
        let displaced = {
            let mut tables = self.tables.lock().unwrap();
            let scheduled_at = now_or_fallback();
            let prev = tables.timers.insert(
                id,
                ActiveTimer {
                    scheduled_at,
                    delay,
                    cell: cell.clone(),
                },
            );
            if prev.is_none() {
                events_pending.fetch_add(1, Ordering::SeqCst);
            }
            prev
        };
        if let Some(displaced) = displaced {
            displaced.cell.fill(TimerOutcome::Cancelled);
        }
        cell
    }

    /// Cancels an armed timer directly: no event ever flows through the
    /// channel for a cancelled arming, so `events_pending` is decremented
    /// here rather than on a later dequeue.
    pub(crate) fn cancel(&self, id: TimerId, events_pending: &AtomicU64) {
        let removed = self.tables.lock().unwrap().timers.remove(&id);
        if let Some(active) = removed {
            events_pending.fetch_sub(1, Ordering::SeqCst);
            active.cell.fill(TimerOutcome::Cancelled);
        }
    }

    /// Registers a one-shot sleeper due at `now + delay`.
    pub(crate) fn sleep_until(
        &self,
        delay: Duration,
        events_pending: &AtomicU64,
    ) -> Arc<Cell<()>> {
        let cell = Arc::new(Cell::new());
        let due_at = now_or_fallback() + delay;
        self.tables.lock().unwrap().sleepers.push(Sleeper {
            due_at,
            cell: cell.clone(),
        });
        events_pending.fetch_add(1, Ordering::SeqCst);
        cell
    }

    /// Stops the tick thread and cancels every outstanding arming and
    /// sleeper, filling each with `Cancelled` directly (shutdown path;
    /// not expected to leave `events_pending` at zero, since `run` is
    /// already unwinding via `abort`).
    pub(crate) fn shutdown(&self, events_pending: &AtomicU64) {
        let mut tables = self.tables.lock().unwrap();
        tables.running = false;
        for (_, active) in tables.timers.drain() {
            events_pending.fetch_sub(1, Ordering::SeqCst);
            active.cell.fill(TimerOutcome::Cancelled);
        }
        for sleeper in tables.sleepers.drain(..) {
            events_pending.fetch_sub(1, Ordering::SeqCst);
            sleeper.cell.fill(());
        }
        drop(tables);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn now_or_fallback() -> Instant {
    Instant::now()
}

fn tick_loop(wheel: Arc<TimerWheel>, events: Arc<EventChannel>, resolution: Duration) {
    crate::process::block_exit_signals();
    loop {
        std::thread::sleep(resolution);
        if !wheel.tables.lock().unwrap().running {
            return;
        }

        let now = Instant::now();
        let mut fired: Vec<(Instant, Fill)> = Vec::new();
        {
            let mut tables = wheel.tables.lock().unwrap();

            let due_ids: Vec<TimerId> = tables
                .timers
                .iter()
                .filter(|(_, t)| t.scheduled_at + t.delay <= now)
                .map(|(id, _)| *id)
                .collect();
            for id in due_ids {
                if let Some(active) = tables.timers.remove(&id) {
                    fired.push((
                        active.scheduled_at,
                        Fill::new(active.cell, TimerOutcome::Resolved),
                    ));
                }
            }

            let mut remaining = Vec::with_capacity(tables.sleepers.len());
            for sleeper in tables.sleepers.drain(..) {
                if sleeper.due_at <= now {
                    fired.push((sleeper.due_at, Fill::new(sleeper.cell, ())));
                } else {
                    remaining.push(sleeper);
                }
            }
            tables.sleepers = remaining;
        }

        if fired.is_empty() {
            continue;
        }
        // Temporal fairness: fills for entries scheduled earlier are
        // delivered to the driver before later ones even when several
        // land on the same tick.
        fired.sort_by_key(|(at, _)| *at);
        trace!(count = fired.len(), "timer tick firing");
        events.send_many(fired.into_iter().map(|(_, fill)| Event::JobCompleted(fill)));
    }
}

#[cfg(test)]
#[path = "timer.test.rs"]
mod tests;
