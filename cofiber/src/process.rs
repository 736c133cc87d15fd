//! The process watcher: a dedicated thread that reaps child processes
//! registered by pid and resolves the `Running`/already-exited race that
//! happens when a child dies before anyone calls `register` for it.
//!
//! On Unix this blocks on `SIGCHLD`/`SIGUSR1` via `signal-hook` and reaps
//! with a non-blocking `libc::waitpid` directly, rather than also pulling
//! in `nix` for one syscall. On Windows there's no portable signal to
//! block on, so a dedicated thread polls `WaitForSingleObject` with a
//! zero timeout at a fixed cadence via `windows-sys`.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use crate::cell::Cell;
use crate::event::Event;
use crate::event::EventChannel;
use crate::event::Fill;

/// How a watched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
}

enum PidState {
    /// Registered; nothing has reaped it yet.
    Watching(Arc<Cell<ExitStatus>>),
    /// The watcher thread reaped this pid before `register` was called
    /// for it. Resolved the instant `register` shows up.
    Zombie(ExitStatus),
}

struct Tables {
    pids: HashMap<u32, PidState>,
    running: bool,
}

pub(crate) struct ProcessWatcher {
    tables: Mutex<Tables>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessWatcher {
    pub(crate) fn spawn(events: Arc<EventChannel>, windows_poll_interval: Duration) -> Arc<Self> {
        let watcher = Arc::new(Self {
            tables: Mutex::new(Tables {
                pids: HashMap::new(),
                running: true,
            }),
            handle: Mutex::new(None),
        });

        let loop_watcher = watcher.clone();
        let handle = std::thread::Builder::new()
            .name("cofiber-process-watcher".to_string())
            .spawn(move || platform::watch_loop(loop_watcher, events, windows_poll_interval))
            .expect("failed to spawn process watcher thread");
        *watcher.handle.lock().unwrap() = Some(handle);
        watcher
    }

    /// Registers interest in `pid`'s exit. If the watcher already reaped
    /// it (that race), the returned cell is filled immediately and
    /// `events_pending` is left untouched, since no event was ever queued
    /// for an exit nobody was watching for yet.
    pub(crate) fn register(&self, pid: u32, events_pending: &AtomicU64) -> Arc<Cell<ExitStatus>> {
        let mut tables = self.tables.lock().unwrap();
        match tables.pids.remove(&pid) {
            Some(PidState::Zombie(status)) => {
                let cell = Arc::new(Cell::new());
                cell.fill(status);
                cell
            }
            Some(PidState::Watching(_)) => {
                // Registering a pid that's already being watched means the
                // caller reused a pid without first reaping it: a caller
                // bug, not a runtime condition to recover from. Drop the
                // lock first so this panic doesn't poison it for every
                // other pid the watcher is tracking.
                drop(tables);
                panic!("pid {pid} registered while still being watched");
            }
            None => {
                let cell = Arc::new(Cell::new());
                tables.pids.insert(pid, PidState::Watching(cell.clone()));
                events_pending.fetch_add(1, Ordering::SeqCst);
                cell
            }
        }
    }

    /// Forcibly terminates every pid still being watched. Errors from the
    /// underlying platform call (the target may already have exited) are
    /// swallowed; used on shutdown to avoid orphaning residual children.
    pub(crate) fn killall(&self) {
        let tables = self.tables.lock().unwrap();
        let watching: Vec<u32> = tables
            .pids
            .iter()
            .filter(|(_, state)| matches!(state, PidState::Watching(_)))
            .map(|(pid, _)| *pid)
            .collect();
        drop(tables);
        for pid in watching {
            platform::kill(pid);
        }
    }

    pub(crate) fn shutdown(&self) {
        {
            let mut tables = self.tables.lock().unwrap();
            tables.running = false;
        }
        platform::wake(self);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Blocks the exit-related signals on the calling thread so only the
/// process watcher's own thread ever observes them. Called by the worker,
/// timer, and driver threads; a no-op on platforms with no signal mask.
pub(crate) fn block_exit_signals() {
    platform::block_exit_signals();
}

#[cfg(unix)]
mod platform {
    use super::*;

    /// Blocks `SIGCHLD`/`SIGUSR1` on the calling thread so only the
    /// watcher's own signal-handling thread ever observes them.
    pub(super) fn block_exit_signals() {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGCHLD);
            libc::sigaddset(&mut set, libc::SIGUSR1);
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
        }
    }

    pub(super) fn wake(_watcher: &ProcessWatcher) {
        unsafe {
            libc::raise(libc::SIGUSR1);
        }
    }

    pub(super) fn kill(pid: u32) {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
    }

    pub(super) fn watch_loop(
        watcher: Arc<ProcessWatcher>,
        events: Arc<EventChannel>,
        _windows_poll_interval: Duration,
    ) {
        let mut signals = match signal_hook::iterator::Signals::new([
            libc::SIGCHLD,
            libc::SIGUSR1,
        ]) {
            Ok(signals) => signals,
            Err(err) => {
                tracing::error!(%err, "failed to install signal handler, process watcher disabled");
                return;
            }
        };

        for _ in &mut signals {
            if !watcher.tables.lock().unwrap().running {
                return;
            }
            reap_available(&watcher, &events);
        }
    }

    fn reap_available(watcher: &Arc<ProcessWatcher>, events: &Arc<EventChannel>) {
        let mut fills = Vec::new();
        // Held across the whole non-blocking reap loop so a removal and the
        // `waitpid` call that discovered it are atomic: otherwise `register`
        // could observe a stale `Watching` entry for a pid the kernel has
        // already reaped but this thread hasn't removed yet.
        let mut tables = watcher.tables.lock().unwrap();
        loop {
            let mut raw_status: libc::c_int = 0;
            // SAFETY: -1 waits for any child of this process; WNOHANG never blocks.
            let pid = unsafe { libc::waitpid(-1, &mut raw_status, libc::WNOHANG) };
            if pid <= 0 {
                break;
            }
            let status = ExitStatus {
                code: decode_exit_code(raw_status),
            };
            match tables.pids.remove(&(pid as u32)) {
                Some(PidState::Watching(cell)) => {
                    fills.push(Event::JobCompleted(Fill::new(cell, status)));
                }
                Some(PidState::Zombie(_)) | None => {
                    debug!(pid, "reaped unregistered pid, recording as zombie");
                    tables
                        .pids
                        .insert(pid as u32, PidState::Zombie(status));
                }
            }
        }
        drop(tables);
        if !fills.is_empty() {
            events.send_many(fills);
        }
    }

    fn decode_exit_code(raw_status: libc::c_int) -> Option<i32> {
        if unsafe { libc::WIFEXITED(raw_status) } {
            Some(unsafe { libc::WEXITSTATUS(raw_status) })
        } else {
            None
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::*;
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::Foundation::WAIT_OBJECT_0;
    use windows_sys::Win32::System::Threading::GetExitCodeProcess;
    use windows_sys::Win32::System::Threading::OpenProcess;
    use windows_sys::Win32::System::Threading::WaitForSingleObject;
    use windows_sys::Win32::System::Threading::PROCESS_QUERY_LIMITED_INFORMATION;
    use windows_sys::Win32::System::Threading::PROCESS_SYNCHRONIZE;
    use windows_sys::Win32::System::Threading::PROCESS_TERMINATE;
    use windows_sys::Win32::System::Threading::TerminateProcess;

    /// No-op: there's no POSIX-signal mask to manage on this platform.
    pub(super) fn block_exit_signals() {}

    pub(super) fn wake(_watcher: &ProcessWatcher) {
        // No blocking wait to interrupt; the poll loop notices `running`
        // going false on its next tick.
    }

    pub(super) fn kill(pid: u32) {
        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle != 0 {
                TerminateProcess(handle, 1);
                CloseHandle(handle);
            }
        }
    }

    pub(super) fn watch_loop(
        watcher: Arc<ProcessWatcher>,
        events: Arc<EventChannel>,
        poll_interval: Duration,
    ) {
        loop {
            std::thread::sleep(poll_interval);
            if !watcher.tables.lock().unwrap().running {
                return;
            }
            reap_available(&watcher, &events);
        }
    }

    fn reap_available(watcher: &Arc<ProcessWatcher>, events: &Arc<EventChannel>) {
        let exited: Vec<(u32, ExitStatus)> = {
            let tables = watcher.tables.lock().unwrap();
            tables
                .pids
                .iter()
                .filter_map(|(pid, state)| match state {
                    PidState::Watching(_) => try_poll_exit(*pid).map(|status| (*pid, status)),
                    PidState::Zombie(_) => None,
                })
                .collect()
        };

        if exited.is_empty() {
            return;
        }
        let mut fills = Vec::with_capacity(exited.len());
        let mut tables = watcher.tables.lock().unwrap();
        for (pid, status) in exited {
            if let Some(PidState::Watching(cell)) = tables.pids.remove(&pid) {
                fills.push(Event::JobCompleted(Fill::new(cell, status)));
            }
        }
        drop(tables);
        events.send_many(fills);
    }

    fn try_poll_exit(pid: u32) -> Option<ExitStatus> {
        unsafe {
            let handle = OpenProcess(
                PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_SYNCHRONIZE,
                0,
                pid,
            );
            if handle == 0 {
                return None;
            }
            let signaled = WaitForSingleObject(handle, 0) == WAIT_OBJECT_0;
            let result = if signaled {
                let mut code: u32 = 0;
                GetExitCodeProcess(handle, &mut code);
                Some(ExitStatus {
                    code: Some(code as i32),
                })
            } else {
                None
            };
            CloseHandle(handle);
            result
        }
    }
}

#[cfg(test)]
#[path = "process.test.rs"]
mod tests;
