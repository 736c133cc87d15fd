//! Scheduler configuration: the tunables the timer wheel and process
//! watcher need for their fixed-cadence polling.

use std::time::Duration;

/// Tunables for a [`crate::scheduler::Scheduler`] instance.
///
/// Exists so the fixed-cadence tick thread and the Windows
/// process-watcher poll loop aren't hardcoded magic numbers.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the timer wheel thread wakes to check for expired
    /// timers and sleepers.
    pub timer_resolution: Duration,
    /// How often the process watcher polls on platforms without a
    /// child-exit signal to block on.
    pub windows_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timer_resolution: Duration::from_millis(100),
            windows_poll_interval: Duration::from_millis(50),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timer_resolution(mut self, resolution: Duration) -> Self {
        self.timer_resolution = resolution;
        self
    }

    pub fn with_windows_poll_interval(mut self, interval: Duration) -> Self {
        self.windows_poll_interval = interval;
        self
    }
}

#[cfg(test)]
#[path = "config.test.rs"]
mod tests;
