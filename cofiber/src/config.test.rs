use std::time::Duration;

use super::*;

#[test]
fn defaults_match_design_notes() {
    let config = SchedulerConfig::default();
    assert_eq!(config.timer_resolution, Duration::from_millis(100));
    assert_eq!(config.windows_poll_interval, Duration::from_millis(50));
}

#[test]
fn builder_overrides_apply() {
    let config = SchedulerConfig::new()
        .with_timer_resolution(Duration::from_millis(5))
        .with_windows_poll_interval(Duration::from_millis(5));
    assert_eq!(config.timer_resolution, Duration::from_millis(5));
    assert_eq!(config.windows_poll_interval, Duration::from_millis(5));
}
