//! The 1 Hz aggregation loop.
//!
//! Grounded on `original_source/dbus-acsystem.py`'s `calculation_loop`
//! (`while True: ... await asyncio.sleep(1)`), translated to a
//! `tokio::time::interval` so a slow tick doesn't drift the schedule.

use std::sync::Arc;
use std::time::Duration;

use crate::monitor::SystemMonitor;

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Runs forever, advancing every leader's control-timeout state machine and
/// republishing its aggregates once per second.
pub async fn run(monitor: Arc<SystemMonitor>) {
    let mut interval = tokio::time::interval(TICK_PERIOD);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        monitor.tick_all().await;
    }
}
