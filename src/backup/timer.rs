//! Daily timer for the backup scheduler.

use std::time::Duration;

use chrono::{Local, NaiveTime, TimeDelta, Timelike};
use tokio::time::Instant;

/// Period of the backup timer.
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of the local wall-clock time of day.
pub trait Clock: Send + Sync + 'static {
    fn local_time_of_day(&self) -> NaiveTime;
}

/// The host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_time_of_day(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// A clock that reads `at` when created and then advances with Tokio's
/// clock, so paused-time tests control it.
#[derive(Debug, Clone, Copy)]
pub struct ManualClock {
    at: NaiveTime,
    since: Instant,
}

impl ManualClock {
    pub fn new(at: NaiveTime) -> Self {
        Self {
            at,
            since: Instant::now(),
        }
    }
}

impl Clock for ManualClock {
    fn local_time_of_day(&self) -> NaiveTime {
        let elapsed = TimeDelta::from_std(self.since.elapsed()).unwrap_or(TimeDelta::zero());
        self.at + elapsed
    }
}

/// Time from `now` until the next occurrence of `target`.
///
/// `target - now`, plus whole days while negative. Equal times give zero.
pub fn due_after(target: NaiveTime, now: NaiveTime) -> Duration {
    let day = TimeDelta::days(1);
    let mut due = target.signed_duration_since(now);
    while due < TimeDelta::zero() {
        due += day;
    }
    // Round up to whole seconds so the timer never fires early.
    let subsec = due.subsec_nanos();
    if subsec > 0 {
        due += TimeDelta::seconds(1) - TimeDelta::nanoseconds(i64::from(subsec));
    }
    due.to_std().unwrap_or(Duration::ZERO)
}

/// One armed daily deadline.
///
/// Owned by the scheduler loop; re-arming replaces the deadline in place, so
/// there is never more than one pending fire.
#[derive(Debug)]
pub struct DailyTimer {
    deadline: Instant,
    time_of_day: NaiveTime,
}

impl DailyTimer {
    /// Arm for the next occurrence of `time_of_day`.
    pub fn arm(time_of_day: NaiveTime, clock: &dyn Clock) -> Self {
        let due = due_after(time_of_day, clock.local_time_of_day());
        Self {
            deadline: Instant::now() + due,
            time_of_day: time_of_day.with_nanosecond(0).unwrap_or(time_of_day),
        }
    }

    /// Replace the pending deadline with the next occurrence of `time_of_day`.
    pub fn rearm(&mut self, time_of_day: NaiveTime, clock: &dyn Clock) {
        *self = Self::arm(time_of_day, clock);
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.time_of_day
    }

    /// Time left until the next fire.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Wait for the deadline, then move it one day ahead.
    ///
    /// Cancel safe: dropping the future before it completes leaves the
    /// deadline untouched.
    pub async fn tick(&mut self) {
        tokio::time::sleep_until(self.deadline).await;
        self.deadline += DAY;
    }
}
