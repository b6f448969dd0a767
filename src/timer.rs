use chrono::{DateTime, TimeDelta, Utc};

pub const WARNING_THRESHOLD_MS: i64 = 15 * 60 * 1000;
pub const CRITICAL_THRESHOLD_MS: i64 = 5 * 60 * 1000;
const TICK_INTERVAL_MS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Running,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTick {
    Remaining {
        display: String,
        level: TimerLevel,
    },
    /// `fire_finish` is true only for the first tick at or past the deadline.
    Expired {
        fire_finish: bool,
    },
    Idle,
}

/// Countdown against an absolute end instant. Every tick recomputes the
/// remaining time from the wall clock, so late or skipped ticks never move the
/// deadline.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    end_at: DateTime<Utc>,
    state: TimerState,
    last_tick: Option<DateTime<Utc>>,
    display: String,
    level: TimerLevel,
}

impl CountdownTimer {
    pub fn start(started_at: DateTime<Utc>, duration_secs: u64) -> Self {
        let duration = TimeDelta::try_seconds(i64::try_from(duration_secs).unwrap_or(i64::MAX))
            .unwrap_or(TimeDelta::MAX);
        let end_at = started_at
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            end_at,
            state: TimerState::Running,
            last_tick: None,
            display: format_hms(0),
            level: TimerLevel::Normal,
        }
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        self.end_at
    }

    #[cfg(test)]
    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn level(&self) -> TimerLevel {
        self.level
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        (self.end_at - now).num_milliseconds()
    }

    pub fn should_tick(&self, now: DateTime<Utc>) -> bool {
        self.state == TimerState::Running
            && self
                .last_tick
                .is_none_or(|last| (now - last).num_milliseconds() >= TICK_INTERVAL_MS)
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TimerTick {
        match self.state {
            TimerState::Cancelled => return TimerTick::Idle,
            TimerState::Expired => return TimerTick::Expired { fire_finish: false },
            TimerState::Running => {}
        }
        self.last_tick = Some(now);

        let remaining = self.remaining_ms(now);
        if remaining <= 0 {
            self.state = TimerState::Expired;
            self.display = format_hms(0);
            self.level = TimerLevel::Critical;
            return TimerTick::Expired { fire_finish: true };
        }

        self.display = format_hms(remaining);
        self.level = level_for(remaining);
        TimerTick::Remaining {
            display: self.display.clone(),
            level: self.level,
        }
    }

    /// Stops ticking. A cancelled timer never fires.
    pub fn cancel(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Cancelled;
        }
    }

    pub fn rearm(&mut self) {
        if self.state == TimerState::Cancelled {
            self.state = TimerState::Running;
            self.last_tick = None;
        }
    }
}

pub fn format_hms(remaining_ms: i64) -> String {
    let total_secs = remaining_ms.max(0) / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn level_for(remaining_ms: i64) -> TimerLevel {
    if remaining_ms < CRITICAL_THRESHOLD_MS {
        TimerLevel::Critical
    } else if remaining_ms < WARNING_THRESHOLD_MS {
        TimerLevel::Warning
    } else {
        TimerLevel::Normal
    }
}

#[cfg(test)]
#[path = "../tests/unit/timer_tests.rs"]
mod tests;
