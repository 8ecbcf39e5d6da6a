//src/timer.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of wall-clock time for timers and session timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Persistable rest countdown. While running, the remaining time is always
/// derived from `ends_at`; `remaining_secs` is authoritative only when paused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestTimerState {
    pub status: TimerStatus,
    pub total_secs: u32,
    pub remaining_secs: u32,
    pub ends_at: Option<DateTime<Utc>>,
}

impl RestTimerState {
    /// A countdown of `total_secs` starting at `now`. Zero yields an idle timer.
    pub fn started(total_secs: u32, now: DateTime<Utc>) -> Self {
        if total_secs == 0 {
            return Self::default();
        }
        Self {
            status: TimerStatus::Running,
            total_secs,
            remaining_secs: total_secs,
            ends_at: Some(now + Duration::seconds(i64::from(total_secs))),
        }
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        match self.status {
            TimerStatus::Idle => 0,
            TimerStatus::Paused => self.remaining_secs,
            TimerStatus::Running => self.ends_at.map_or(0, |end| ceil_secs(end - now)),
        }
    }

    pub fn paused_at(&self, now: DateTime<Utc>) -> Self {
        if self.status != TimerStatus::Running {
            return *self;
        }
        Self {
            status: TimerStatus::Paused,
            remaining_secs: self.remaining_at(now),
            ends_at: None,
            ..*self
        }
    }

    pub fn resumed_at(&self, now: DateTime<Utc>) -> Self {
        if self.status != TimerStatus::Paused {
            return *self;
        }
        Self {
            status: TimerStatus::Running,
            ends_at: Some(now + Duration::seconds(i64::from(self.remaining_secs))),
            ..*self
        }
    }

    pub const fn is_active(&self) -> bool {
        !matches!(self.status, TimerStatus::Idle)
    }
}

fn ceil_secs(delta: Duration) -> u32 {
    let ms = delta.num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    u32::try_from((ms + 999) / 1000).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining_secs: u32 },
    Completed,
}

/// Rest countdown driven by polling. There is a single schedule per timer:
/// `start`, `stop` and `apply` replace it, so no tick from an earlier
/// countdown can fire afterwards.
pub struct RestTimer {
    clock: Arc<dyn Clock>,
    state: RestTimerState,
    tick_interval: Duration,
    next_tick: Option<DateTime<Utc>>,
}

impl RestTimer {
    pub fn new(clock: Arc<dyn Clock>, tick_ms: u64) -> Self {
        let tick_ms = i64::try_from(tick_ms).unwrap_or(1000).max(1);
        Self {
            clock,
            state: RestTimerState::default(),
            tick_interval: Duration::milliseconds(tick_ms),
            next_tick: None,
        }
    }

    /// Current state with `remaining_secs` refreshed from the clock.
    pub fn state(&self) -> RestTimerState {
        RestTimerState {
            remaining_secs: self.remaining_secs(),
            ..self.state
        }
    }

    pub fn status(&self) -> TimerStatus {
        self.state.status
    }

    pub fn remaining_secs(&self) -> u32 {
        self.state.remaining_at(self.clock.now())
    }

    pub fn start(&mut self, total_secs: u32) {
        let state = RestTimerState::started(total_secs, self.clock.now());
        self.apply(state);
    }

    /// Returns false if there was no running countdown to pause.
    pub fn pause(&mut self) -> bool {
        if self.state.status != TimerStatus::Running {
            return false;
        }
        let state = self.state.paused_at(self.clock.now());
        self.apply(state);
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state.status != TimerStatus::Paused {
            return false;
        }
        let state = self.state.resumed_at(self.clock.now());
        self.apply(state);
        true
    }

    pub fn stop(&mut self) {
        self.apply(RestTimerState::default());
    }

    /// Replaces the countdown wholesale, e.g. with one restored from a snapshot.
    pub fn apply(&mut self, state: RestTimerState) {
        self.state = state;
        self.next_tick = match state.status {
            TimerStatus::Running => Some(self.clock.now() + self.tick_interval),
            TimerStatus::Idle | TimerStatus::Paused => None,
        };
    }

    /// Recomputes the countdown. Emits `Completed` once when it reaches zero
    /// (the timer is then idle) and otherwise at most one `Tick` per interval.
    /// Intervals missed while the caller was not polling are skipped.
    pub fn poll(&mut self) -> Option<TimerEvent> {
        if self.state.status != TimerStatus::Running {
            return None;
        }
        let now = self.clock.now();
        let remaining = self.state.remaining_at(now);
        if remaining == 0 {
            self.stop();
            return Some(TimerEvent::Completed);
        }
        if self.next_tick.is_some_and(|due| now < due) {
            return None;
        }
        self.state.remaining_secs = remaining;
        self.next_tick = Some(now + self.tick_interval);
        Some(TimerEvent::Tick {
            remaining_secs: remaining,
        })
    }

    /// When the caller should poll next, if the countdown is running.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        if self.state.status != TimerStatus::Running {
            return None;
        }
        match (self.next_tick, self.state.ends_at) {
            (Some(tick), Some(end)) => Some(tick.min(end)),
            (tick, end) => tick.or(end),
        }
    }
}

/// Elapsed-time counter for a duration exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stopwatch {
    pub exercise_index: usize,
    pub accumulated_ms: u64,
    pub running_since: Option<DateTime<Utc>>,
}

impl Stopwatch {
    pub const fn started(exercise_index: usize, now: DateTime<Utc>) -> Self {
        Self {
            exercise_index,
            accumulated_ms: 0,
            running_since: Some(now),
        }
    }

    pub const fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let running = self.running_since.map_or(0, |since| {
            u64::try_from((now - since).num_milliseconds()).unwrap_or(0)
        });
        self.accumulated_ms.saturating_add(running)
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        self.elapsed_ms(now) / 1000
    }

    pub fn paused_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            exercise_index: self.exercise_index,
            accumulated_ms: self.elapsed_ms(now),
            running_since: None,
        }
    }

    pub fn resumed_at(&self, now: DateTime<Utc>) -> Self {
        if self.is_running() {
            return *self;
        }
        Self {
            running_since: Some(now),
            ..*self
        }
    }
}
