//! Timeline playback clock.
//!
//! Position while playing is derived from an anchor pair `(t0, p0)`:
//! `position(now) = p0 + (now - t0)`. It is never accumulated per tick, so
//! the clock cannot drift against the monotonic source.

use std::time::Instant;

/// A monotonic time source in seconds.
pub trait MonotonicClock {
    fn now(&self) -> f64;
}

/// Wall monotonic time measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Hand-driven time, for offline rendering and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: f64,
}

impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self { now }
    }

    pub fn set(&mut self, now: f64) {
        self.now = now;
    }

    pub fn advance(&mut self, secs: f64) -> f64 {
        self.now += secs;
        self.now
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> f64 {
        self.now
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClockState {
    Stopped { position: f64 },
    Playing { anchor_time: f64, anchor_position: f64 },
}

/// Playhead that is either parked at a position or running from an anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    state: ClockState,
}

impl PlaybackClock {
    pub fn new(position: f64) -> Self {
        Self {
            state: ClockState::Stopped { position },
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, ClockState::Playing { .. })
    }

    pub fn position(&self, now: f64) -> f64 {
        match self.state {
            ClockState::Stopped { position } => position,
            ClockState::Playing {
                anchor_time,
                anchor_position,
            } => anchor_position + (now - anchor_time),
        }
    }

    /// `(t0, p0)` while playing.
    pub fn anchor(&self) -> Option<(f64, f64)> {
        match self.state {
            ClockState::Playing {
                anchor_time,
                anchor_position,
            } => Some((anchor_time, anchor_position)),
            ClockState::Stopped { .. } => None,
        }
    }

    /// Start running from the current position. No-op if already playing.
    pub fn play(&mut self, now: f64) {
        if let ClockState::Stopped { position } = self.state {
            self.state = ClockState::Playing {
                anchor_time: now,
                anchor_position: position,
            };
        }
    }

    /// Freeze at the position reached by `now`.
    pub fn pause(&mut self, now: f64) {
        self.state = ClockState::Stopped {
            position: self.position(now),
        };
    }

    /// Jump to `position`, re-anchoring if playing.
    pub fn seek(&mut self, position: f64, now: f64) {
        self.state = match self.state {
            ClockState::Playing { .. } => ClockState::Playing {
                anchor_time: now,
                anchor_position: position,
            },
            ClockState::Stopped { .. } => ClockState::Stopped { position },
        };
    }

    /// Stop and park at `position`.
    pub fn stop_at(&mut self, position: f64) {
        self.state = ClockState::Stopped { position };
    }
}

/// Fires at most once per interval; the first call always fires.
///
/// Deadlines advance by whole intervals from the first firing, so a steady
/// caller at exactly the target rate fires on every call.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: f64,
    next_due: Option<f64>,
}

impl Cadence {
    const SLACK: f64 = 1e-9;

    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn should_tick(&mut self, now: f64) -> bool {
        match self.next_due {
            None => {
                self.next_due = Some(now + self.interval);
                true
            }
            Some(due) if now + Self::SLACK >= due => {
                // Skip missed deadlines instead of bursting to catch up.
                let missed = ((now + Self::SLACK - due) / self.interval).floor();
                self.next_due = Some(due + (missed + 1.0) * self.interval);
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.next_due = None;
    }
}
