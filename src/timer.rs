//! One-second hold timer with cancellation tokens
//!
//! The timer is deadline based: callers pass the frame timestamp and receive a
//! [`TickToken`] for every whole second that has passed since the last tick.
//! Each token carries the generation it was issued under. Cancelling or
//! restarting the timer bumps the generation, so a token issued before the
//! cancellation is rejected by [`HoldTimer::tick`].

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Upper bound on ticks issued by a single poll of an uncapped timer
const MAX_TICKS_PER_POLL: i64 = 3_600;

/// Proof that a tick was scheduled by a particular run of the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickToken {
    generation: u64,
}

#[derive(Debug, Clone)]
struct Running {
    generation: u64,
    next_tick_at: DateTime<Utc>,
}

/// Gate requiring a condition to stay true for a number of whole seconds
#[derive(Debug, Clone)]
pub struct HoldTimer {
    required_seconds: Option<u32>,
    elapsed_seconds: u32,
    generation: u64,
    running: Option<Running>,
}

impl HoldTimer {
    /// Create a timer that completes after `required_seconds`
    pub fn new(required_seconds: u32) -> Self {
        Self {
            required_seconds: Some(required_seconds),
            elapsed_seconds: 0,
            generation: 0,
            running: None,
        }
    }

    /// Create a timer that counts until cancelled
    pub fn unbounded() -> Self {
        Self {
            required_seconds: None,
            elapsed_seconds: 0,
            generation: 0,
            running: None,
        }
    }

    pub fn with_limit(required_seconds: Option<u32>) -> Self {
        match required_seconds {
            Some(seconds) => Self::new(seconds),
            None => Self::unbounded(),
        }
    }

    /// Start counting from zero, invalidating any outstanding tokens
    pub fn start(&mut self, now: DateTime<Utc>) -> TickToken {
        self.elapsed_seconds = 0;
        self.schedule(now)
    }

    /// Keep the current count and start ticking again if stopped
    pub fn resume(&mut self, now: DateTime<Utc>) -> TickToken {
        if let Some(running) = &self.running {
            return TickToken {
                generation: running.generation,
            };
        }
        self.schedule(now)
    }

    fn schedule(&mut self, now: DateTime<Utc>) -> TickToken {
        self.generation += 1;
        self.running = Some(Running {
            generation: self.generation,
            next_tick_at: now + Duration::seconds(1),
        });
        TickToken {
            generation: self.generation,
        }
    }

    /// Stop ticking. The elapsed count is kept.
    pub fn cancel(&mut self) {
        if self.running.take().is_some() {
            self.generation += 1;
        }
    }

    /// Stop ticking and zero the elapsed count
    pub fn reset(&mut self) {
        self.cancel();
        self.elapsed_seconds = 0;
    }

    /// Collect the ticks that have come due by `now`.
    ///
    /// Whole seconds are measured from the start of the run, so irregular
    /// frame intervals neither lose nor invent seconds. A `now` earlier than
    /// the next deadline yields nothing. An uncapped timer issues at most
    /// `MAX_TICKS_PER_POLL` per call and leaves the rest due.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<TickToken> {
        let cap = match self.required_seconds {
            Some(required) => i64::from(required.saturating_sub(self.elapsed_seconds)),
            None => MAX_TICKS_PER_POLL,
        };

        let Some(running) = self.running.as_mut() else {
            return Vec::new();
        };
        if now < running.next_tick_at {
            return Vec::new();
        }

        let overdue = (now - running.next_tick_at).num_milliseconds() / 1_000 + 1;
        let issued = overdue.min(cap).max(0);
        if issued < overdue && self.required_seconds.is_none() {
            debug!(overdue, issued, "tick backlog deferred to the next poll");
        }
        // Seconds not issued stay due
        running.next_tick_at = running.next_tick_at + Duration::seconds(issued);

        let token = TickToken {
            generation: running.generation,
        };
        vec![token; issued as usize]
    }

    /// Count one second if `token` belongs to the current run.
    ///
    /// Returns `false` (and changes nothing) for stale tokens or once the
    /// timer has been cancelled.
    pub fn tick(&mut self, token: TickToken) -> bool {
        match &self.running {
            Some(running) if running.generation == token.generation => {
                self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.required_seconds
            .is_some_and(|required| self.elapsed_seconds >= required)
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    pub fn required_seconds(&self) -> Option<u32> {
        self.required_seconds
    }
}
