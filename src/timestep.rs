use std::time::{Duration, Instant};

/// Fixed-step accumulator for driving the simulation from a wall clock.
///
/// Frame time is accumulated and consumed in `dt` slices. The backlog is capped at
/// `max_steps` slices so a slow frame cannot snowball into ever longer catch-ups.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    dt: f64,
    max_steps: u32,
    accumulator: f64,
}

impl FixedTimestep {
    pub fn new(dt: f64, max_steps: u32) -> Self {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 1.0 / 60.0 };
        Self { dt, max_steps: max_steps.max(1), accumulator: 0.0 }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulator
    }

    pub fn advance(&mut self, frame_seconds: f64) {
        if frame_seconds.is_finite() && frame_seconds > 0.0 {
            self.accumulator = (self.accumulator + frame_seconds).min(self.dt * self.max_steps as f64);
        }
    }

    /// Consumes one `dt` slice if available.
    pub fn next_step(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }
}

/// Counts ticks and reports the rate roughly once per second.
#[derive(Debug, Clone, Default)]
pub struct TickRateCounter {
    window_start: Option<Instant>,
    ticks: u32,
}

impl TickRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one tick at `now`; returns ticks/second when a one-second window closes.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.ticks += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= Duration::from_secs(1) {
            let rate = self.ticks as f64 / elapsed.as_secs_f64();
            self.window_start = Some(now);
            self.ticks = 0;
            Some(rate)
        } else {
            None
        }
    }
}
