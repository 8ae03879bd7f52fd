use crate::particle_store::{Agent, AGENT_BYTES};
use anyhow::{anyhow, Result};
use log::debug;
use std::time::{Duration, Instant};
use swarm_common::AutoColorRange;
use zerocopy::{FromBytes, IntoBytes};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_SAMPLE_SIZE: usize = 4096;

/// Periodic speed statistics used to normalize agent colors.
///
/// A sample copies the raw bytes of the first `sample_size` active agents into a
/// host staging buffer and decodes them there, the same way a device readback would.
pub struct ColorStatsSampler {
    interval: Duration,
    sample_size: usize,
    last_sample: Option<Instant>,
    range: AutoColorRange,
    staging: Vec<u8>,
    samples_taken: u64,
}

impl ColorStatsSampler {
    pub fn new(interval: Duration, sample_size: usize) -> Self {
        let sample_size = sample_size.max(1);
        Self {
            interval,
            sample_size,
            last_sample: None,
            range: AutoColorRange::default(),
            staging: Vec::with_capacity(sample_size * AGENT_BYTES),
            samples_taken: 0,
        }
    }

    pub fn range(&self) -> AutoColorRange {
        self.range
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    /// Samples when no sample was taken yet or `interval` has passed since the last one.
    pub fn maybe_sample(&mut self, now: Instant, agents: &[Agent]) -> Result<Option<AutoColorRange>> {
        let due = match self.last_sample {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if !due {
            return Ok(None);
        }
        self.last_sample = Some(now);
        self.sample(agents).map(Some)
    }

    /// Reads back a bounded sample and publishes a new range. With no agents the
    /// previous range stays in place.
    pub fn sample(&mut self, agents: &[Agent]) -> Result<AutoColorRange> {
        let count = agents.len().min(self.sample_size);
        if count == 0 {
            return Ok(self.range);
        }

        self.staging.clear();
        self.staging.extend_from_slice(agents[..count].as_bytes());

        let mut min_speed = f32::INFINITY;
        let mut max_speed = f32::NEG_INFINITY;
        for chunk in self.staging.chunks_exact(AGENT_BYTES) {
            let agent = Agent::read_from_bytes(chunk)
                .map_err(|e| anyhow!("Failed to decode agent readback: {}", e))?;
            if agent.speed.is_finite() {
                min_speed = min_speed.min(agent.speed);
                max_speed = max_speed.max(agent.speed);
            }
        }

        if min_speed.is_finite() {
            self.range = AutoColorRange::from_extremes(min_speed, max_speed);
            debug!(
                "Color range updated from {} agents: [{:.3}, {:.3}].",
                count, self.range.min, self.range.max
            );
        }
        self.samples_taken += 1;
        Ok(self.range)
    }
}

impl Default for ColorStatsSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL, DEFAULT_SAMPLE_SIZE)
    }
}
