use anyhow::{Context, Result};
use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use swarm_common::AgentPoint;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// One simulated point agent. Identity is its index in the buffer.
///
/// `#[repr(C)]` with five 4-byte fields: the layout has no padding, so a slice of
/// agents can be copied out byte-for-byte (see `ColorStatsSampler`).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct Agent {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub speed: f32,
    pub species: u32,
}

pub const AGENT_BYTES: usize = std::mem::size_of::<Agent>();

impl Agent {
    pub fn to_point(&self) -> AgentPoint {
        AgentPoint { x: self.x, y: self.y, heading: self.heading, speed: self.speed, species: self.species }
    }
}

/// How freshly activated slots are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Uniform random position across the field with a random heading.
    Uniform,
    /// Clustered near the center, heading radially outward.
    Ramp,
}

/// Holds the two agent buffers and the active prefix.
///
/// Buffers are allocated once at construction; `current` is a 0/1 generation index
/// that flips after every tick, so nothing is ever reallocated or copied on swap.
#[derive(Debug)]
pub struct ParticleStore {
    buffers: [Vec<Agent>; 2],
    current: usize,
    active_count: usize,
    width: f32,
    height: f32,
    speed_min: f32,
    speed_max: f32,
    species: u32,
    rng: StdRng,
}

fn allocate_buffer(capacity: usize) -> Result<Vec<Agent>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .with_context(|| format!("Failed to allocate agent buffer for {} agents", capacity))?;
    buffer.resize(capacity, Agent::default());
    Ok(buffer)
}

impl ParticleStore {
    /// Allocates both buffers and seeds every slot. The active range starts empty.
    pub fn new(
        capacity: usize,
        width: f32,
        height: f32,
        speed_range: (f32, f32),
        seed: u64,
        policy: SeedPolicy,
    ) -> Result<Self> {
        if capacity == 0 {
            anyhow::bail!("Particle capacity must be greater than 0.");
        }
        if !(width > 0.0 && height > 0.0) {
            anyhow::bail!("Field dimensions must be positive (got {}x{}).", width, height);
        }

        let mut store = Self {
            buffers: [allocate_buffer(capacity)?, allocate_buffer(capacity)?],
            current: 0,
            active_count: 0,
            width,
            height,
            speed_min: speed_range.0.min(speed_range.1),
            speed_max: speed_range.0.max(speed_range.1),
            species: 1,
            rng: StdRng::seed_from_u64(seed),
        };
        store.reseed_range(0, capacity, policy)?;
        Ok(store)
    }

    /// Number of species tags handed out round-robin by index at seeding.
    pub fn with_species(mut self, species: u32) -> Self {
        self.species = species.max(1);
        self
    }

    pub fn capacity(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Only the capacity controller and resize move this.
    pub(crate) fn set_active_count(&mut self, count: usize) {
        self.active_count = count.min(self.capacity());
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn set_bounds(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_speed_range(&mut self, speed_min: f32, speed_max: f32) {
        self.speed_min = speed_min.min(speed_max);
        self.speed_max = speed_min.max(speed_max);
    }

    /// Active agents of the buffer read this tick.
    pub fn current(&self) -> &[Agent] {
        &self.buffers[self.current][..self.active_count]
    }

    /// Active agents of the buffer written this tick.
    pub fn next_mut(&mut self) -> &mut [Agent] {
        let next = 1 - self.current;
        &mut self.buffers[next][..self.active_count]
    }

    /// Read view of the current buffer together with a write view of the next one.
    pub fn split(&mut self) -> (&[Agent], &mut [Agent]) {
        let active = self.active_count;
        let (first, second) = self.buffers.split_at_mut(1);
        let (read, write) = if self.current == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        };
        (&read[..active], &mut write[..active])
    }

    /// Exchanges current/next roles after a tick.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Rewrites `[start, start + count)` in both buffers, clipped to capacity.
    pub fn reseed_range(&mut self, start: usize, count: usize, policy: SeedPolicy) -> Result<()> {
        let capacity = self.capacity();
        let start = start.min(capacity);
        let end = start.saturating_add(count).min(capacity);
        if start == end {
            return Ok(());
        }

        let speed_dist = Uniform::new_inclusive(self.speed_min, self.speed_max)?;
        let angle_dist = Uniform::new(-PI, PI)?;
        let x_dist = Uniform::new(0.0f32, self.width)?;
        let y_dist = Uniform::new(0.0f32, self.height)?;
        let spread = Normal::new(0.0f32, 0.05 * self.width.min(self.height))?;
        let center = (self.width * 0.5, self.height * 0.5);

        for idx in start..end {
            let speed = speed_dist.sample(&mut self.rng);
            let agent = match policy {
                SeedPolicy::Uniform => Agent {
                    x: x_dist.sample(&mut self.rng),
                    y: y_dist.sample(&mut self.rng),
                    heading: angle_dist.sample(&mut self.rng),
                    speed,
                    species: idx as u32 % self.species,
                },
                SeedPolicy::Ramp => {
                    let angle = angle_dist.sample(&mut self.rng);
                    let radius = spread.sample(&mut self.rng).abs();
                    Agent {
                        x: (center.0 + radius * angle.cos()).clamp(0.0, self.width),
                        y: (center.1 + radius * angle.sin()).clamp(0.0, self.height),
                        heading: angle,
                        speed,
                        species: idx as u32 % self.species,
                    }
                }
            };
            self.buffers[0][idx] = agent;
            self.buffers[1][idx] = agent;
        }
        Ok(())
    }
}
