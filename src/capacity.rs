use crate::particle_store::{ParticleStore, SeedPolicy};
use anyhow::Result;
use log::debug;

pub const DEFAULT_MIN_GROWTH_BATCH: usize = 100;

/// What `CapacityController::apply` did to the active range this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityChange {
    /// `[start, start + count)` was reseeded and activated.
    Grow { start: usize, count: usize },
    /// Active range cut down to `to`.
    Shrink { to: usize },
    Hold,
}

/// Moves the active agent count towards a requested target.
///
/// Growth is ramped so freshly seeded agents enter in batches of
/// `max(min_batch, target / 100)`; shrinking happens in one step.
#[derive(Debug, Clone)]
pub struct CapacityController {
    target: usize,
    capacity: usize,
    min_batch: usize,
    policy: SeedPolicy,
}

impl CapacityController {
    pub fn new(capacity: usize, initial_target: usize, min_batch: usize) -> Self {
        let mut controller = Self {
            target: 1,
            capacity: capacity.max(1),
            min_batch: min_batch.max(1),
            policy: SeedPolicy::Ramp,
        };
        controller.request_target(initial_target);
        controller
    }

    /// Seeding used for newly activated slots; `Ramp` unless overridden.
    pub fn with_seed_policy(mut self, policy: SeedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the target, clamped to `[1, capacity]`.
    pub fn request_target(&mut self, target: usize) {
        self.target = target.clamp(1, self.capacity);
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn growth_batch(&self) -> usize {
        self.min_batch.max(self.target / 100)
    }

    /// Applies one ramp step to `store`.
    pub fn apply(&self, store: &mut ParticleStore) -> Result<CapacityChange> {
        let active = store.active_count();
        let target = self.target.min(store.capacity());

        if active < target {
            let count = self.growth_batch().min(target - active);
            store.reseed_range(active, count, self.policy)?;
            store.set_active_count(active + count);
            debug!("Capacity ramp-up: {} -> {} (target {}).", active, active + count, target);
            Ok(CapacityChange::Grow { start: active, count })
        } else if active > target {
            store.set_active_count(target);
            debug!("Capacity ramp-down: {} -> {}.", active, target);
            Ok(CapacityChange::Shrink { to: target })
        } else {
            Ok(CapacityChange::Hold)
        }
    }
}
