use crate::particle_store::Agent;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use swarm_common::SimParams;

/// Sentinel stored in a cell head (and in `next`) meaning "no agent".
pub const EMPTY_CELL: u32 = u32::MAX;

pub const MIN_CELL_SIZE: f32 = 10.0;
pub const MAX_CELL_SIZE: f32 = 80.0;
/// Cell size changes smaller than this never trigger a reallocation.
pub const CELL_SIZE_EPSILON: f32 = 0.5;

/// Atomic index slot used as a bucket head.
///
/// The grid only needs an atomic exchange plus plain loads/stores, so any backend that
/// offers those over a 32-bit index can host the buckets.
pub trait AtomicSlot: Send + Sync {
    fn new_slot(value: u32) -> Self;
    /// Atomically replaces the slot value, returning the previous one.
    fn exchange(&self, value: u32) -> u32;
    fn load(&self) -> u32;
    fn store(&self, value: u32);
}

impl AtomicSlot for AtomicU32 {
    #[inline(always)]
    fn new_slot(value: u32) -> Self {
        AtomicU32::new(value)
    }
    #[inline(always)]
    fn exchange(&self, value: u32) -> u32 {
        self.swap(value, Ordering::AcqRel)
    }
    #[inline(always)]
    fn load(&self) -> u32 {
        AtomicU32::load(self, Ordering::Acquire)
    }
    #[inline(always)]
    fn store(&self, value: u32) {
        AtomicU32::store(self, value, Ordering::Release)
    }
}

/// Desired bucket size for the current interaction radii.
pub fn desired_cell_size(params: &SimParams) -> f32 {
    let radius = params.flocking_radius.max(params.collision_radius);
    (radius * 0.8).clamp(MIN_CELL_SIZE, MAX_CELL_SIZE)
}

/// Lock-free bucket index: one singly-linked list of agent indices per cell.
///
/// `heads[cell]` holds the most recently linked agent of that cell and `next[i]` the
/// agent linked before `i`. Lists are only valid for the positions they were built from.
pub struct SpatialHashGrid<S: AtomicSlot = AtomicU32> {
    cell_size: f32,
    inv_cell_size: f32,
    dim_x: u32,
    dim_y: u32,
    width: f32,
    height: f32,
    heads: Vec<S>,
    next: Vec<u32>,
    allocations: u64,
}

impl<S: AtomicSlot> Default for SpatialHashGrid<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AtomicSlot> SpatialHashGrid<S> {
    /// An unallocated grid; the first `rebuild_if_needed` sizes it.
    pub fn new() -> Self {
        Self {
            cell_size: 0.0,
            inv_cell_size: 0.0,
            dim_x: 0,
            dim_y: 0,
            width: 0.0,
            height: 0.0,
            heads: Vec::new(),
            next: Vec::new(),
            allocations: 0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn dims(&self) -> (u32, u32) {
        (self.dim_x, self.dim_y)
    }

    pub fn num_cells(&self) -> usize {
        self.heads.len()
    }

    /// How many times the bucket arrays have been (re)allocated.
    pub fn allocation_count(&self) -> u64 {
        self.allocations
    }

    pub fn is_allocated(&self) -> bool {
        !self.heads.is_empty()
    }

    /// Reallocates the bucket arrays when the cell size drifted past `CELL_SIZE_EPSILON`
    /// or the field/capacity changed. Returns whether anything was reallocated.
    pub fn rebuild_if_needed(
        &mut self,
        params: &SimParams,
        width: f32,
        height: f32,
        capacity: usize,
    ) -> Result<bool> {
        let desired = desired_cell_size(params);
        let unchanged = self.is_allocated()
            && (desired - self.cell_size).abs() <= CELL_SIZE_EPSILON
            && self.width == width
            && self.height == height
            && self.next.len() == capacity;
        if unchanged {
            return Ok(false);
        }

        let dim_x = (width / desired).ceil().max(1.0) as u32;
        let dim_y = (height / desired).ceil().max(1.0) as u32;
        let num_cells = dim_x as usize * dim_y as usize;

        // Drop the old arrays before allocating the new ones.
        self.heads = Vec::new();
        self.next = Vec::new();

        let mut heads = Vec::new();
        heads
            .try_reserve_exact(num_cells)
            .with_context(|| format!("Failed to allocate {} grid cells", num_cells))?;
        heads.extend((0..num_cells).map(|_| S::new_slot(EMPTY_CELL)));

        let mut next = Vec::new();
        next.try_reserve_exact(capacity)
            .with_context(|| format!("Failed to allocate grid links for {} agents", capacity))?;
        next.resize(capacity, EMPTY_CELL);

        log::info!(
            "Spatial grid reallocated: cell size {:.2} -> {:.2}, {}x{} cells, {} links.",
            self.cell_size, desired, dim_x, dim_y, capacity
        );

        self.cell_size = desired;
        self.inv_cell_size = 1.0 / desired;
        self.dim_x = dim_x;
        self.dim_y = dim_y;
        self.width = width;
        self.height = height;
        self.heads = heads;
        self.next = next;
        self.allocations += 1;
        Ok(true)
    }

    /// Calculates the 1D cell index for a position, clamped into the grid.
    #[inline(always)]
    pub fn cell_index(&self, x: f32, y: f32) -> u32 {
        if self.dim_x == 0 || self.dim_y == 0 {
            return 0;
        }
        let gx = (x * self.inv_cell_size).floor().max(0.0) as u32;
        let gy = (y * self.inv_cell_size).floor().max(0.0) as u32;
        gy.min(self.dim_y - 1) * self.dim_x + gx.min(self.dim_x - 1)
    }

    /// Parallel pass clearing every cell head.
    pub fn reset(&self) {
        self.heads.par_iter().for_each(|head| head.store(EMPTY_CELL));
    }

    /// Parallel pass linking every active agent into its cell.
    ///
    /// Each agent swaps itself in as the new head and keeps the previous head as its
    /// `next`, so concurrent inserts into one cell never lose each other.
    pub fn build(&mut self, agents: &[Agent]) {
        if !self.is_allocated() {
            return;
        }
        let count = agents.len().min(self.next.len());
        let heads = &self.heads;
        let dim_x = self.dim_x;
        let dim_y = self.dim_y;
        let inv = self.inv_cell_size;

        self.next[..count]
            .par_iter_mut()
            .zip(agents[..count].par_iter())
            .enumerate()
            .for_each(|(idx, (link, agent))| {
                let gx = ((agent.x * inv).floor().max(0.0) as u32).min(dim_x - 1);
                let gy = ((agent.y * inv).floor().max(0.0) as u32).min(dim_y - 1);
                let cell = (gy * dim_x + gx) as usize;
                *link = heads[cell].exchange(idx as u32);
            });
    }

    /// Walks the 3x3 cell window around `(x, y)` and calls `f` for every linked agent.
    /// The walk stops early once `f` returns `false`.
    #[inline]
    pub fn for_each_neighbor<F>(&self, x: f32, y: f32, mut f: F)
    where
        F: FnMut(u32) -> bool,
    {
        if !self.is_allocated() {
            return;
        }
        let center_x = ((x * self.inv_cell_size).floor() as i64).clamp(0, self.dim_x as i64 - 1);
        let center_y = ((y * self.inv_cell_size).floor() as i64).clamp(0, self.dim_y as i64 - 1);
        // A well-formed list can never be longer than the link array.
        let max_steps = self.next.len();

        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                let cx = center_x + dx;
                let cy = center_y + dy;
                if cx < 0 || cy < 0 || cx >= self.dim_x as i64 || cy >= self.dim_y as i64 {
                    continue;
                }
                let cell = (cy as u32 * self.dim_x + cx as u32) as usize;
                let mut cursor = self.heads[cell].load();
                let mut steps = 0;
                while cursor != EMPTY_CELL && steps < max_steps {
                    if !f(cursor) {
                        return;
                    }
                    cursor = match self.next.get(cursor as usize) {
                        Some(&link) => link,
                        None => {
                            log::error!("Grid link {} out of bounds ({} links).", cursor, self.next.len());
                            EMPTY_CELL
                        }
                    };
                    steps += 1;
                }
            }
        }
    }
}
