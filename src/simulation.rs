use crate::capacity::{CapacityChange, CapacityController};
use crate::color_stats::{ColorStatsSampler, DEFAULT_SAMPLE_INTERVAL};
use crate::grid::SpatialHashGrid;
use crate::kernel::{update_agents, KernelContext};
use crate::particle_store::{Agent, ParticleStore, SeedPolicy};
use crate::passes::{PassGraph, PassId};
use crate::pointer::PointerState;
use crate::trail::TrailField;
use anyhow::Result;
use log::{debug, info};
use rayon::prelude::*;
use std::time::{Duration, Instant};
use swarm_common::{AutoColorRange, SeedPolicyConfig, SimParams, SimulationConfig, Snapshot, TrailFormat, Vec2};

/// Host input sampled once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    /// Seconds to advance; non-positive or non-finite values fall back to the configured dt.
    pub dt: f32,
    /// Pointer position normalized to `[0, 1]` on both axes.
    pub pointer: Vec2,
    pub pointer_pressed: bool,
}

impl TickInput {
    pub fn idle(dt: f32) -> Self {
        TickInput { dt, pointer: Vec2::new(0.5, 0.5), pointer_pressed: false }
    }
}

impl From<SeedPolicyConfig> for SeedPolicy {
    fn from(policy: SeedPolicyConfig) -> Self {
        match policy {
            SeedPolicyConfig::Uniform => SeedPolicy::Uniform,
            SeedPolicyConfig::Ramp => SeedPolicy::Ramp,
        }
    }
}

/// Owns every buffer of the swarm and advances it one tick at a time.
pub struct Simulation {
    config: SimulationConfig,
    /// Parameters applied on the most recent tick (or from config before the first).
    params: SimParams,
    store: ParticleStore,
    grid: SpatialHashGrid,
    trail: TrailField,
    capacity: CapacityController,
    color_stats: ColorStatsSampler,
    /// Last `target_population` seen in a parameter snapshot; a change re-targets the ramp.
    params_target: u32,
    seed: u64,
    tick: u64,
    elapsed: f32,
    recorded_snapshots: Vec<Snapshot>,
}

impl Simulation {
    /// Allocates all buffers. The active range starts empty and ramps towards the
    /// configured initial target over the first ticks.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let population = &config.population;
        let policy = SeedPolicy::from(population.seed_policy);

        let store = ParticleStore::new(
            population.capacity as usize,
            params.field_width as f32,
            params.field_height as f32,
            (params.speed_min, params.speed_max),
            population.seed,
            policy,
        )?
        .with_species(population.species);

        let trail = TrailField::new(params.field_width, params.field_height, params.trail_format)?;
        let capacity = CapacityController::new(
            store.capacity(),
            params.target_population as usize,
            population.min_growth_batch as usize,
        )
        .with_seed_policy(policy);

        let color_stats = ColorStatsSampler::new(
            Duration::try_from_secs_f32(config.color.stats_interval_secs).unwrap_or(DEFAULT_SAMPLE_INTERVAL),
            config.color.sample_size as usize,
        );

        info!(
            "Simulation initialized: {}x{} field, capacity {}, target {}, {:?} trail.",
            params.field_width,
            params.field_height,
            store.capacity(),
            capacity.target(),
            params.trail_format
        );

        Ok(Self {
            params_target: params.target_population,
            seed: population.seed,
            config,
            params,
            store,
            grid: SpatialHashGrid::new(),
            trail,
            capacity,
            color_stats,
            tick: 0,
            elapsed: 0.0,
            recorded_snapshots: Vec::new(),
        })
    }

    /// Advances the swarm by one tick using the given parameter snapshot.
    pub fn step(&mut self, params: &SimParams, input: &TickInput) -> Result<()> {
        let params = params.clamped();

        if params.field_width != self.trail.width()
            || params.field_height != self.trail.height()
            || params.trail_format != self.trail.format()
        {
            self.resize(params.field_width, params.field_height, params.trail_format)?;
        }
        if params.target_population != self.params_target {
            self.params_target = params.target_population;
            self.capacity.request_target(params.target_population as usize);
        }
        self.store.set_speed_range(params.speed_min, params.speed_max);

        if let CapacityChange::Grow { .. } | CapacityChange::Shrink { .. } = self.capacity.apply(&mut self.store)? {
            debug!("Tick {}: {} active agents.", self.tick, self.store.active_count());
        }

        let width = params.field_width as f32;
        let height = params.field_height as f32;
        let needs_grid = params.needs_neighbors();
        if needs_grid {
            self.grid.rebuild_if_needed(&params, width, height, self.store.capacity())?;
        }

        let dt = if input.dt.is_finite() && input.dt > 0.0 { input.dt } else { self.config.timing.dt };
        let pointer = PointerState {
            position: Vec2::new(input.pointer.x.clamp(0.0, 1.0) * width, input.pointer.y.clamp(0.0, 1.0) * height),
            pressed: input.pointer_pressed,
        };

        let graph = PassGraph::for_tick(needs_grid);
        let store = &mut self.store;
        let grid = &mut self.grid;
        let trail = &mut self.trail;
        let (tick, seed) = (self.tick, self.seed);
        graph.execute(|pass| {
            match pass {
                PassId::GridReset => grid.reset(),
                PassId::GridBuild => grid.build(store.current()),
                PassId::AgentUpdate => {
                    let ctx = KernelContext {
                        params: &params,
                        grid: if needs_grid { Some(&*grid) } else { None },
                        trail: &*trail,
                        pointer,
                        dt,
                        tick,
                        seed,
                        width,
                        height,
                    };
                    let (current, next) = store.split();
                    update_agents(current, next, &ctx);
                }
                PassId::TrailDiffuse => trail.diffuse(&params),
            }
            Ok(())
        })?;

        self.store.swap();
        self.color_stats.maybe_sample(Instant::now(), self.store.current())?;

        self.params = params;
        self.tick += 1;
        self.elapsed += dt;
        Ok(())
    }

    /// Recreates the field-sized resources. Every slot is reseeded around the new
    /// center and the population ramps up again towards the unchanged target.
    pub fn resize(&mut self, width: u32, height: u32, format: TrailFormat) -> Result<()> {
        let mut params = self.params.clone();
        params.field_width = width;
        params.field_height = height;
        params.trail_format = format;
        let params = params.clamped();

        // Every pass has completed by the time `step` returns, so nothing is in flight here.
        self.trail.resize(params.field_width, params.field_height, params.trail_format)?;
        self.store.set_bounds(params.field_width as f32, params.field_height as f32);
        self.store.reseed_range(0, self.store.capacity(), SeedPolicy::Ramp)?;
        self.store.set_active_count(0);
        if params.needs_neighbors() {
            self.grid.rebuild_if_needed(
                &params,
                params.field_width as f32,
                params.field_height as f32,
                self.store.capacity(),
            )?;
        }

        info!(
            "Field resized to {}x{} ({:?}); population restarts towards {}.",
            params.field_width,
            params.field_height,
            params.trail_format,
            self.capacity.target()
        );
        self.params = params;
        Ok(())
    }

    /// Requests a new population size; clamped to `[1, capacity]`.
    pub fn request_target(&mut self, target: usize) {
        self.capacity.request_target(target);
    }

    pub fn target(&self) -> usize {
        self.capacity.target()
    }

    pub fn trail_field(&self) -> &TrailField {
        &self.trail
    }

    /// Active agents after the most recent tick.
    pub fn agents(&self) -> &[Agent] {
        self.store.current()
    }

    pub fn auto_color_range(&self) -> AutoColorRange {
        self.color_stats.range()
    }

    pub fn active_count(&self) -> usize {
        self.store.active_count()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds advanced so far.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn grid(&self) -> &SpatialHashGrid {
        &self.grid
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Captures the current state into the snapshot list.
    pub fn record_snapshot(&mut self) -> Result<()> {
        let agents = self.store.current();
        let mean_speed = if agents.is_empty() {
            0.0
        } else {
            (agents.par_iter().map(|a| a.speed as f64).sum::<f64>() / agents.len() as f64) as f32
        };

        let output = &self.config.output;
        let trail = output.save_trail_in_snapshot.then(|| self.trail.luminance_plane());
        let positions = output
            .save_positions_in_snapshot
            .then(|| agents.iter().map(Agent::to_point).collect());

        let snapshot = Snapshot {
            tick: self.tick,
            time: self.elapsed,
            active_count: agents.len() as u32,
            target_count: self.capacity.target() as u32,
            color_range: self.color_stats.range(),
            color_source: self.params.color_source,
            mean_speed,
            mean_luminance: self.trail.last_mean_luminance(),
            trail_width: self.trail.width(),
            trail_height: self.trail.height(),
            trail_channels: self.trail.channels() as u32,
            trail,
            positions,
        };
        debug!(
            "Snapshot at tick {}: {} agents, mean speed {:.3}.",
            snapshot.tick, snapshot.active_count, snapshot.mean_speed
        );
        self.recorded_snapshots.push(snapshot);
        Ok(())
    }

    pub fn recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    /// Copy of the active agents, for the final CSV dump.
    pub fn final_positions(&self) -> Vec<Agent> {
        self.store.current().to_vec()
    }
}
