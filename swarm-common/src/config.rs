use crate::sim_params::{
    BoundaryMode, ColorSource, FalloffLaw, PointerMode, SimParams, TrailFormat,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Named field resolutions, usable instead of explicit width/height.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPreset {
    Hd720,
    Fhd1080,
    Uhd4k,
}

impl ResolutionPreset {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ResolutionPreset::Hd720 => (1280, 720),
            ResolutionPreset::Fhd1080 => (1920, 1080),
            ResolutionPreset::Uhd4k => (3840, 2160),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeedPolicyConfig {
    Uniform,
    #[default]
    Ramp,
}

// Field geometry
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct FieldConfig {
    pub width: u32,
    pub height: u32,
    /// Overrides width/height when present.
    pub resolution: Option<ResolutionPreset>,
    pub trail_format: TrailFormat,
    pub boundary: BoundaryMode,
}

impl Default for FieldConfig {
    fn default() -> Self {
        FieldConfig {
            width: 1280,
            height: 720,
            resolution: None,
            trail_format: TrailFormat::R,
            boundary: BoundaryMode::Toroidal,
        }
    }
}

// Population sizing and seeding
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PopulationConfig {
    pub capacity: u32,
    pub initial_target: u32,
    pub min_growth_batch: u32,
    pub seed: u64,
    /// How slots activated by the ramp are seeded.
    pub seed_policy: SeedPolicyConfig,
    /// Number of species tags handed out round-robin at seeding.
    pub species: u32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        PopulationConfig {
            capacity: 200_000,
            initial_target: 100_000,
            min_growth_batch: 100,
            seed: 42,
            seed_policy: SeedPolicyConfig::Ramp,
            species: 1,
        }
    }
}

// Per-agent kinematics and sensing
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub speed_min: f32,
    pub speed_max: f32,
    pub sensor_angle_deg: f32,
    pub sensor_distance: f32,
    pub turn_rate_deg: f32, // degrees per second
    pub inertia: f32,
    pub restitution: f32,
    pub acceleration: f32,
    pub intensity: f32,
    pub deposit_amount: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let p = SimParams::default();
        AgentConfig {
            speed_min: p.speed_min,
            speed_max: p.speed_max,
            sensor_angle_deg: p.sensor_angle.to_degrees(),
            sensor_distance: p.sensor_distance,
            turn_rate_deg: p.turn_rate.to_degrees(),
            inertia: p.inertia,
            restitution: p.restitution,
            acceleration: p.acceleration,
            intensity: p.intensity,
            deposit_amount: p.deposit_amount,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct BehaviorConfig {
    pub trail_following: bool,
    pub flocking: bool,
    pub collision: bool,
    pub flocking_radius: f32,
    pub collision_radius: f32,
    pub alignment_weight: f32,
    pub separation_weight: f32,
    pub cohesion_weight: f32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        let p = SimParams::default();
        BehaviorConfig {
            trail_following: p.trail_following,
            flocking: p.flocking,
            collision: p.collision,
            flocking_radius: p.flocking_radius,
            collision_radius: p.collision_radius,
            alignment_weight: p.alignment_weight,
            separation_weight: p.separation_weight,
            cohesion_weight: p.cohesion_weight,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PointerConfig {
    pub mode: PointerMode,
    pub falloff: FalloffLaw,
    pub strength: f32,
    pub sigma: f32,
    pub frequency: f32,
    pub softening: f32,
    pub max_radius: f32,
    pub ring_radius: f32,
    pub gate_on_press: bool,
}

impl Default for PointerConfig {
    fn default() -> Self {
        let p = SimParams::default();
        PointerConfig {
            mode: p.pointer_mode,
            falloff: p.falloff,
            strength: p.pointer_strength,
            sigma: p.pointer_sigma,
            frequency: p.pointer_frequency,
            softening: p.pointer_softening,
            max_radius: p.pointer_max_radius,
            ring_radius: p.ring_radius,
            gate_on_press: p.gate_on_press,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct TrailConfig {
    pub fade: f32,
    pub diffusion: f32,
    pub exposure: f32,
    pub auto_dim_threshold: f32,
    pub auto_dim_strength: f32,
    pub global_dim_rate: f32,
}

impl Default for TrailConfig {
    fn default() -> Self {
        let p = SimParams::default();
        TrailConfig {
            fade: p.fade,
            diffusion: p.diffusion,
            exposure: p.exposure,
            auto_dim_threshold: p.auto_dim_threshold,
            auto_dim_strength: p.auto_dim_strength,
            global_dim_rate: p.global_dim_rate,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ColorConfig {
    pub source: ColorSource,
    pub stats_interval_secs: f32,
    pub sample_size: u32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        ColorConfig {
            source: ColorSource::Speed,
            stats_interval_secs: 3.0,
            sample_size: 4096,
        }
    }
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub dt: f32,
    pub total_ticks: u32,
    pub record_interval_ticks: u32,
    /// Pace ticks against the wall clock instead of running flat out.
    pub realtime: bool,
    pub max_steps_per_frame: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            dt: 1.0 / 60.0,
            total_ticks: 600,
            record_interval_ticks: 30,
            realtime: false,
            max_steps_per_frame: 4,
        }
    }
}

// Scripted stand-in for the interactive pointer
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub orbit_pointer: bool,
    pub orbit_radius: f32,  // normalized units
    pub orbit_period_secs: f32,
    pub press_period_ticks: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            orbit_pointer: true,
            orbit_radius: 0.3,
            orbit_period_secs: 8.0,
            press_period_ticks: 240,
        }
    }
}

/// Snapshot format used when `[output] format` is absent.
pub const DEFAULT_SNAPSHOT_FORMAT: &str = "bincode";

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_positions: bool,
    pub save_stats: bool,
    pub save_positions_in_snapshot: bool,
    pub save_trail_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "swarm".to_string(),
            save_positions: true,
            save_stats: true,
            save_positions_in_snapshot: false,
            save_trail_in_snapshot: true,
            format: Some(DEFAULT_SNAPSHOT_FORMAT.to_string()),
        }
    }
}

/// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub field: FieldConfig,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub agents: AgentConfig,
    #[serde(default)]
    pub behaviors: BehaviorConfig,
    #[serde(default)]
    pub pointer: PointerConfig,
    #[serde(default)]
    pub trail: TrailConfig,
    #[serde(default)]
    pub color: ColorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that cannot be clamped into something meaningful.
    /// Tunables are clamped later; only structural values are checked here.
    pub fn validate(&self) -> Result<()> {
        if self.population.capacity == 0 {
            anyhow::bail!("population.capacity must be greater than 0.");
        }
        if !(self.timing.dt.is_finite() && self.timing.dt > 0.0) {
            anyhow::bail!("timing.dt must be a positive number of seconds.");
        }
        if self.color.sample_size == 0 {
            anyhow::bail!("color.sample_size must be greater than 0.");
        }
        if !(self.color.stats_interval_secs.is_finite() && self.color.stats_interval_secs >= 0.0) {
            anyhow::bail!("color.stats_interval_secs must be non-negative.");
        }
        if let Some(format) = self.output.format.as_deref() {
            if !matches!(format, "json" | "bincode" | "messagepack") {
                anyhow::bail!("output.format must be one of json, bincode, messagepack (got '{}').", format);
            }
        }
        Ok(())
    }

    /// Field dimensions after applying a resolution preset, if any.
    pub fn field_dimensions(&self) -> (u32, u32) {
        match self.field.resolution {
            Some(preset) => preset.dimensions(),
            None => (self.field.width, self.field.height),
        }
    }

    /// Converts the configuration into clamped simulation parameters.
    pub fn get_sim_params(&self) -> SimParams {
        let (field_width, field_height) = self.field_dimensions();
        let a = &self.agents;
        let b = &self.behaviors;
        let p = &self.pointer;
        let t = &self.trail;

        SimParams {
            field_width,
            field_height,
            trail_format: self.field.trail_format,
            target_population: self.population.initial_target,

            speed_min: a.speed_min,
            speed_max: a.speed_max,
            sensor_angle: a.sensor_angle_deg.to_radians(),
            sensor_distance: a.sensor_distance,
            turn_rate: a.turn_rate_deg.to_radians(),
            inertia: a.inertia,
            restitution: a.restitution,
            acceleration: a.acceleration,
            intensity: a.intensity,
            deposit_amount: a.deposit_amount,

            trail_following: b.trail_following,
            flocking: b.flocking,
            collision: b.collision,
            flocking_radius: b.flocking_radius,
            collision_radius: b.collision_radius,
            alignment_weight: b.alignment_weight,
            separation_weight: b.separation_weight,
            cohesion_weight: b.cohesion_weight,

            pointer_mode: p.mode,
            falloff: p.falloff,
            pointer_strength: p.strength,
            pointer_sigma: p.sigma,
            pointer_frequency: p.frequency,
            pointer_softening: p.softening,
            pointer_max_radius: p.max_radius,
            ring_radius: p.ring_radius,
            gate_on_press: p.gate_on_press,

            fade: t.fade,
            diffusion: t.diffusion,
            exposure: t.exposure,
            auto_dim_threshold: t.auto_dim_threshold,
            auto_dim_strength: t.auto_dim_strength,
            global_dim_rate: t.global_dim_rate,

            boundary: self.field.boundary,
            color_source: self.color.source,
        }
        .clamped()
    }
}
