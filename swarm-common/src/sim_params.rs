use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Number of scalar channels stored per trail texel.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrailFormat {
    #[default]
    R,
    Rg,
    Rgba,
}

impl TrailFormat {
    pub fn channels(self) -> usize {
        match self {
            TrailFormat::R => 1,
            TrailFormat::Rg => 2,
            TrailFormat::Rgba => 4,
        }
    }
}

/// Field topology applied after integration.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    #[default]
    Toroidal,
    Bounce,
    Klein,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PointerMode {
    #[default]
    Attract,
    Repel,
    Ring,
    Vortex,
}

/// Distance-to-magnitude function used for pointer interaction.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FalloffLaw {
    InverseLinear,
    #[default]
    InverseSquare,
    InverseCube,
    Gaussian,
    Oscillatory,
}

/// Which agent quantity the render layer maps to color.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorSource {
    #[default]
    Speed,
    Heading,
    Species,
    Trail,
}

/// Immutable per-tick snapshot of every simulation tunable.
///
/// Built from the configuration (or by the UI layer) and passed by reference into
/// each tick. The core never mutates it; `clamped` is the only normalization step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    // Field
    pub field_width: u32,
    pub field_height: u32,
    pub trail_format: TrailFormat,
    pub target_population: u32,

    // Agent kinematics
    pub speed_min: f32,
    pub speed_max: f32,
    pub sensor_angle: f32, // radians
    pub sensor_distance: f32,
    pub turn_rate: f32, // radians per second
    pub inertia: f32,
    pub restitution: f32,
    pub acceleration: f32,
    pub intensity: f32,
    pub deposit_amount: f32,

    // Behaviors
    pub trail_following: bool,
    pub flocking: bool,
    pub collision: bool,
    pub flocking_radius: f32,
    pub collision_radius: f32,
    pub alignment_weight: f32,
    pub separation_weight: f32,
    pub cohesion_weight: f32,

    // Pointer
    pub pointer_mode: PointerMode,
    pub falloff: FalloffLaw,
    pub pointer_strength: f32,
    pub pointer_sigma: f32,
    pub pointer_frequency: f32,
    pub pointer_softening: f32,
    pub pointer_max_radius: f32, // 0 = unlimited
    pub ring_radius: f32,
    pub gate_on_press: bool,

    // Trail post-processing
    pub fade: f32,
    pub diffusion: f32,
    pub exposure: f32,
    pub auto_dim_threshold: f32,
    pub auto_dim_strength: f32,
    pub global_dim_rate: f32,

    pub boundary: BoundaryMode,
    pub color_source: ColorSource,
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            field_width: 1280,
            field_height: 720,
            trail_format: TrailFormat::R,
            target_population: 100_000,

            speed_min: 20.0,
            speed_max: 60.0,
            sensor_angle: PI / 4.0,
            sensor_distance: 9.0,
            turn_rate: 6.0,
            inertia: 0.2,
            restitution: 0.5,
            acceleration: 40.0,
            intensity: 1.0,
            deposit_amount: 0.5,

            trail_following: true,
            flocking: false,
            collision: false,
            flocking_radius: 20.0,
            collision_radius: 6.0,
            alignment_weight: 1.0,
            separation_weight: 1.5,
            cohesion_weight: 0.5,

            pointer_mode: PointerMode::Attract,
            falloff: FalloffLaw::InverseSquare,
            pointer_strength: 0.0,
            pointer_sigma: 80.0,
            pointer_frequency: 0.05,
            pointer_softening: 4.0,
            pointer_max_radius: 0.0,
            ring_radius: 150.0,
            gate_on_press: true,

            fade: 0.96,
            diffusion: 0.25,
            exposure: 0.05,
            auto_dim_threshold: 2.0,
            auto_dim_strength: 1.0,
            global_dim_rate: 0.1,

            boundary: BoundaryMode::Toroidal,
            color_source: ColorSource::Speed,
        }
    }
}

/// Clamps into `[min, max]`, substituting `fallback` for NaN and infinities.
#[inline]
fn safe(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}

pub const MIN_FIELD_SIDE: u32 = 16;
pub const MAX_FIELD_SIDE: u32 = 8192;
pub const MAX_INERTIA: f32 = 0.99;

impl SimParams {
    /// Returns a copy with every field mapped into its documented safe range.
    /// Never fails: out-of-range or non-finite input is silently replaced.
    pub fn clamped(&self) -> SimParams {
        let d = SimParams::default();
        let speed_min = safe(self.speed_min, 0.0, 10_000.0, d.speed_min);
        let speed_max = safe(self.speed_max, 0.0, 10_000.0, d.speed_max).max(speed_min);

        SimParams {
            field_width: self.field_width.clamp(MIN_FIELD_SIDE, MAX_FIELD_SIDE),
            field_height: self.field_height.clamp(MIN_FIELD_SIDE, MAX_FIELD_SIDE),
            trail_format: self.trail_format,
            target_population: self.target_population.max(1),

            speed_min,
            speed_max,
            sensor_angle: safe(self.sensor_angle, 0.0, PI, d.sensor_angle),
            sensor_distance: safe(self.sensor_distance, 0.0, 200.0, d.sensor_distance),
            turn_rate: safe(self.turn_rate, 0.0, 50.0, d.turn_rate),
            inertia: safe(self.inertia, 0.0, MAX_INERTIA, d.inertia),
            restitution: safe(self.restitution, 0.0, 1.0, d.restitution),
            acceleration: safe(self.acceleration, 0.0, 1_000.0, d.acceleration),
            intensity: safe(self.intensity, 0.0, 10.0, d.intensity),
            deposit_amount: safe(self.deposit_amount, 0.0, 100.0, d.deposit_amount),

            trail_following: self.trail_following,
            flocking: self.flocking,
            collision: self.collision,
            flocking_radius: safe(self.flocking_radius, 0.0, 200.0, d.flocking_radius),
            collision_radius: safe(self.collision_radius, 0.0, 200.0, d.collision_radius),
            alignment_weight: safe(self.alignment_weight, 0.0, 10.0, d.alignment_weight),
            separation_weight: safe(self.separation_weight, 0.0, 10.0, d.separation_weight),
            cohesion_weight: safe(self.cohesion_weight, 0.0, 10.0, d.cohesion_weight),

            pointer_mode: self.pointer_mode,
            falloff: self.falloff,
            pointer_strength: safe(self.pointer_strength, 0.0, 10_000.0, d.pointer_strength),
            pointer_sigma: safe(self.pointer_sigma, 1e-3, 10_000.0, d.pointer_sigma),
            pointer_frequency: safe(self.pointer_frequency, 0.0, 10.0, d.pointer_frequency),
            pointer_softening: safe(self.pointer_softening, 1e-3, 1_000.0, d.pointer_softening),
            pointer_max_radius: safe(self.pointer_max_radius, 0.0, 100_000.0, d.pointer_max_radius),
            ring_radius: safe(self.ring_radius, 0.0, 10_000.0, d.ring_radius),
            gate_on_press: self.gate_on_press,

            fade: safe(self.fade, 0.0, 1.0, d.fade),
            diffusion: safe(self.diffusion, 0.0, 1.0, d.diffusion),
            exposure: safe(self.exposure, 0.0, 10.0, d.exposure),
            auto_dim_threshold: safe(self.auto_dim_threshold, 0.0, 1.0e6, d.auto_dim_threshold),
            auto_dim_strength: safe(self.auto_dim_strength, 0.0, 10.0, d.auto_dim_strength),
            global_dim_rate: safe(self.global_dim_rate, 0.0, 10.0, d.global_dim_rate),

            boundary: self.boundary,
            color_source: self.color_source,
        }
    }

    /// True when any enabled behavior walks the spatial grid.
    pub fn needs_neighbors(&self) -> bool {
        self.flocking || self.collision
    }
}
