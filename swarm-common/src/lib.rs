pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    AgentConfig, BehaviorConfig, ColorConfig, FieldConfig, InputConfig, OutputConfig, PointerConfig,
    PopulationConfig, ResolutionPreset, SeedPolicyConfig, SimulationConfig, TimingConfig, TrailConfig,
    DEFAULT_SNAPSHOT_FORMAT,
};
pub use sim_params::{BoundaryMode, ColorSource, FalloffLaw, PointerMode, SimParams, TrailFormat};
pub use snapshot::{AgentPoint, AutoColorRange, Snapshot};
pub use vecmath::{angle_difference, angle_to_vec, clamp, vec_to_angle, wrap_angle, Vec2};
