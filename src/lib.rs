pub mod boundary;
pub mod capacity;
pub mod color_stats;
pub mod grid;
pub mod kernel;
pub mod output;
pub mod particle_store;
pub mod passes;
pub mod pointer;
pub mod simulation;
pub mod timestep;
pub mod trail;

pub use capacity::{CapacityChange, CapacityController};
pub use color_stats::ColorStatsSampler;
pub use grid::{AtomicSlot, SpatialHashGrid};
pub use output::SnapshotFormat;
pub use particle_store::{Agent, ParticleStore, SeedPolicy};
pub use passes::{PassGraph, PassId, Resource};
pub use pointer::PointerState;
pub use simulation::{Simulation, TickInput};
pub use timestep::{FixedTimestep, TickRateCounter};
pub use trail::TrailField;
