use crate::sim_params::ColorSource;
use serde::{Deserialize, Serialize};

/// Speed bounds used to normalize agent colors.
/// Always satisfies `max >= min + 1` once published by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoColorRange {
    pub min: f32,
    pub max: f32,
}

impl Default for AutoColorRange {
    fn default() -> Self {
        AutoColorRange { min: 0.0, max: 1.0 }
    }
}

impl AutoColorRange {
    /// Builds a range from observed extremes, widening it to at least one unit.
    pub fn from_extremes(min: f32, max: f32) -> Self {
        let min = if min.is_finite() { min } else { 0.0 };
        let max = if max.is_finite() { max.max(min) } else { min };
        AutoColorRange { min, max: max.max(min + 1.0) }
    }

    /// Maps `value` into `[0, 1]` relative to the range.
    pub fn normalize(&self, value: f32) -> f32 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

/// Per-agent state recorded in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentPoint {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub speed: f32,
    pub species: u32,
}

/// A snapshot of the simulation state and metrics at a specific tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    /// Simulated seconds elapsed.
    pub time: f32,
    pub active_count: u32,
    pub target_count: u32,
    pub color_range: AutoColorRange,
    /// Agent quantity the renderer maps to color.
    pub color_source: ColorSource,
    pub mean_speed: f32,
    /// Mean trail luminance seen by the last auto-dim stage.
    pub mean_luminance: f32,
    pub trail_width: u32,
    pub trail_height: u32,
    pub trail_channels: u32,
    // The optional fields are always written: bincode cannot skip fields.
    /// Row-major luminance plane (mean over channels), `trail_width * trail_height` values.
    #[serde(default)]
    pub trail: Option<Vec<f32>>,
    /// State of every active agent.
    #[serde(default)]
    pub positions: Option<Vec<AgentPoint>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extremes_are_widened_to_one_unit() {
        let r = AutoColorRange::from_extremes(30.0, 30.2);
        assert!(r.max >= r.min + 1.0);
        let r = AutoColorRange::from_extremes(5.0, 40.0);
        assert_eq!((r.min, r.max), (5.0, 40.0));
    }

    #[test]
    fn non_finite_extremes_collapse_safely() {
        let r = AutoColorRange::from_extremes(f32::NAN, f32::INFINITY);
        assert!(r.min.is_finite() && r.max.is_finite());
        assert!(r.max >= r.min + 1.0);
    }

    #[test]
    fn normalize_clamps() {
        let r = AutoColorRange { min: 10.0, max: 20.0 };
        assert_eq!(r.normalize(0.0), 0.0);
        assert_eq!(r.normalize(15.0), 0.5);
        assert_eq!(r.normalize(99.0), 1.0);
    }
}
