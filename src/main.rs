use anyhow::Result;
use log::{debug, error, info, trace, warn};
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::time::Instant;
use swarm_common::{InputConfig, SimulationConfig, Vec2};
use swarm_engine::output::{write_positions_csv, write_snapshots, SnapshotFormat};
use swarm_engine::{FixedTimestep, Simulation, TickInput, TickRateCounter};

/// Scripted pointer: orbits the field center and toggles the press every half period.
fn scripted_input(input: &InputConfig, tick: u64, dt: f32) -> TickInput {
    if !input.orbit_pointer {
        return TickInput::idle(dt);
    }
    let t = tick as f32 * dt;
    let period = input.orbit_period_secs.max(1e-3);
    let phase = TAU * t / period;
    let pointer = Vec2::new(
        0.5 + input.orbit_radius * phase.cos(),
        0.5 + input.orbit_radius * phase.sin(),
    );
    let press_period = input.press_period_ticks as u64;
    let pointer_pressed = press_period > 0 && tick % press_period >= press_period / 2;
    TickInput { dt, pointer, pointer_pressed }
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Swarm Engine...");

    // --- Load Configuration ---
    let config = SimulationConfig::load("config.toml")?;
    let format = SnapshotFormat::parse(config.output.format.as_deref())?;

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    let mut sim = Simulation::new(config)?;
    debug!("Simulation Parameters: {:#?}", sim.params());

    let params = sim.params().clone();
    let timing = sim.config().timing.clone();
    let input_cfg = sim.config().input.clone();
    let total_ticks = timing.total_ticks as u64;
    let record_interval = timing.record_interval_ticks.max(1) as u64;
    if timing.record_interval_ticks == 0 {
        warn!("record_interval_ticks is 0. Recording every tick.");
    }
    info!("Recording snapshot every {} ticks.", record_interval);

    info!(
        "Starting simulation loop for {} ticks (dt {:.4} s, {}).",
        total_ticks,
        timing.dt,
        if timing.realtime { "realtime" } else { "as fast as possible" }
    );
    let start_time = Instant::now();
    let mut rate_counter = TickRateCounter::new();
    let mut pacer = FixedTimestep::new(timing.dt as f64, timing.max_steps_per_frame);
    let mut last_frame = Instant::now();

    if let Err(e) = sim.record_snapshot() {
        error!("Error recording initial snapshot: {}", e);
        anyhow::bail!("Failed to record initial snapshot.");
    }

    while sim.tick_count() < total_ticks {
        if timing.realtime {
            let now = Instant::now();
            pacer.advance(now.duration_since(last_frame).as_secs_f64());
            last_frame = now;
            if !pacer.next_step() {
                std::thread::yield_now();
                continue;
            }
        }

        let tick = sim.tick_count();
        let input = scripted_input(&input_cfg, tick, timing.dt);
        let step_start = Instant::now();
        if let Err(e) = sim.step(&params, &input) {
            error!("Error during simulation tick {}: {}", tick + 1, e);
            anyhow::bail!("Simulation step failed.");
        }
        let step_duration = step_start.elapsed();
        let tick = sim.tick_count();

        if let Some(rate) = rate_counter.tick(Instant::now()) {
            info!(
                "Tick [{}/{}] | Agents: {}/{} | {:.1} ticks/s | Colour range [{:.2}, {:.2}]",
                tick,
                total_ticks,
                sim.active_count(),
                sim.target(),
                rate,
                sim.auto_color_range().min,
                sim.auto_color_range().max
            );
        } else {
            trace!("Tick [{}/{}] completed in {:.2} ms", tick, total_ticks, step_duration.as_secs_f64() * 1000.0);
        }

        if tick % record_interval == 0 || tick == total_ticks {
            if let Err(e) = sim.record_snapshot() {
                error!("Error recording snapshot at tick {}: {}", tick, e);
                anyhow::bail!("Failed to record snapshot.");
            }
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.1} simulated seconds).",
        total_duration.as_secs_f64(),
        sim.elapsed()
    );

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    let base = PathBuf::from(&output.base_filename);
    if output.save_stats {
        write_snapshots(&base, format, sim.recorded_snapshots())?;
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if output.save_positions {
        let path = PathBuf::from(format!("{}_final_positions.csv", output.base_filename));
        write_positions_csv(&path, &sim.final_positions())?;
    } else {
        info!("Skipping saving final positions as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}
