use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use palette::{FromColor, Hsv, Srgb};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::time::Instant;
use swarm_common::{AgentPoint, AutoColorRange, ColorSource, Snapshot};

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot file path (.bin, written with format = "bincode")
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving one PNG per snapshot
    #[arg(short, long, default_value = "frames")]
    output: PathBuf,

    /// Width of the output frames in pixels (height follows the field aspect ratio)
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Radius in pixels of the dots drawn for agents, when positions were recorded
    #[arg(long, default_value_t = 1)]
    agent_radius: i32,

    /// Hue (degrees) used for an empty trail
    #[arg(long, default_value_t = 260.0)]
    hue_low: f32,

    /// Hue (degrees) used for the densest trail in a frame
    #[arg(long, default_value_t = 20.0)]
    hue_high: f32,
}

/// Interpolates between two hues; `t` is clamped to `[0, 1]`.
fn hue_ramp(t: f32, hue_low: f32, hue_high: f32, saturation: f32, value: f32) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let hsv = Hsv::new(hue_low + (hue_high - hue_low) * t, saturation, value);
    let rgb = Srgb::from_color(hsv);
    Rgba([
        (rgb.red * 255.0).round() as u8,
        (rgb.green * 255.0).round() as u8,
        (rgb.blue * 255.0).round() as u8,
        255,
    ])
}

/// Color of a trail texel relative to the brightest texel of the frame.
fn trail_color(value: f32, peak: f32, hue_low: f32, hue_high: f32) -> Rgba<u8> {
    if !(value > 0.0) || !(peak > 0.0) {
        return Rgba([0, 0, 0, 255]);
    }
    let t = (value / peak).sqrt();
    hue_ramp(t, hue_low, hue_high, 0.85, t)
}

/// Color of an agent for the snapshot's color source.
///
/// `trail_density` is the trail under the agent relative to the frame peak, in `[0, 1]`.
fn agent_color(point: &AgentPoint, source: ColorSource, range: &AutoColorRange, trail_density: f32) -> Rgba<u8> {
    match source {
        ColorSource::Speed => hue_ramp(range.normalize(point.speed), 200.0, 0.0, 0.6, 1.0),
        // Full hue wheel so that headings just either side of zero look alike.
        ColorSource::Heading => hue_ramp(point.heading.rem_euclid(TAU) / TAU, 0.0, 360.0, 0.7, 1.0),
        // Golden-angle steps keep neighbouring species tags far apart on the wheel.
        ColorSource::Species => {
            let hue = (point.species as f32 * 137.508).rem_euclid(360.0);
            hue_ramp(0.0, hue, hue, 0.7, 1.0)
        }
        ColorSource::Trail => hue_ramp(trail_density.sqrt(), 200.0, 0.0, 0.6, 1.0),
    }
}

/// Renders one snapshot. Field y grows upwards, image rows downwards.
fn draw_frame(snapshot: &Snapshot, args: &Args) -> RgbaImage {
    let field_w = snapshot.trail_width.max(1);
    let field_h = snapshot.trail_height.max(1);
    let width = args.width.max(1);
    let scale = width as f32 / field_w as f32;
    let height = ((field_h as f32 * scale).round() as u32).max(1);

    let mut image: RgbaImage = ImageBuffer::from_pixel(width, height, Rgba([0, 0, 0, 255]));

    let trail = snapshot.trail.as_deref().filter(|trail| trail.len() == (field_w * field_h) as usize);
    let peak = trail.map_or(0.0, |trail| trail.iter().copied().fold(0.0f32, f32::max));

    if let Some(trail) = snapshot.trail.as_deref() {
        if trail.len() == (field_w * field_h) as usize {
            for (px, py, pixel) in image.enumerate_pixels_mut() {
                let fx = ((px as f32 / scale) as u32).min(field_w - 1);
                let fy = field_h - 1 - ((py as f32 / scale) as u32).min(field_h - 1);
                *pixel = trail_color(trail[(fy * field_w + fx) as usize], peak, args.hue_low, args.hue_high);
            }
        } else {
            warn!(
                "Snapshot at tick {} has {} trail values for a {}x{} field; skipping trail.",
                snapshot.tick,
                trail.len(),
                field_w,
                field_h
            );
        }
    }

    if let Some(positions) = &snapshot.positions {
        for point in positions {
            let px = (point.x * scale).round() as i32;
            let py = (height as f32 - point.y * scale).round() as i32;
            if px < 0 || px >= width as i32 || py < 0 || py >= height as i32 {
                continue;
            }
            let density = match trail {
                Some(trail) if peak > 0.0 => {
                    let fx = (point.x.max(0.0) as u32).min(field_w - 1);
                    let fy = (point.y.max(0.0) as u32).min(field_h - 1);
                    trail[(fy * field_w + fx) as usize] / peak
                }
                _ => 0.0,
            };
            let color = agent_color(point, snapshot.color_source, &snapshot.color_range, density);
            draw_filled_circle_mut(&mut image, (px, py), args.agent_radius, color);
        }
    }

    image
}

/// Reads a `u32` count followed by that many bincode snapshots.
fn read_snapshots<R: Read>(mut reader: R) -> Result<Vec<Snapshot>> {
    // Read the snapshot count as u32 to match how it was written
    let count: u32 = bincode::deserialize_from(&mut reader).context("Failed to read snapshot count from header")?;
    let mut snapshots = Vec::with_capacity(count as usize);
    for i in 0..count {
        let snapshot: Snapshot = bincode::deserialize_from(&mut reader)
            .with_context(|| format!("Failed to read snapshot {} of {}", i + 1, count))?;
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}

fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{:05}.png", index))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    // Initialize logger
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    info!("Starting Swarm Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output directory: {}", args.output.display());

    let input_file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file: {}", args.input.display()))?;
    let snapshots = read_snapshots(BufReader::new(input_file))?;
    info!("Found {} snapshots in the file", snapshots.len());
    if snapshots.is_empty() {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    }
    if snapshots.iter().all(|s| s.trail.is_none() && s.positions.is_none()) {
        warn!("Snapshots carry neither trail nor positions; frames will be blank.");
    }

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {}", args.output.display()))?;

    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    snapshots
        .par_iter()
        .enumerate()
        .progress_with(progress_bar.clone())
        .try_for_each(|(index, snapshot)| -> Result<()> {
            let path = frame_path(&args.output, index);
            draw_frame(snapshot, &args)
                .save(&path)
                .with_context(|| format!("Failed to write frame {}", path.display()))
        })?;
    progress_bar.finish();

    info!(
        "Wrote {} frames in {:.2} s ({} .. tick {}).",
        snapshots.len(),
        start_time.elapsed().as_secs_f64(),
        frame_path(&args.output, 0).display(),
        snapshots.last().map_or(0, |s| s.tick)
    );
    Ok(())
}
