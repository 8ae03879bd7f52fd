use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use swarm_common::{BoundaryMode, SimParams, TrailFormat};

/// One texel channel stored as `f32` bits so concurrent passes can share the buffer.
type Cell = AtomicU32;

#[inline(always)]
fn read(cell: &Cell) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

#[inline(always)]
fn write(cell: &Cell, value: f32) {
    cell.store(value.to_bits(), Ordering::Relaxed)
}

fn allocate(len: usize) -> Result<Vec<Cell>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .with_context(|| format!("Failed to allocate trail buffer of {} values", len))?;
    buffer.extend((0..len).map(|_| Cell::new(0.0f32.to_bits())));
    Ok(buffer)
}

fn mean_of(buffer: &[Cell]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum: f64 = buffer.par_iter().map(|c| read(c) as f64).sum();
    (sum / buffer.len() as f64) as f32
}

/// Folds an out-of-range texel coordinate back onto a wrapping field.
///
/// Crossing a vertical edge of a Klein field an odd number of times mirrors the row.
#[inline(always)]
fn wrap_texel(tx: i64, ty: i64, w: i64, h: i64, klein: bool) -> (i64, i64) {
    let ty = ty.rem_euclid(h);
    let ty = if klein && tx.div_euclid(w).rem_euclid(2) != 0 { h - 1 - ty } else { ty };
    (tx.rem_euclid(w), ty)
}

/// Double-buffered 2D trail field with 1, 2 or 4 interleaved channels.
///
/// Sensors only ever read `front`. Deposits land in `back`, which holds a copy of
/// `front` at the start of each update pass, so no agent sees another agent's deposit
/// from the same pass. The diffuse pass reads `back`, writes `front`, then copies the
/// result into `back` for the next pass.
pub struct TrailField {
    width: usize,
    height: usize,
    format: TrailFormat,
    front: Vec<Cell>,
    back: Vec<Cell>,
    last_mean_luminance: f32,
}

impl TrailField {
    pub fn new(width: u32, height: u32, format: TrailFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("Trail field dimensions must be non-zero (got {}x{}).", width, height);
        }
        let len = width as usize * height as usize * format.channels();
        Ok(Self {
            width: width as usize,
            height: height as usize,
            format,
            front: allocate(len)?,
            back: allocate(len)?,
            last_mean_luminance: 0.0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    pub fn format(&self) -> TrailFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// Mean luminance measured by the most recent diffuse pass.
    pub fn last_mean_luminance(&self) -> f32 {
        self.last_mean_luminance
    }

    /// Recreates both buffers at the new size and format; contents are lost.
    pub fn resize(&mut self, width: u32, height: u32, format: TrailFormat) -> Result<()> {
        // Release the old storage first so peak memory stays at one field.
        self.front = Vec::new();
        self.back = Vec::new();
        *self = TrailField::new(width, height, format)?;
        Ok(())
    }

    pub fn clear(&self) {
        for buffer in [&self.front, &self.back] {
            buffer.par_iter().for_each(|c| write(c, 0.0));
        }
    }

    #[inline(always)]
    fn texel(&self, x: f32, y: f32, boundary: BoundaryMode) -> usize {
        let (w, h) = (self.width as i64, self.height as i64);
        let tx = x.floor() as i64;
        let ty = y.floor() as i64;
        let (tx, ty) = match boundary {
            BoundaryMode::Bounce => (tx.clamp(0, w - 1), ty.clamp(0, h - 1)),
            BoundaryMode::Toroidal => wrap_texel(tx, ty, w, h, false),
            BoundaryMode::Klein => wrap_texel(tx, ty, w, h, true),
        };
        ty as usize * self.width + tx as usize
    }

    /// Nearest-texel read of `channel` from the published field, folding out-of-range
    /// positions the way `boundary` connects the edges.
    #[inline]
    pub fn sample(&self, channel: usize, x: f32, y: f32, boundary: BoundaryMode) -> f32 {
        let channels = self.channels();
        let idx = self.texel(x, y, boundary) * channels + channel.min(channels - 1);
        read(&self.front[idx])
    }

    /// Adds `amount` to the texel under `(x, y)` in the deposit buffer.
    ///
    /// This is a relaxed load followed by a relaxed store, not an atomic add: two agents
    /// hitting the same texel in one pass may drop one contribution. The deposit becomes
    /// visible to `sample` after the next `diffuse`.
    #[inline]
    pub fn deposit(&self, channel: usize, x: f32, y: f32, amount: f32) {
        let channels = self.channels();
        let idx = self.texel(x, y, BoundaryMode::Bounce) * channels + channel.min(channels - 1);
        let cell = &self.back[idx];
        write(cell, read(cell) + amount);
    }

    /// Copies one channel of the published field into a row-major plane.
    pub fn read_channel(&self, channel: usize) -> Vec<f32> {
        let channels = self.channels();
        let channel = channel.min(channels - 1);
        self.front
            .par_chunks(channels)
            .map(|texel| read(&texel[channel]))
            .collect()
    }

    /// Row-major plane of per-texel luminance (mean over channels).
    pub fn luminance_plane(&self) -> Vec<f32> {
        let channels = self.channels();
        let inv = 1.0 / channels as f32;
        self.front
            .par_chunks(channels)
            .map(|texel| texel.iter().map(read).sum::<f32>() * inv)
            .collect()
    }

    /// Mean over all texels and channels of the published field.
    pub fn mean_luminance(&self) -> f32 {
        mean_of(&self.front)
    }

    /// Decay / diffusion / tone-map / auto-dim pass, publishing this tick's deposits.
    ///
    /// Per texel and channel: blend towards the 3x3 box average by `diffusion`, multiply
    /// by `fade`, compress with `v / (1 + exposure * v)`, and when the field's mean
    /// luminance `L` exceeds the threshold scale by `1 / (1 + k * L)`.
    pub fn diffuse(&mut self, params: &SimParams) {
        let mean = mean_of(&self.back);
        self.last_mean_luminance = mean;

        let dim = if mean > params.auto_dim_threshold {
            let k = params.auto_dim_strength * params.global_dim_rate;
            1.0 / (1.0 + k * mean)
        } else {
            1.0
        };

        let (w, h) = (self.width, self.height);
        let channels = self.channels();
        let boundary = params.boundary;
        let diffusion = params.diffusion;
        let fade = params.fade;
        let exposure = params.exposure;
        let src = &self.back;

        self.front.par_chunks(w * channels).enumerate().for_each(|(y, row)| {
            for x in 0..w {
                for c in 0..channels {
                    let center = read(&src[(y * w + x) * channels + c]);
                    let mut sum = 0.0;
                    let mut taps = 0.0;
                    for dy in -1i64..=1 {
                        for dx in -1i64..=1 {
                            let nx = x as i64 + dx;
                            let ny = y as i64 + dy;
                            let (nx, ny) = match boundary {
                                BoundaryMode::Bounce if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 => continue,
                                BoundaryMode::Bounce => (nx, ny),
                                BoundaryMode::Toroidal => wrap_texel(nx, ny, w as i64, h as i64, false),
                                BoundaryMode::Klein => wrap_texel(nx, ny, w as i64, h as i64, true),
                            };
                            sum += read(&src[(ny as usize * w + nx as usize) * channels + c]);
                            taps += 1.0;
                        }
                    }
                    let blurred = sum / taps;
                    let mut value = center + (blurred - center) * diffusion;
                    value *= fade;
                    value /= 1.0 + exposure * value.max(0.0);
                    value *= dim;
                    write(&row[x * channels + c], value.max(0.0));
                }
            }
        });

        // The next pass deposits on top of what this one published.
        self.back
            .par_iter()
            .zip(self.front.par_iter())
            .for_each(|(dst, src)| write(dst, read(src)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_params() -> SimParams {
        SimParams {
            fade: 1.0,
            diffusion: 0.0,
            exposure: 0.0,
            auto_dim_threshold: 1.0e6,
            ..SimParams::default()
        }
    }

    fn publish(field: &mut TrailField) {
        field.diffuse(&quiet_params());
    }

    const CLAMP: BoundaryMode = BoundaryMode::Bounce;

    #[test]
    fn deposit_then_sample() {
        let mut field = TrailField::new(8, 4, TrailFormat::R).expect("field");
        field.deposit(0, 2.5, 1.5, 3.0);
        field.deposit(0, 2.1, 1.9, 1.0);
        publish(&mut field);
        assert_eq!(field.sample(0, 2.0, 1.0, CLAMP), 4.0);
        assert_eq!(field.sample(0, 3.0, 1.0, CLAMP), 0.0);
    }

    #[test]
    fn deposits_stay_hidden_until_published() {
        let mut field = TrailField::new(8, 4, TrailFormat::R).expect("field");
        field.deposit(0, 2.0, 2.0, 1.0);
        publish(&mut field);
        field.deposit(0, 2.0, 2.0, 5.0);
        assert_eq!(field.sample(0, 2.0, 2.0, CLAMP), 1.0);
        assert_eq!(field.mean_luminance(), 1.0 / 32.0);
        publish(&mut field);
        assert_eq!(field.sample(0, 2.0, 2.0, CLAMP), 6.0);
    }

    #[test]
    fn sampling_wraps_or_clamps() {
        let mut field = TrailField::new(8, 4, TrailFormat::R).expect("field");
        field.deposit(0, 0.0, 0.0, 1.0);
        publish(&mut field);
        assert_eq!(field.sample(0, 8.2, 4.1, BoundaryMode::Toroidal), 1.0);
        assert_eq!(field.sample(0, -3.0, -3.0, CLAMP), 1.0);
    }

    #[test]
    fn klein_sampling_mirrors_rows_across_the_vertical_seam() {
        let mut field = TrailField::new(8, 4, TrailFormat::R).expect("field");
        field.deposit(0, 7.0, 3.0, 1.0);
        publish(&mut field);
        // One texel left of column 0, row 0, is column 7 of the mirrored row 3.
        assert_eq!(field.sample(0, -0.5, 0.0, BoundaryMode::Klein), 1.0);
        assert_eq!(field.sample(0, -0.5, 0.0, BoundaryMode::Toroidal), 0.0);
        // Two laps restore the orientation.
        assert_eq!(field.sample(0, 23.5, 3.0, BoundaryMode::Klein), 1.0);
    }

    #[test]
    fn klein_diffusion_mirrors_rows_across_the_vertical_seam() {
        let run = |boundary| {
            let mut field = TrailField::new(8, 8, TrailFormat::R).expect("field");
            field.deposit(0, 0.0, 1.0, 9.0);
            field.diffuse(&SimParams { diffusion: 1.0, boundary, ..quiet_params() });
            field
        };
        let klein = run(BoundaryMode::Klein);
        assert!((klein.sample(0, 7.0, 6.0, CLAMP) - 1.0).abs() < 1e-5);
        assert_eq!(klein.sample(0, 7.0, 1.0, CLAMP), 0.0);
        let torus = run(BoundaryMode::Toroidal);
        assert!((torus.sample(0, 7.0, 1.0, CLAMP) - 1.0).abs() < 1e-5);
        assert_eq!(torus.sample(0, 7.0, 6.0, CLAMP), 0.0);
    }

    #[test]
    fn channels_are_independent() {
        let mut field = TrailField::new(4, 4, TrailFormat::Rgba).expect("field");
        field.deposit(2, 1.0, 1.0, 5.0);
        publish(&mut field);
        assert_eq!(field.sample(2, 1.0, 1.0, CLAMP), 5.0);
        assert_eq!(field.sample(0, 1.0, 1.0, CLAMP), 0.0);
        assert_eq!(field.read_channel(2).iter().sum::<f32>(), 5.0);
        assert_eq!(field.luminance_plane().iter().sum::<f32>(), 1.25);
    }

    #[test]
    fn fade_scales_values() {
        let mut field = TrailField::new(4, 4, TrailFormat::R).expect("field");
        field.deposit(0, 1.0, 1.0, 2.0);
        let params = SimParams { fade: 0.5, ..quiet_params() };
        field.diffuse(&params);
        assert!((field.sample(0, 1.0, 1.0, CLAMP) - 1.0).abs() < 1e-6);
        // The faded value is what the next pass deposits on top of.
        field.deposit(0, 1.0, 1.0, 1.0);
        field.diffuse(&params);
        assert!((field.sample(0, 1.0, 1.0, CLAMP) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn diffusion_conserves_mass_on_a_torus() {
        let mut field = TrailField::new(8, 8, TrailFormat::R).expect("field");
        field.deposit(0, 4.0, 4.0, 9.0);
        let params = SimParams { diffusion: 1.0, boundary: BoundaryMode::Toroidal, ..quiet_params() };
        field.diffuse(&params);
        let plane = field.read_channel(0);
        let total: f32 = plane.iter().sum();
        assert!((total - 9.0).abs() < 1e-4);
        assert!((field.sample(0, 3.0, 3.0, BoundaryMode::Toroidal) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tone_mapping_compresses_large_values() {
        let mut field = TrailField::new(4, 4, TrailFormat::R).expect("field");
        field.deposit(0, 0.0, 0.0, 100.0);
        let params = SimParams { exposure: 1.0, ..quiet_params() };
        field.diffuse(&params);
        let v = field.sample(0, 0.0, 0.0, CLAMP);
        assert!((v - 100.0 / 101.0).abs() < 1e-5);
    }

    #[test]
    fn auto_dim_kicks_in_above_threshold() {
        let mut field = TrailField::new(2, 2, TrailFormat::R).expect("field");
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
            field.deposit(0, x, y, 4.0);
        }
        let params = SimParams {
            auto_dim_threshold: 1.0,
            auto_dim_strength: 1.0,
            global_dim_rate: 0.5,
            ..quiet_params()
        };
        field.diffuse(&params);
        assert_eq!(field.last_mean_luminance(), 4.0);
        // 4 / (1 + 0.5 * 4) = 4 / 3
        assert!((field.sample(0, 0.0, 0.0, CLAMP) - 4.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn resize_recreates_empty_buffers() {
        let mut field = TrailField::new(4, 4, TrailFormat::R).expect("field");
        field.deposit(0, 1.0, 1.0, 1.0);
        publish(&mut field);
        field.resize(6, 3, TrailFormat::Rg).expect("resize");
        assert_eq!((field.width(), field.height(), field.channels()), (6, 3, 2));
        assert_eq!(field.luminance_plane().len(), 18);
        assert_eq!(field.mean_luminance(), 0.0);
    }

    #[test]
    fn zero_sized_field_is_rejected() {
        assert!(TrailField::new(0, 4, TrailFormat::R).is_err());
    }
}
