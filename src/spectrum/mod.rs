//! Wave spectra: generation, caching, discrete wave extraction and directional spreading.
//!
//! Grids use the FFT storage order: cell `(x, y)` lives at `y * res + x` and
//! stores the wavenumber `2π/T · (signed(x), signed(y))` where
//! `signed(i) = i` below `res / 2` and `i - res` above it.

mod cache;
mod data;
mod directional;
mod kmap;
mod model;
mod wave;

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};

pub use cache::{GridSettings, SpectrumCache};
pub use data::{ScaleGrids, SpectrumData};
pub use directional::DirectionalSpectrumBuilder;
pub use kmap::{KMap, KMapCache, KMapKey, KVector};
pub use model::{PhillipsSpectrum, SpectrumId, SpectrumModel, UnifiedSpectrum, WaveSpectrum};
pub use wave::{directional_factor, DiscreteWave, RawSample};

/// Number of tile scales every spectrum is generated at
pub const NUM_SCALES: usize = 4;

/// One spectrum cell: complex amplitude plus the directional spread term
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpectrumCell {
    pub re: f32,
    pub im: f32,
    /// Spread coefficient used by `sqrt(1 + spread·cos 2φ)`
    pub spread: f32,
}

impl SpectrumCell {
    /// Sinusoid amplitude contributed by this cell (meters)
    pub fn amplitude(&self) -> f32 {
        2.0 * (self.re * self.re + self.im * self.im).sqrt()
    }
}

/// Square grid of spectrum cells at a power-of-two resolution
#[derive(Debug, Clone, PartialEq)]
pub struct WaveSpectrumGrid {
    resolution: usize,
    cells: Vec<SpectrumCell>,
}

impl WaveSpectrumGrid {
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution,
            cells: vec![SpectrumCell::default(); resolution * resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn cells(&self) -> &[SpectrumCell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [SpectrumCell] {
        &mut self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> SpectrumCell {
        self.cells[y * self.resolution + x]
    }

    pub fn set(&mut self, x: usize, y: usize, cell: SpectrumCell) {
        self.cells[y * self.resolution + x] = cell;
    }

    /// Sum of sinusoid amplitudes over all cells (meters)
    pub fn total_amplitude(&self) -> f32 {
        self.cells.iter().map(SpectrumCell::amplitude).sum()
    }

    /// Synthesize a lower resolution grid by copying the four low-frequency
    /// quadrants of this one.
    ///
    /// Frequencies are preserved exactly: cell `x >= res/2` of the result holds
    /// the same signed wavenumber as cell `quarter_start + x` of the source.
    /// The new Nyquist row and column are left empty, matching a grid
    /// generated at that resolution.
    pub fn crop(&self, resolution: usize) -> Self {
        debug_assert!(resolution <= self.resolution);
        let half = resolution / 2;
        let quarter_start = self.resolution - resolution;
        let mut out = Self::new(resolution);

        for y in 0..resolution {
            let sy = if y < half { y } else { quarter_start + y };
            for x in 0..resolution {
                if x == half || y == half {
                    continue;
                }
                let sx = if x < half { x } else { quarter_start + x };
                out.set(x, y, self.get(sx, sy));
            }
        }

        out
    }

    /// Zero every cell whose wavenumber magnitude falls outside `[k_min, k_max)`.
    pub fn retain_band(&mut self, tile_size: f32, k_min: f32, k_max: f32) {
        let resolution = self.resolution;
        let frequency_scale = 2.0 * PI / tile_size;

        for y in 0..resolution {
            let ky = frequency_scale * signed_index(y, resolution) as f32;
            for x in 0..resolution {
                let kx = frequency_scale * signed_index(x, resolution) as f32;
                let k = (kx * kx + ky * ky).sqrt();
                if k == 0.0 || k < k_min || k >= k_max {
                    self.cells[y * resolution + x] = SpectrumCell::default();
                }
            }
        }
    }
}

/// Signed frequency index of storage index `i`
#[inline]
pub fn signed_index(i: usize, resolution: usize) -> i64 {
    if i < resolution / 2 {
        i as i64
    } else {
        i as i64 - resolution as i64
    }
}

/// Storage index of the point reflection of cell `(x, y)` (wavenumber `-k`)
#[inline]
pub fn mirror_index(x: usize, y: usize, resolution: usize) -> usize {
    ((resolution - y) % resolution) * resolution + (resolution - x) % resolution
}

/// Mip slot of a power-of-two resolution (8 → 0, 16 → 1, ...)
#[inline]
pub fn mip_index(resolution: usize) -> usize {
    (resolution.trailing_zeros() as usize).saturating_sub(3)
}

pub fn is_valid_resolution(resolution: usize) -> bool {
    resolution.is_power_of_two() && (16..=4096).contains(&resolution)
}

/// Wavenumber band `[k_min, k_max)` owned by each scale.
///
/// Bands partition the spectrum so overlapping tiles don't count the same
/// energy twice. Adjacent tiles split at the geometric mean of the smaller
/// tile's fundamental and the larger tile's Nyquist wavenumber.
pub fn scale_bands(tile_sizes: &[f32; NUM_SCALES], resolution: usize) -> [(f32, f32); NUM_SCALES] {
    let mut order: [usize; NUM_SCALES] = [0, 1, 2, 3];
    order.sort_by(|&a, &b| tile_sizes[b].total_cmp(&tile_sizes[a]));

    let mut bands = [(0.0, f32::INFINITY); NUM_SCALES];
    for pair in order.windows(2) {
        let (big, small) = (pair[0], pair[1]);
        let fundamental = 2.0 * PI / tile_sizes[small];
        let nyquist = PI * resolution as f32 / tile_sizes[big];
        let split = (fundamental * nyquist).sqrt();
        bands[big].1 = split;
        bands[small].0 = split;
    }

    bands
}
