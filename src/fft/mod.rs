//! Spectrum to surface transforms.
//!
//! A [`TimedSpectrum`] holds four complex planes, each packing two real fields
//! as `P + iQ` with `P` and `Q` Hermitian, so one inverse FFT per plane yields
//! both fields in the real and imaginary parts:
//!
//! | plane | real | imaginary |
//! |---|---|---|
//! | 0 | height | displacement x |
//! | 1 | displacement z | force y |
//! | 2 | force x | force z |
//! | 3 | slope x | slope z |
//!
//! Output cell `(x, y)` is the surface at local position `(x·T/N, y·T/N)`.

mod butterfly;
mod cpu;
mod evolve;
mod gpu;

use glam::{Vec2, Vec4};
use log::{info, warn};
use rustfft::num_complex::Complex32;

use crate::capabilities::Capabilities;
use crate::error::Result;
use crate::spectrum::RawSample;

pub use butterfly::ButterflyTables;
pub use cpu::{inverse_fft_2d, CpuSpectrumTransform};
pub use evolve::evolve;
pub use gpu::GpuSpectrumTransform;

/// Complex planes per timed spectrum
pub const PLANES: usize = 4;

/// Directional spectrum advanced to a point in time
#[derive(Debug, Clone)]
pub struct TimedSpectrum {
    pub resolution: usize,
    pub tile_size: f32,
    pub time: f32,
    /// `PLANES` planes of `resolution²` cells, plane-major
    pub planes: Vec<Complex32>,
}

impl TimedSpectrum {
    pub fn new(resolution: usize, tile_size: f32) -> Self {
        Self {
            resolution,
            tile_size,
            time: 0.0,
            planes: vec![Complex32::new(0.0, 0.0); PLANES * resolution * resolution],
        }
    }

    pub fn plane(&self, index: usize) -> &[Complex32] {
        let size = self.resolution * self.resolution;
        &self.planes[index * size..(index + 1) * size]
    }
}

/// Unscaled surface fields of one tile
#[derive(Debug, Clone)]
pub struct SurfaceFields {
    pub resolution: usize,
    pub tile_size: f32,
    pub time: f32,
    /// Σ n̂·A·sin θ
    pub displacement: Vec<Vec2>,
    /// (force x, force y, force z, height)
    pub force_and_height: Vec<Vec4>,
    /// ∂h/∂x, ∂h/∂z
    pub slope: Vec<Vec2>,
}

impl SurfaceFields {
    /// Unpack transformed planes (see the module table)
    pub fn from_planes(resolution: usize, tile_size: f32, time: f32, planes: &[Complex32]) -> Self {
        let size = resolution * resolution;
        let plane = |index: usize| &planes[index * size..(index + 1) * size];
        let (p0, p1, p2, p3) = (plane(0), plane(1), plane(2), plane(3));

        let mut displacement = Vec::with_capacity(size);
        let mut force_and_height = Vec::with_capacity(size);
        let mut slope = Vec::with_capacity(size);

        for i in 0..size {
            displacement.push(Vec2::new(p0[i].im, p1[i].re));
            force_and_height.push(Vec4::new(p2[i].re, p1[i].im, p2[i].im, p0[i].re));
            slope.push(Vec2::new(p3[i].re, p3[i].im));
        }

        Self {
            resolution,
            tile_size,
            time,
            displacement,
            force_and_height,
            slope,
        }
    }

    pub fn raw_at(&self, x: usize, y: usize) -> RawSample {
        let i = y * self.resolution + x;
        let fh = self.force_and_height[i];
        RawSample {
            height: fh.w,
            displacement: self.displacement[i],
            force: fh.truncate(),
        }
    }

    /// Bilinear sample at a local position (meters), wrapping at the tile edge
    pub fn sample(&self, position: Vec2) -> RawSample {
        let n = self.resolution as i64;
        let scale = self.resolution as f32 / self.tile_size;
        let fx = position.x * scale;
        let fy = position.y * scale;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;

        let ix0 = (x0 as i64).rem_euclid(n) as usize;
        let iy0 = (y0 as i64).rem_euclid(n) as usize;
        let ix1 = (ix0 + 1) % self.resolution;
        let iy1 = (iy0 + 1) % self.resolution;

        let top = self.raw_at(ix0, iy0).lerp(&self.raw_at(ix1, iy0), tx);
        let bottom = self.raw_at(ix0, iy1).lerp(&self.raw_at(ix1, iy1), tx);
        top.lerp(&bottom, ty)
    }
}

/// Inverse transform from a timed spectrum to surface fields.
pub trait SpectrumTransform: Send {
    fn name(&self) -> &'static str;

    fn transform(&mut self, spectrum: &TimedSpectrum) -> Result<SurfaceFields>;
}

/// Which transform implementation the hardware supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformBackend {
    Cpu,
    GpuCompute,
}

impl TransformBackend {
    pub fn select(capabilities: &Capabilities) -> Self {
        if capabilities.adapter_available && capabilities.compute_shaders {
            TransformBackend::GpuCompute
        } else {
            TransformBackend::Cpu
        }
    }
}

/// Create the best available transform, falling back to the CPU
pub fn create_transform(capabilities: &Capabilities) -> Box<dyn SpectrumTransform> {
    match TransformBackend::select(capabilities) {
        TransformBackend::GpuCompute => match GpuSpectrumTransform::new() {
            Ok(gpu) => {
                info!("Spectrum transform: GPU compute");
                Box::new(gpu)
            }
            Err(e) => {
                warn!("GPU transform unavailable ({}), using CPU", e);
                Box::new(CpuSpectrumTransform::new())
            }
        },
        TransformBackend::Cpu => {
            info!("Spectrum transform: CPU");
            Box::new(CpuSpectrumTransform::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selection() {
        assert_eq!(
            TransformBackend::select(&Capabilities::cpu_only()),
            TransformBackend::Cpu
        );

        let gpu = Capabilities {
            adapter_available: true,
            compute_shaders: true,
            ..Capabilities::cpu_only()
        };
        assert_eq!(TransformBackend::select(&gpu), TransformBackend::GpuCompute);
    }

    #[test]
    fn test_bilinear_sample_hits_cells_exactly() {
        let n = 16;
        let planes: Vec<Complex32> = (0..PLANES * n * n)
            .map(|i| Complex32::new(i as f32, 0.0))
            .collect();
        let fields = SurfaceFields::from_planes(n, 32.0, 0.0, &planes);

        // Cell (3, 2) sits at (6 m, 4 m)
        let sample = fields.sample(Vec2::new(6.0, 4.0));
        assert_eq!(sample.height, (2 * n + 3) as f32);

        // Wraps around the tile
        let wrapped = fields.sample(Vec2::new(6.0 + 32.0, 4.0 - 64.0));
        assert!((wrapped.height - sample.height).abs() < 1e-3);
    }
}
