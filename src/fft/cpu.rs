//! Butterfly FFT on the CPU.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use rustfft::num_complex::Complex32;

use super::{ButterflyTables, SpectrumTransform, SurfaceFields, TimedSpectrum, PLANES};
use crate::error::Result;

/// Unnormalized 2D inverse FFT of one `n × n` plane, rows first.
///
/// `scratch` is resized as needed; the result is left in `data`.
pub fn inverse_fft_2d(
    data: &mut Vec<Complex32>,
    scratch: &mut Vec<Complex32>,
    tables: &ButterflyTables,
) {
    let n = tables.resolution();
    debug_assert_eq!(data.len(), n * n);
    scratch.resize(n * n, Complex32::new(0.0, 0.0));

    for stage in 0..tables.stages() {
        let (indices, weights) = tables.stage(stage);
        for y in 0..n {
            let row = y * n;
            for i in 0..n {
                let [a, b] = indices[i];
                scratch[row + i] = data[row + a as usize] + weights[i] * data[row + b as usize];
            }
        }
        mem::swap(data, scratch);
    }

    for stage in 0..tables.stages() {
        let (indices, weights) = tables.stage(stage);
        for i in 0..n {
            let [a, b] = indices[i];
            let (a, b) = (a as usize * n, b as usize * n);
            let w = weights[i];
            let out = i * n;
            for x in 0..n {
                scratch[out + x] = data[a + x] + w * data[b + x];
            }
        }
        mem::swap(data, scratch);
    }
}

/// Reference transform, also used where no GPU is available.
#[derive(Default)]
pub struct CpuSpectrumTransform {
    tables: HashMap<usize, Arc<ButterflyTables>>,
    plane: Vec<Complex32>,
    scratch: Vec<Complex32>,
    output: Vec<Complex32>,
}

impl CpuSpectrumTransform {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&mut self, resolution: usize) -> Result<Arc<ButterflyTables>> {
        if let Some(tables) = self.tables.get(&resolution) {
            return Ok(Arc::clone(tables));
        }

        let tables = Arc::new(ButterflyTables::new(resolution)?);
        self.tables.insert(resolution, Arc::clone(&tables));
        Ok(tables)
    }
}

impl SpectrumTransform for CpuSpectrumTransform {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn transform(&mut self, spectrum: &TimedSpectrum) -> Result<SurfaceFields> {
        let n = spectrum.resolution;
        let tables = self.tables(n)?;

        self.output.clear();
        self.output.reserve(PLANES * n * n);
        for index in 0..PLANES {
            self.plane.clear();
            self.plane.extend_from_slice(spectrum.plane(index));
            inverse_fft_2d(&mut self.plane, &mut self.scratch, &tables);
            self.output.extend_from_slice(&self.plane);
        }

        Ok(SurfaceFields::from_planes(
            n,
            spectrum.tile_size,
            spectrum.time,
            &self.output,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::evolve;
    use crate::spectrum::{signed_index, DiscreteWave, KMap, RawSample, SpectrumCell};
    use glam::Vec2;
    use rustfft::FftPlanner;
    use std::f32::consts::PI;

    fn test_plane(n: usize) -> Vec<Complex32> {
        (0..n * n)
            .map(|i| Complex32::new((i as f32 * 0.73).sin(), (i as f32 * 1.31).cos() * 0.5))
            .collect()
    }

    #[test]
    fn test_matches_rustfft_inverse() {
        let n = 32;
        let input = test_plane(n);

        let mut data = input.clone();
        let mut scratch = Vec::new();
        let tables = ButterflyTables::new(n).unwrap();
        inverse_fft_2d(&mut data, &mut scratch, &tables);

        // Reference: rows then columns with rustfft
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_inverse(n);
        let mut reference = input;
        for row in reference.chunks_mut(n) {
            fft.process(row);
        }
        let mut column = vec![Complex32::new(0.0, 0.0); n];
        for x in 0..n {
            for y in 0..n {
                column[y] = reference[y * n + x];
            }
            fft.process(&mut column);
            for y in 0..n {
                reference[y * n + x] = column[y];
            }
        }

        for (ours, theirs) in data.iter().zip(reference.iter()) {
            assert!((ours - theirs).norm() < 1e-3, "{} vs {}", ours, theirs);
        }
    }

    #[test]
    fn test_single_bin_is_plane_wave() {
        let n = 16;
        let mut data = vec![Complex32::new(0.0, 0.0); n * n];
        // kx = 2, ky = 1
        data[n + 2] = Complex32::new(1.0, 0.0);

        let mut scratch = Vec::new();
        let tables = ButterflyTables::new(n).unwrap();
        inverse_fft_2d(&mut data, &mut scratch, &tables);

        for y in 0..n {
            for x in 0..n {
                let angle = 2.0 * PI * (2 * x + y) as f32 / n as f32;
                let expected = Complex32::new(angle.cos(), angle.sin());
                assert!((data[y * n + x] - expected).norm() < 1e-4);
            }
        }
    }

    #[test]
    fn test_fields_match_direct_wave_summation() {
        let n = 16;
        let tile_size = 50.0;
        let gravity = 9.81;
        let time = 3.7;
        let kmap = KMap::new(n, tile_size);

        let mut directional = vec![Complex32::new(0.0, 0.0); n * n];
        let mut waves = Vec::new();
        for y in 0..n {
            for x in 0..n {
                if (x == 0 && y == 0) || x == n / 2 || y == n / 2 {
                    continue;
                }
                let value = Complex32::new(
                    ((x * 7 + y * 3) as f32).sin() * 0.05,
                    ((x * 5 + y * 11) as f32).cos() * 0.05,
                );
                directional[y * n + x] = value;

                let frequency_scale = 2.0 * PI / tile_size;
                let wavenumber = Vec2::new(
                    frequency_scale * signed_index(x, n) as f32,
                    frequency_scale * signed_index(y, n) as f32,
                );
                let cell = SpectrumCell {
                    re: value.re,
                    im: value.im,
                    spread: 0.0,
                };
                waves.push(DiscreteWave::new(0, (x, y), wavenumber, cell, gravity, Vec2::X));
            }
        }

        let mut timed = TimedSpectrum::new(n, tile_size);
        evolve(&directional, &kmap, gravity, time, &mut timed);
        let fields = CpuSpectrumTransform::new().transform(&timed).unwrap();

        for &(x, y) in &[(0, 0), (3, 5), (11, 2), (15, 15)] {
            let position = Vec2::new(x as f32, y as f32) * (tile_size / n as f32);
            let mut expected = RawSample::default();
            for wave in &waves {
                wave.accumulate(position, time, 1.0, &mut expected);
            }

            let actual = fields.raw_at(x, y);
            assert!((actual.height - expected.height).abs() < 1e-3);
            assert!((actual.displacement - expected.displacement).length() < 1e-3);
            assert!((actual.force - expected.force).length() < 1e-3);
        }
    }

    #[test]
    fn test_tables_cached_per_resolution() {
        let mut transform = CpuSpectrumTransform::new();
        transform.transform(&TimedSpectrum::new(16, 10.0)).unwrap();
        transform.transform(&TimedSpectrum::new(16, 20.0)).unwrap();
        transform.transform(&TimedSpectrum::new(32, 20.0)).unwrap();
        assert_eq!(transform.tables.len(), 2);
    }

    #[test]
    fn test_rejects_invalid_resolution() {
        let mut transform = CpuSpectrumTransform::new();
        assert!(transform.transform(&TimedSpectrum::new(8, 10.0)).is_err());
    }
}
