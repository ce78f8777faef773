//! Weighted combination of omnidirectional spectra with wind spreading.

use std::sync::Arc;

use glam::Vec2;
use rustfft::num_complex::Complex32;

use super::{directional_factor, KMap, SpectrumData};

/// Spectra below this weight are ignored
const MIN_WEIGHT: f32 = 0.005;

/// Builds the directional spectrum of one scale.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalSpectrumBuilder {
    pub wind_direction: Vec2,
    pub directionality: f32,
}

impl DirectionalSpectrumBuilder {
    pub fn new(wind_direction: Vec2, directionality: f32) -> Self {
        Self {
            wind_direction,
            directionality,
        }
    }

    /// Accumulate `Σ weight · spectrum · spreading` into `out`.
    ///
    /// `out` is resized to `kmap.resolution()²`. Each cell is spread with its
    /// own wavenumber direction, so cell `k` and its mirror `-k` stay
    /// independent amplitudes as the time evolution expects.
    pub fn build(
        &self,
        spectra: &[Arc<SpectrumData>],
        scale_index: usize,
        kmap: &KMap,
        out: &mut Vec<Complex32>,
    ) {
        let resolution = kmap.resolution();
        out.clear();
        out.resize(resolution * resolution, Complex32::new(0.0, 0.0));

        for data in spectra {
            let weight = data.weight();
            if weight <= MIN_WEIGHT {
                continue;
            }

            let grids = data.spectrum_values(resolution);
            let cells = grids[scale_index].cells();

            for ((value, cell), kv) in out.iter_mut().zip(cells).zip(kmap.values()) {
                let direction = if kv.k > 0.0 {
                    kv.direction
                } else {
                    self.wind_direction
                };
                let factor = directional_factor(
                    direction,
                    cell.spread,
                    self.wind_direction,
                    self.directionality,
                ) * weight;

                value.re += cell.re * factor;
                value.im += cell.im * factor;
            }
        }
    }
}
