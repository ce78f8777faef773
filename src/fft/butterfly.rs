//! Radix-2 butterfly index and weight tables.

use std::f32::consts::PI;

use rustfft::num_complex::Complex32;

use crate::error::{Result, WaterError};
use crate::spectrum::is_valid_resolution;

/// Per-stage read indices and twiddle weights of an inverse DIT FFT.
///
/// Stage `s` computes `out[i] = in[a] + w · in[b]` for `(a, b) = indices[i]`.
/// The bit reversal is folded into the indices of stage 0, so the input is
/// read in natural order.
#[derive(Debug, Clone)]
pub struct ButterflyTables {
    resolution: usize,
    stages: usize,
    indices: Vec<[u32; 2]>,
    weights: Vec<Complex32>,
}

impl ButterflyTables {
    pub fn new(resolution: usize) -> Result<Self> {
        if !is_valid_resolution(resolution) {
            return Err(WaterError::InvalidResolution(resolution));
        }

        let stages = resolution.trailing_zeros() as usize;
        let mut indices = Vec::with_capacity(stages * resolution);
        let mut weights = Vec::with_capacity(stages * resolution);

        for stage in 0..stages {
            let span = 1 << stage;
            let block = span << 1;

            for i in 0..resolution {
                let j = i % block;
                let base = i - j;
                let (mut a, mut b) = if j < span {
                    (base + j, base + j + span)
                } else {
                    (base + j - span, base + j)
                };

                if stage == 0 {
                    a = bit_reverse(a, stages);
                    b = bit_reverse(b, stages);
                }

                let angle = 2.0 * PI * j as f32 / block as f32;
                indices.push([a as u32, b as u32]);
                weights.push(Complex32::new(angle.cos(), angle.sin()));
            }
        }

        Ok(Self {
            resolution,
            stages,
            indices,
            weights,
        })
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// log2(resolution)
    pub fn stages(&self) -> usize {
        self.stages
    }

    pub fn stage(&self, stage: usize) -> (&[[u32; 2]], &[Complex32]) {
        let range = stage * self.resolution..(stage + 1) * self.resolution;
        (&self.indices[range.clone()], &self.weights[range])
    }

    pub fn indices(&self) -> &[[u32; 2]] {
        &self.indices
    }

    /// Weights as `[re, im]` pairs for GPU upload
    pub fn weight_pairs(&self) -> Vec<[f32; 2]> {
        self.weights.iter().map(|w| [w.re, w.im]).collect()
    }
}

fn bit_reverse(value: usize, bits: usize) -> usize {
    (value as u32).reverse_bits().checked_shr(32 - bits as u32).unwrap_or(0) as usize
}
