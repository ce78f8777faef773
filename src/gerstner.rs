//! Analytic Gerstner waves for hardware without FFT maps.
//!
//! The strongest discrete waves across all spectra are converted to
//! closed-form parameters and packed in blocks of four for the rendering
//! collaborator's uniform buffer.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::spectrum::{DiscreteWave, SpectrumData};

/// Uniform blocks available to the shader
pub const MAX_GERSTNER_BLOCKS: usize = 5;

/// Waves that fit the uniform buffer
pub const MAX_GERSTNER_WAVES: usize = MAX_GERSTNER_BLOCKS * 4;

/// Spectra lighter than this do not contribute waves
const MIN_SELECTION_WEIGHT: f32 = 0.001;

/// A discrete wave together with the weight of the spectrum it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedWave {
    pub wave: DiscreteWave,
    pub weight: f32,
    /// Tile size of the wave's scale (meters)
    pub tile_size: f32,
    /// Resolution of the grid the wave was extracted from
    pub resolution: usize,
}

impl WeightedWave {
    pub fn importance(&self) -> f32 {
        self.wave.amplitude * self.weight
    }
}

/// Closed-form wave: `A·cos(f·(n̂·p) - s·t + offset)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GerstnerWave {
    pub direction: Vec2,
    /// Weighted amplitude (meters)
    pub amplitude: f32,
    /// Wavenumber magnitude (rad/m)
    pub frequency: f32,
    /// Angular frequency (rad/s)
    pub speed: f32,
    /// Phase with the half-texel map offset folded in
    pub offset: f32,
}

impl GerstnerWave {
    /// Zero-amplitude filler used to pad incomplete blocks
    pub const EMPTY: GerstnerWave = GerstnerWave {
        direction: Vec2::Y,
        amplitude: 0.0,
        frequency: 1.0,
        speed: 0.0,
        offset: 0.0,
    };

    /// Convert a weighted wave so that `gerstner(p + o) == weight · wave(p)`
    /// with `o = 0.5·T/N` the half-texel offset of the packed maps.
    pub fn from_wave(weighted: &WeightedWave) -> Self {
        let wave = &weighted.wave;
        let half_texel = 0.5 * weighted.tile_size / weighted.resolution as f32;
        let map_offset = Vec2::splat(half_texel);

        Self {
            direction: wave.direction,
            amplitude: wave.amplitude * weighted.weight,
            frequency: wave.k,
            speed: wave.angular_frequency,
            offset: wave.phase - wave.k * wave.direction.dot(map_offset),
        }
    }

    #[inline]
    fn phase_at(&self, position: Vec2, time: f32) -> f32 {
        self.frequency * self.direction.dot(position) - self.speed * time + self.offset
    }

    pub fn height_at(&self, position: Vec2, time: f32) -> f32 {
        self.amplitude * self.phase_at(position, time).cos()
    }

    /// `(dx, h, dz)` with the horizontal part scaled by `horizontal_scale`
    pub fn displacement_at(&self, position: Vec2, time: f32, horizontal_scale: f32) -> Vec3 {
        let (s, c) = self.phase_at(position, time).sin_cos();
        let horizontal = -self.direction * (self.amplitude * s * horizontal_scale);
        Vec3::new(horizontal.x, self.amplitude * c, horizontal.y)
    }
}

/// Four waves in shader layout
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Gerstner4 {
    pub amplitude: [f32; 4],
    pub frequency: [f32; 4],
    /// `(x0, z0, x1, z1)`
    pub direction_ab: [f32; 4],
    /// `(x2, z2, x3, z3)`
    pub direction_cd: [f32; 4],
    pub speed: [f32; 4],
    pub offset: [f32; 4],
}

impl Gerstner4 {
    pub fn pack(waves: &[GerstnerWave]) -> Self {
        let wave = |i: usize| waves.get(i).copied().unwrap_or(GerstnerWave::EMPTY);
        let [a, b, c, d] = [wave(0), wave(1), wave(2), wave(3)];

        Self {
            amplitude: [a.amplitude, b.amplitude, c.amplitude, d.amplitude],
            frequency: [a.frequency, b.frequency, c.frequency, d.frequency],
            direction_ab: [a.direction.x, a.direction.y, b.direction.x, b.direction.y],
            direction_cd: [c.direction.x, c.direction.y, d.direction.x, d.direction.y],
            speed: [a.speed, b.speed, c.speed, d.speed],
            offset: [a.offset, b.offset, c.offset, d.offset],
        }
    }
}

/// Uniform buffer contents for the Gerstner shader variant
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GerstnerUniforms {
    pub blocks: [Gerstner4; MAX_GERSTNER_BLOCKS],
    /// Blocks holding at least one real wave
    pub block_count: u32,
    pub horizontal_displacement_scale: f32,
    pub _padding: [f32; 2],
}

/// The `count` most important waves over every spectrum and scale, sorted by
/// descending `amplitude × weight`.
pub fn find_most_meaningful_waves(spectra: &[Arc<SpectrumData>], count: usize) -> Vec<WeightedWave> {
    let mut selected = Vec::new();

    for data in spectra {
        let weight = data.weight();
        if weight < MIN_SELECTION_WEIGHT {
            continue;
        }

        let guard = data.waves();
        let Some(lists) = guard.as_ref() else { continue };
        let resolution = data.settings().resolution;

        for (scale, waves) in lists.scales.iter().enumerate() {
            let tile_size = data.tile_size(scale);
            // Lists are kept in descending priority order
            selected.extend(waves.iter().take(count).map(|wave| WeightedWave {
                wave: *wave,
                weight,
                tile_size,
                resolution,
            }));
        }
    }

    selected.sort_by(|a, b| b.importance().total_cmp(&a.importance()));
    selected.truncate(count);
    selected
}

/// Select up to `count` waves (capped at [`MAX_GERSTNER_WAVES`]) as Gerstner parameters.
pub fn find_gerstners(spectra: &[Arc<SpectrumData>], count: usize) -> Vec<GerstnerWave> {
    find_most_meaningful_waves(spectra, count.min(MAX_GERSTNER_WAVES))
        .iter()
        .map(GerstnerWave::from_wave)
        .collect()
}

/// Pack waves into uniform blocks, padding the last block.
pub fn pack_uniforms(waves: &[GerstnerWave], horizontal_displacement_scale: f32) -> GerstnerUniforms {
    let mut uniforms = GerstnerUniforms {
        horizontal_displacement_scale,
        ..Default::default()
    };
    // Unused blocks still need a valid direction
    uniforms.blocks = [Gerstner4::pack(&[]); MAX_GERSTNER_BLOCKS];

    for (block, chunk) in uniforms.blocks.iter_mut().zip(waves.chunks(4)) {
        *block = Gerstner4::pack(chunk);
        uniforms.block_count += 1;
    }
    uniforms
}

/// Sum of closed-form heights
pub fn height_at(waves: &[GerstnerWave], position: Vec2, time: f32) -> f32 {
    waves.iter().map(|wave| wave.height_at(position, time)).sum()
}

/// Sum of closed-form displacements
pub fn displacement_at(waves: &[GerstnerWave], position: Vec2, time: f32, horizontal_scale: f32) -> Vec3 {
    waves
        .iter()
        .map(|wave| wave.displacement_at(position, time, horizontal_scale))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::WaveProfile;
    use crate::spectrum::{GridSettings, SpectrumCache, WaveSpectrum};

    fn spectra(weight: f32) -> Vec<Arc<SpectrumData>> {
        let cache = SpectrumCache::new(GridSettings {
            resolution: 32,
            max_resolution: 32,
            seed: 5,
            ..GridSettings::default()
        });
        let data = cache.get_or_create(&WaveSpectrum::new(WaveProfile::default()));
        data.validate();
        data.set_weight(weight);
        vec![data]
    }

    #[test]
    fn test_selection_sorted_and_truncated() {
        let spectra = spectra(1.0);
        let waves = find_most_meaningful_waves(&spectra, 8);
        assert_eq!(waves.len(), 8);
        assert!(waves.windows(2).all(|w| w[0].importance() >= w[1].importance()));
    }

    #[test]
    fn test_weightless_spectra_ignored() {
        let spectra = spectra(0.0);
        assert!(find_most_meaningful_waves(&spectra, 8).is_empty());
    }

    #[test]
    fn test_gerstner_matches_wave_with_map_offset() {
        let spectra = spectra(0.7);
        for weighted in find_most_meaningful_waves(&spectra, 6) {
            let gerstner = GerstnerWave::from_wave(&weighted);
            let half_texel = 0.5 * weighted.tile_size / weighted.resolution as f32;

            for p in [Vec2::ZERO, Vec2::new(13.0, -4.5), Vec2::new(-70.0, 22.0)] {
                let t = 1.25;
                let expected = weighted.wave.height_at(p, t) * weighted.weight;
                let actual = gerstner.height_at(p + Vec2::splat(half_texel), t);
                assert!((expected - actual).abs() < 1e-3, "{} vs {}", expected, actual);
            }
        }
    }

    #[test]
    fn test_uniforms_padded() {
        let spectra = spectra(1.0);
        let waves = find_gerstners(&spectra, 6);
        assert_eq!(waves.len(), 6);

        let uniforms = pack_uniforms(&waves, 1.0);
        assert_eq!(uniforms.block_count, 2);
        // Last two lanes of block 1 are padding
        assert_eq!(uniforms.blocks[1].amplitude[2], 0.0);
        assert_eq!(uniforms.blocks[1].frequency[3], 1.0);
        assert_eq!(uniforms.blocks[1].direction_cd, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(uniforms.blocks[4].direction_ab, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(bytemuck::bytes_of(&uniforms).len() % 16, 0);
    }

    #[test]
    fn test_count_capped() {
        let spectra = spectra(1.0);
        assert!(find_gerstners(&spectra, 100).len() <= MAX_GERSTNER_WAVES);
    }
}
