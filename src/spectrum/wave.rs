//! Discrete waves extracted from spectrum grids for direct CPU summation.

use glam::{Vec2, Vec3, Vec4};

use super::SpectrumCell;

/// Directional spreading factor applied to a spectrum amplitude.
///
/// `sqrt(1 + spread·cos 2φ)` with φ the angle between wind and wave
/// direction, attenuated by `1 - directionality` against the wind.
#[inline]
pub fn directional_factor(direction: Vec2, spread: f32, wind: Vec2, directionality: f32) -> f32 {
    let dp = wind.dot(direction);
    let cos_2phi = 2.0 * dp * dp - 1.0;
    let factor = (1.0 + spread * cos_2phi).max(0.0).sqrt();

    if dp < 0.0 {
        factor * (1.0 - directionality)
    } else {
        factor
    }
}

/// Unscaled wave field values at a point
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawSample {
    pub height: f32,
    /// Σ n̂·A·sin θ
    pub displacement: Vec2,
    /// (Σ n̂x·A·cos θ, Σ A·sin θ, Σ n̂z·A·cos θ)
    pub force: Vec3,
}

impl RawSample {
    pub fn add_scaled(&mut self, other: &RawSample, weight: f32) {
        self.height += other.height * weight;
        self.displacement += other.displacement * weight;
        self.force += other.force * weight;
    }

    pub fn lerp(&self, other: &RawSample, t: f32) -> RawSample {
        RawSample {
            height: self.height + (other.height - self.height) * t,
            displacement: self.displacement.lerp(other.displacement, t),
            force: self.force.lerp(other.force, t),
        }
    }

    /// Pack as `(force.x, force.y, force.z, height)`
    pub fn force_and_height(&self) -> Vec4 {
        self.force.extend(self.height)
    }
}

/// One sinusoid of the spectrum: `A·cos(k·p - ωt + φ)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscreteWave {
    pub scale_index: usize,
    /// Storage cell the wave came from
    pub cell: (u16, u16),
    pub kx: f32,
    pub ky: f32,
    pub k: f32,
    /// Unit wavenumber direction (wind direction when k = 0)
    pub direction: Vec2,
    /// Angular frequency from the deep water dispersion relation (rad/s)
    pub angular_frequency: f32,
    /// Amplitude before directional spreading (meters)
    pub base_amplitude: f32,
    pub phase: f32,
    pub spread: f32,
    /// Amplitude after directional spreading (meters)
    pub amplitude: f32,
    pub priority: f32,
}

impl DiscreteWave {
    pub fn new(
        scale_index: usize,
        cell_index: (usize, usize),
        wavenumber: Vec2,
        cell: SpectrumCell,
        gravity: f32,
        wind: Vec2,
    ) -> Self {
        let k = wavenumber.length();
        let direction = if k > 0.0 { wavenumber / k } else { wind };
        let base_amplitude = cell.amplitude();

        Self {
            scale_index,
            cell: (cell_index.0 as u16, cell_index.1 as u16),
            kx: wavenumber.x,
            ky: wavenumber.y,
            k,
            direction,
            angular_frequency: (gravity * k).sqrt(),
            base_amplitude,
            phase: cell.im.atan2(cell.re),
            spread: cell.spread,
            amplitude: base_amplitude,
            priority: base_amplitude,
        }
    }

    /// Re-apply directional spreading for a new wind
    pub fn update_spectral_values(&mut self, wind: Vec2, directionality: f32) {
        self.amplitude =
            self.base_amplitude * directional_factor(self.direction, self.spread, wind, directionality);
        self.priority = self.amplitude;
    }

    #[inline]
    pub fn phase_at(&self, position: Vec2, time: f32) -> f32 {
        self.kx * position.x + self.ky * position.y - self.angular_frequency * time + self.phase
    }

    pub fn height_at(&self, position: Vec2, time: f32) -> f32 {
        self.amplitude * self.phase_at(position, time).cos()
    }

    /// Unscaled horizontal displacement `n̂·A·sin θ`
    pub fn horizontal_displacement_at(&self, position: Vec2, time: f32) -> Vec2 {
        self.direction * (self.amplitude * self.phase_at(position, time).sin())
    }

    /// All channels at once, weighted by `weight`
    #[inline]
    pub fn accumulate(&self, position: Vec2, time: f32, weight: f32, out: &mut RawSample) {
        let amplitude = self.amplitude * weight;
        let (s, c) = self.phase_at(position, time).sin_cos();
        let a_cos = amplitude * c;
        let a_sin = amplitude * s;

        out.height += a_cos;
        out.displacement += self.direction * a_sin;
        out.force += Vec3::new(self.direction.x * a_cos, a_sin, self.direction.y * a_cos);
    }
}
