//! Wind wave simulation settings.

use glam::Vec2;

/// Physical tile size multipliers of the four spectrum scales.
///
/// Irrational ratios keep the tiles from repeating in sync.
pub const TILE_SIZE_SCALES: [f32; 4] = [0.79241, 0.163151, 3.175131, 13.7315131];

/// How waves are presented to the rendering collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// FFT displacement and slope maps
    FullFft,
    /// Gerstner displacement with FFT slope maps
    GerstnerAndFftSlope,
    /// Analytic Gerstner waves only
    Gerstner,
}

/// Wind waves configuration
#[derive(Debug, Clone)]
pub struct WindWavesSettings {
    /// Spectrum grid resolution (cells per side, power of two)
    pub resolution: usize,

    /// Request 32-bit float maps (falls back to 16-bit when unsupported)
    pub high_precision: bool,

    /// Minimum sinusoid amplitude for a bin to become a CPU wave (meters)
    pub cpu_wave_threshold_m: f32,

    /// Cap on CPU waves kept per scale
    pub cpu_max_waves: usize,

    /// Tile size multipliers per scale
    pub tile_size_scales: [f32; 4],

    /// Spectrum seed (0 = random per run, nonzero = replayable)
    pub seed: u64,

    /// Requested render mode (may be downgraded by capabilities)
    pub render_mode: RenderMode,

    /// Allow point queries to be served from CPU FFT snapshots
    pub allow_cpu_fft: bool,

    /// Time between precomputed FFT snapshots (seconds)
    pub fft_time_step_s: f32,

    /// Number of analytic Gerstner waves exposed to rendering
    pub gerstner_count: usize,

    /// Wind direction (unit vector on the XZ plane)
    pub wind_direction: Vec2,
}

impl Default for WindWavesSettings {
    fn default() -> Self {
        Self {
            resolution: 256,
            high_precision: true,
            cpu_wave_threshold_m: 0.008,
            cpu_max_waves: 2500,
            tile_size_scales: TILE_SIZE_SCALES,
            seed: 0,
            render_mode: RenderMode::FullFft,
            allow_cpu_fft: true,
            fft_time_step_s: 0.2,
            gerstner_count: 20,
            wind_direction: Vec2::X,
        }
    }
}

impl WindWavesSettings {
    /// Validate settings that cannot be repaired by fallback.
    ///
    /// Resolution and precision are not checked here; see
    /// [`crate::capabilities::resolve_settings`].
    pub fn validate(&self) -> Result<(), String> {
        if self.cpu_wave_threshold_m < 0.0 {
            return Err("CPU wave threshold must be non-negative".to_string());
        }
        if !(self.fft_time_step_s > 0.0) {
            return Err("FFT time step must be positive".to_string());
        }
        if self.wind_direction.length_squared() < 1e-6 {
            return Err("wind direction must be non-zero".to_string());
        }
        Ok(())
    }
}
