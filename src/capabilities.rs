//! Hardware capability detection and fallback resolution of requested settings.

use log::{info, warn};

use crate::fft::{TransformBackend, PLANES};
use crate::params::{QualitySettings, RenderMode, WavesMode, WindWavesSettings};

/// Largest supported spectrum resolution
pub const MAX_RESOLUTION: usize = 4096;

/// Smallest supported spectrum resolution
pub const MIN_RESOLUTION: usize = 16;

/// What the host hardware supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub adapter_available: bool,
    pub compute_shaders: bool,
    /// 32-bit float render targets
    pub float_render_targets: bool,
    /// 16-bit float render targets
    pub half_render_targets: bool,
    pub max_texture_size: usize,
    /// Largest storage buffer binding (bytes)
    pub max_storage_buffer_size: u64,
}

impl Capabilities {
    /// Software-only maps: any precision, no compute.
    pub fn cpu_only() -> Self {
        Self {
            adapter_available: false,
            compute_shaders: false,
            float_render_targets: true,
            half_render_targets: true,
            max_texture_size: MAX_RESOLUTION,
            max_storage_buffer_size: u64::MAX,
        }
    }

    /// Probe the default adapter. Falls back to [`Self::cpu_only`] without one.
    pub fn detect() -> Self {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }));

        let Some(adapter) = adapter else {
            info!("No GPU adapter found, using CPU capabilities");
            return Self::cpu_only();
        };

        let renderable = |format: wgpu::TextureFormat| {
            adapter
                .get_texture_format_features(format)
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        };

        let capabilities = Self {
            adapter_available: true,
            compute_shaders: adapter
                .get_downlevel_capabilities()
                .flags
                .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
            float_render_targets: renderable(wgpu::TextureFormat::Rgba32Float),
            half_render_targets: renderable(wgpu::TextureFormat::Rgba16Float),
            max_texture_size: adapter.limits().max_texture_dimension_2d as usize,
            max_storage_buffer_size: u64::from(adapter.limits().max_storage_buffer_binding_size)
                .min(adapter.limits().max_buffer_size),
        };

        info!("Adapter '{}': {:?}", adapter.get_info().name, capabilities);
        capabilities
    }
}

/// Flags the rendering collaborator picks its shader variant from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderFeatures {
    pub fft_displacement: bool,
    pub fft_slope: bool,
    pub gerstner: bool,
    pub high_precision: bool,
    /// Slope variance from the FFT maps drives roughness
    pub dynamic_smoothness: bool,
}

/// Settings after every fallback has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalSettings {
    pub resolution: usize,
    pub high_precision: bool,
    /// `None` when the quality level disallows rendered waves
    pub render_mode: Option<RenderMode>,
}

impl FinalSettings {
    pub fn features(&self) -> RenderFeatures {
        match self.render_mode {
            Some(RenderMode::FullFft) => RenderFeatures {
                fft_displacement: true,
                fft_slope: true,
                gerstner: false,
                high_precision: self.high_precision,
                dynamic_smoothness: true,
            },
            Some(RenderMode::GerstnerAndFftSlope) => RenderFeatures {
                fft_displacement: false,
                fft_slope: true,
                gerstner: true,
                high_precision: self.high_precision,
                dynamic_smoothness: true,
            },
            Some(RenderMode::Gerstner) => RenderFeatures {
                gerstner: true,
                ..Default::default()
            },
            None => RenderFeatures::default(),
        }
    }
}

/// Reconcile requested settings with quality limits and hardware.
///
/// Never fails: unsupported requests fall back to the next supported option
/// with a warning.
pub fn resolve_settings(
    settings: &WindWavesSettings,
    quality: &QualitySettings,
    capabilities: &Capabilities,
) -> FinalSettings {
    let limit = quality
        .max_spectrum_resolution
        .min(MAX_RESOLUTION)
        .min(capabilities.max_texture_size)
        .max(MIN_RESOLUTION);
    let mut resolution = settings
        .resolution
        .max(MIN_RESOLUTION)
        .checked_next_power_of_two()
        .unwrap_or(MAX_RESOLUTION);
    if resolution != settings.resolution {
        warn!(
            "Resolution {} is not a supported power of two, using {}",
            settings.resolution, resolution
        );
    }
    if resolution > limit {
        // Largest power of two within the limit
        let clamped = 1usize << (usize::BITS - 1 - limit.leading_zeros());
        warn!("Resolution {} exceeds limit {}, using {}", resolution, limit, clamped);
        resolution = clamped;
    }

    if TransformBackend::select(capabilities) == TransformBackend::GpuCompute {
        let gpu_limit = max_gpu_resolution(capabilities.max_storage_buffer_size);
        if resolution > gpu_limit {
            warn!(
                "Resolution {} exceeds the GPU storage buffer limit, using {}",
                resolution, gpu_limit
            );
            resolution = gpu_limit;
        }
    }

    let mut high_precision = settings.high_precision;
    if high_precision && !(quality.allow_high_precision && capabilities.float_render_targets) {
        warn!("High precision maps unavailable, using half precision");
        high_precision = false;
    }

    let render_mode = resolve_render_mode(settings.render_mode, quality.waves_mode, capabilities);

    FinalSettings {
        resolution,
        high_precision,
        render_mode,
    }
}

/// Largest power of two whose FFT planes fit one storage binding of `max_bytes`
pub fn max_gpu_resolution(max_bytes: u64) -> usize {
    let cell_bytes = (PLANES * std::mem::size_of::<[f32; 2]>()) as u64;
    let mut resolution = MAX_RESOLUTION;
    while resolution > MIN_RESOLUTION && cell_bytes * (resolution * resolution) as u64 > max_bytes {
        resolution /= 2;
    }
    resolution
}

fn resolve_render_mode(
    requested: RenderMode,
    waves_mode: WavesMode,
    capabilities: &Capabilities,
) -> Option<RenderMode> {
    if waves_mode == WavesMode::DisallowAll {
        warn!("Quality level disallows rendered waves");
        return None;
    }

    let maps_supported = capabilities.float_render_targets || capabilities.half_render_targets;
    let mut mode = requested;

    if mode == RenderMode::FullFft && (waves_mode > WavesMode::AllowAll || !maps_supported) {
        warn!("Full FFT rendering unavailable, falling back to Gerstner with FFT slope");
        mode = RenderMode::GerstnerAndFftSlope;
    }
    if mode == RenderMode::GerstnerAndFftSlope
        && (waves_mode > WavesMode::AllowSlopeFft || !maps_supported)
    {
        warn!("FFT slope maps unavailable, falling back to Gerstner waves");
        mode = RenderMode::Gerstner;
    }

    Some(mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::QualityLevel;

    #[test]
    fn test_resolution_rounded_and_clamped() {
        let quality = QualitySettings::preset(QualityLevel::Medium);
        let caps = Capabilities::cpu_only();

        let settings = WindWavesSettings {
            resolution: 200,
            ..Default::default()
        };
        assert_eq!(resolve_settings(&settings, &quality, &caps).resolution, 256);

        let settings = WindWavesSettings {
            resolution: 2048,
            ..Default::default()
        };
        assert_eq!(resolve_settings(&settings, &quality, &caps).resolution, 256);

        let settings = WindWavesSettings {
            resolution: 4,
            ..Default::default()
        };
        assert_eq!(resolve_settings(&settings, &quality, &caps).resolution, 16);
    }

    #[test]
    fn test_texture_limit_clamps_resolution() {
        let caps = Capabilities {
            max_texture_size: 100,
            ..Capabilities::cpu_only()
        };
        let settings = WindWavesSettings {
            resolution: 512,
            ..Default::default()
        };
        let resolved = resolve_settings(&settings, &QualitySettings::default(), &caps);
        assert_eq!(resolved.resolution, 64);
    }

    #[test]
    fn test_gpu_storage_limit_clamps_resolution() {
        assert_eq!(max_gpu_resolution(u64::MAX), MAX_RESOLUTION);
        // wgpu's default 128 MiB binding holds 2048² cells of four planes
        assert_eq!(max_gpu_resolution(128 << 20), 2048);
        assert_eq!(max_gpu_resolution(0), MIN_RESOLUTION);

        let quality = QualitySettings {
            max_spectrum_resolution: MAX_RESOLUTION,
            ..Default::default()
        };
        let settings = WindWavesSettings {
            resolution: 4096,
            ..Default::default()
        };
        let gpu = Capabilities {
            adapter_available: true,
            compute_shaders: true,
            max_storage_buffer_size: 128 << 20,
            ..Capabilities::cpu_only()
        };
        assert_eq!(resolve_settings(&settings, &quality, &gpu).resolution, 2048);

        // The CPU transform has no such limit
        let cpu = Capabilities {
            max_storage_buffer_size: 128 << 20,
            ..Capabilities::cpu_only()
        };
        assert_eq!(resolve_settings(&settings, &quality, &cpu).resolution, 4096);
    }

    #[test]
    fn test_precision_fallback() {
        let caps = Capabilities {
            float_render_targets: false,
            ..Capabilities::cpu_only()
        };
        let resolved = resolve_settings(&WindWavesSettings::default(), &QualitySettings::default(), &caps);
        assert!(!resolved.high_precision);
    }

    #[test]
    fn test_render_mode_chain() {
        let caps = Capabilities::cpu_only();
        let settings = WindWavesSettings::default();

        let all = resolve_settings(&settings, &QualitySettings::preset(QualityLevel::High), &caps);
        assert_eq!(all.render_mode, Some(RenderMode::FullFft));

        let slope = resolve_settings(&settings, &QualitySettings::preset(QualityLevel::Low), &caps);
        assert_eq!(slope.render_mode, Some(RenderMode::GerstnerAndFftSlope));

        let gerstner = resolve_settings(&settings, &QualitySettings::preset(QualityLevel::VeryLow), &caps);
        assert_eq!(gerstner.render_mode, Some(RenderMode::Gerstner));
        assert!(gerstner.features().gerstner);
        assert!(!gerstner.features().fft_slope);
    }

    #[test]
    fn test_no_map_formats_forces_gerstner() {
        let caps = Capabilities {
            float_render_targets: false,
            half_render_targets: false,
            ..Capabilities::cpu_only()
        };
        let resolved = resolve_settings(&WindWavesSettings::default(), &QualitySettings::default(), &caps);
        assert_eq!(resolved.render_mode, Some(RenderMode::Gerstner));
    }

    #[test]
    fn test_disallow_all_disables_features() {
        let quality = QualitySettings {
            waves_mode: WavesMode::DisallowAll,
            ..Default::default()
        };
        let resolved = resolve_settings(&WindWavesSettings::default(), &quality, &Capabilities::cpu_only());
        assert_eq!(resolved.render_mode, None);
        assert_eq!(resolved.features(), RenderFeatures::default());
    }
}
