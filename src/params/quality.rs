//! Quality presets limiting resolution and render features.

/// Which wave rendering techniques a quality level permits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WavesMode {
    AllowAll,
    AllowSlopeFft,
    AllowGerstner,
    DisallowAll,
}

/// Named quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLevel {
    VeryLow,
    Low,
    Medium,
    High,
    Ultra,
}

/// Quality limits applied on top of the requested settings
#[derive(Debug, Clone)]
pub struct QualitySettings {
    pub level: QualityLevel,

    /// Upper bound on spectrum resolution (cells per side)
    pub max_spectrum_resolution: usize,

    /// Multiplier on every profile's tile size (dimensionless)
    pub tile_size_scale: f32,

    pub waves_mode: WavesMode,

    /// Whether 32-bit maps may be used at all
    pub allow_high_precision: bool,
}

impl QualitySettings {
    pub fn preset(level: QualityLevel) -> Self {
        let (max_spectrum_resolution, waves_mode, allow_high_precision) = match level {
            QualityLevel::VeryLow => (64, WavesMode::AllowGerstner, false),
            QualityLevel::Low => (128, WavesMode::AllowSlopeFft, false),
            QualityLevel::Medium => (256, WavesMode::AllowAll, false),
            QualityLevel::High => (512, WavesMode::AllowAll, true),
            QualityLevel::Ultra => (1024, WavesMode::AllowAll, true),
        };

        Self {
            level,
            max_spectrum_resolution,
            tile_size_scale: 1.0,
            waves_mode,
            allow_high_precision,
        }
    }
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self::preset(QualityLevel::High)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_scale_with_level() {
        let low = QualitySettings::preset(QualityLevel::Low);
        let ultra = QualitySettings::preset(QualityLevel::Ultra);
        assert!(low.max_spectrum_resolution < ultra.max_spectrum_resolution);
        assert!(low.waves_mode > ultra.waves_mode);
    }
}
