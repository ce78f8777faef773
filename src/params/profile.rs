//! Wave profile parameters (wind, fetch and spectrum shape).

/// Statistical spectrum used to generate a profile's wave grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumKind {
    /// Phillips spectrum (wind speed only, fully developed sea)
    Phillips,
    /// Elfouhaily unified spectrum (wind speed and fetch)
    Unified,
}

/// One named sea state. Profiles are blended by weight.
#[derive(Debug, Clone)]
pub struct WaveProfile {
    /// Display name, also used in logs
    pub name: String,

    pub spectrum: SpectrumKind,

    /// Wind speed 10m above the surface (m/s)
    pub wind_speed_ms: f32,

    /// Distance over which the wind has blown (meters, Unified only)
    pub fetch_m: f32,

    /// Base tile size before per-scale multipliers (meters)
    pub tile_size_m: f32,

    /// Energy multiplier applied to the spectrum (dimensionless, 1.0 = physical)
    pub amplitude: f32,

    /// How strongly waves against the wind are suppressed (0 = none, 1 = all)
    pub directionality: f32,

    /// Choppiness: multiplier on horizontal displacement (dimensionless)
    pub horizontal_displacement_scale: f32,

    /// Gravitational acceleration (m/s²)
    pub gravity_ms2: f32,
}

impl Default for WaveProfile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            spectrum: SpectrumKind::Phillips,
            wind_speed_ms: 10.0,
            fetch_m: 100_000.0, // Open ocean
            tile_size_m: 180.0,
            amplitude: 1.0,
            directionality: 0.5,
            horizontal_displacement_scale: 1.0,
            gravity_ms2: 9.81,
        }
    }
}

impl WaveProfile {
    /// Calm sea preset
    pub fn calm() -> Self {
        Self {
            name: "Calm".to_string(),
            wind_speed_ms: 4.0,
            fetch_m: 20_000.0,
            directionality: 0.3,
            horizontal_displacement_scale: 0.6,
            ..Self::default()
        }
    }

    /// Storm preset using the fetch-limited unified spectrum
    pub fn storm() -> Self {
        Self {
            name: "Storm".to_string(),
            spectrum: SpectrumKind::Unified,
            wind_speed_ms: 22.0,
            fetch_m: 400_000.0,
            tile_size_m: 320.0,
            directionality: 0.8,
            horizontal_displacement_scale: 1.4,
            ..Self::default()
        }
    }

    /// Sanity-check parameter ranges
    pub fn validate(&self) -> Result<(), String> {
        if !(self.wind_speed_ms > 0.0) {
            return Err(format!("wind speed must be positive, got {}", self.wind_speed_ms));
        }
        if !(self.tile_size_m > 0.0) {
            return Err(format!("tile size must be positive, got {}", self.tile_size_m));
        }
        if !(self.fetch_m > 0.0) {
            return Err(format!("fetch must be positive, got {}", self.fetch_m));
        }
        if !(0.0..=1.0).contains(&self.directionality) {
            return Err(format!(
                "directionality must be in [0, 1], got {}",
                self.directionality
            ));
        }
        if !(self.gravity_ms2 > 0.0) {
            return Err("gravity must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(WaveProfile::default().validate().is_ok());
        assert!(WaveProfile::calm().validate().is_ok());
        assert!(WaveProfile::storm().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_directionality() {
        let profile = WaveProfile {
            directionality: 1.5,
            ..WaveProfile::default()
        };
        assert!(profile.validate().is_err());
    }
}
