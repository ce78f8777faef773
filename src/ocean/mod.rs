//! Ocean simulation handle: spectra, point queries, FFT levels and render data.
//!
//! An [`OceanSystem`] is created with [`OceanSystem::init`], advanced once per
//! frame with [`OceanSystem::update`] and torn down with
//! [`OceanSystem::shutdown`] (also run on drop).

mod level;
mod maps;
mod resolver;

use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use log::{error, info};

use crate::capabilities::{resolve_settings, Capabilities, FinalSettings, RenderFeatures};
use crate::error::{Result, WaterError};
use crate::fft::create_transform;
use crate::gerstner::{self, GerstnerUniforms, GerstnerWave};
use crate::params::{QualitySettings, WaveProfile, WindWavesSettings};
use crate::sampling::{DisplacementMode, WaterSample};
use crate::spectrum::{GridSettings, SpectrumCache, WaveSpectrum};
use crate::tasks::TaskRunner;

pub use level::{fft_resolution_for, select_resolve_mode, ResolveMode, SpectrumLevel, RING_SIZE};
pub use maps::{MapSet, PackedMap, WaveMapRenderer, MAP_SLOTS};
pub use resolver::{ScaleMask, SpectrumResolver, SurfaceStatistics};

/// Wind-driven ocean surface
pub struct OceanSystem {
    settings: WindWavesSettings,
    final_settings: FinalSettings,
    resolver: Arc<SpectrumResolver>,
    profiles: Vec<(Arc<WaveSpectrum>, f32)>,
    maps: Option<WaveMapRenderer>,
    gerstners: Vec<GerstnerWave>,
    gerstner_revision: Option<u64>,
    time: f32,
    /// External clock (network replay); overrides `dt` accumulation
    time_override: Option<f32>,
    wind_direction: Vec2,
    shut_down: bool,
}

impl OceanSystem {
    /// Resolve settings against quality and hardware, generate the spectra and
    /// register with `runner`.
    ///
    /// A seed of 0 is replaced by a random nonzero seed.
    pub fn init(
        settings: WindWavesSettings,
        quality: &QualitySettings,
        profiles: &[(WaveProfile, f32)],
        capabilities: &Capabilities,
        runner: Arc<TaskRunner>,
    ) -> Result<Self> {
        settings.validate().map_err(WaterError::InvalidSettings)?;
        for (profile, _) in profiles {
            profile
                .validate()
                .map_err(|e| WaterError::InvalidSettings(format!("profile '{}': {}", profile.name, e)))?;
        }

        let final_settings = resolve_settings(&settings, quality, capabilities);
        let seed = if settings.seed == 0 {
            let seed = rand::random::<u64>().max(1);
            info!("Random spectrum seed: {}", seed);
            seed
        } else {
            settings.seed
        };
        let wind_direction = settings.wind_direction.normalize_or(Vec2::X);

        let cache = SpectrumCache::new(GridSettings {
            resolution: final_settings.resolution,
            max_resolution: final_settings.resolution,
            seed,
            tile_size_scales: settings.tile_size_scales,
            quality_tile_scale: quality.tile_size_scale,
            cpu_wave_threshold: settings.cpu_wave_threshold_m,
            cpu_max_waves: settings.cpu_max_waves,
            wind_direction,
        });
        let resolver = SpectrumResolver::new(
            cache,
            runner,
            settings.allow_cpu_fft,
            settings.fft_time_step_s,
        );

        let profiles: Vec<_> = profiles
            .iter()
            .map(|(profile, weight)| (WaveSpectrum::new(profile.clone()), *weight))
            .collect();
        resolver.set_profiles(&profiles);
        resolver.update(0.0, wind_direction);

        let features = final_settings.features();
        let maps = (features.fft_displacement || features.fft_slope).then(|| {
            WaveMapRenderer::new(create_transform(capabilities), final_settings.high_precision)
        });

        info!(
            "Ocean initialized: {}x{} spectrum, {:?}, {} profile(s)",
            final_settings.resolution,
            final_settings.resolution,
            final_settings.render_mode,
            profiles.len()
        );

        let mut ocean = Self {
            settings,
            final_settings,
            resolver,
            profiles,
            maps,
            gerstners: Vec::new(),
            gerstner_revision: None,
            time: 0.0,
            time_override: None,
            wind_direction,
            shut_down: false,
        };
        ocean.refresh_render_data()?;
        Ok(ocean)
    }

    /// Advance simulation time by `dt` seconds (ignored while an external
    /// time is set) and refresh everything that depends on it.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }

        self.time = match self.time_override {
            Some(time) => time,
            None => self.time + dt,
        };
        self.resolver.update(self.time, self.wind_direction);
        self.refresh_render_data()?;

        for fault in self.resolver.runner().take_faults() {
            error!("Water task fault: {}", fault);
        }
        Ok(())
    }

    fn refresh_render_data(&mut self) -> Result<()> {
        let revision = self.resolver.revision();
        if self.final_settings.features().gerstner && self.gerstner_revision != Some(revision) {
            self.gerstners = gerstner::find_gerstners(&self.resolver.spectra(), self.settings.gerstner_count);
            self.gerstner_revision = Some(revision);
        }

        if let Some(maps) = self.maps.as_mut() {
            maps.render(&self.resolver, self.final_settings.resolution, self.time)?;
        }
        Ok(())
    }

    /// Drive time from an external clock until [`Self::clear_time_override`]
    pub fn set_time(&mut self, time: f32) {
        self.time_override = Some(time);
        self.time = time;
    }

    pub fn clear_time_override(&mut self) {
        self.time_override = None;
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Applied on the next [`Self::update`]
    pub fn set_wind_direction(&mut self, direction: Vec2) {
        self.wind_direction = direction.normalize_or(self.wind_direction);
    }

    pub fn wind_direction(&self) -> Vec2 {
        self.wind_direction
    }

    /// World offset added to every query position (floating origin)
    pub fn set_surface_offset(&mut self, offset: Vec2) {
        self.resolver.set_surface_offset(offset);
    }

    /// Re-weight the profiles given to [`Self::init`], in the same order.
    /// Missing entries keep their weight.
    pub fn set_profile_weights(&mut self, weights: &[f32]) {
        for ((_, weight), new_weight) in self.profiles.iter_mut().zip(weights) {
            *weight = new_weight.max(0.0);
        }
        self.resolver.set_profiles(&self.profiles);
    }

    /// New idle sample; call [`WaterSample::start`] or
    /// [`WaterSample::get_and_reset`] to begin computing.
    pub fn create_sample(&self, mode: DisplacementMode, precision: f32) -> Result<Arc<WaterSample>> {
        WaterSample::new(&self.resolver, mode, precision)
    }

    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let mut completed = true;
        self.resolver.height_at(x, z, 0.0, 1.0, self.time, &mut completed)
    }

    /// `(dx, height, dz)` of the surface point resting at `(x, z)`
    pub fn displacement_at(&self, x: f32, z: f32) -> Vec3 {
        let mut completed = true;
        self.resolver.displacement_at(x, z, 0.0, 1.0, self.time, &mut completed)
    }

    /// `(force x, force y, force z, height)`
    pub fn force_and_height_at(&self, x: f32, z: f32) -> Vec4 {
        let mut completed = true;
        self.resolver.force_and_height_at(x, z, 0.0, 1.0, self.time, &mut completed)
    }

    pub fn resolver(&self) -> &Arc<SpectrumResolver> {
        &self.resolver
    }

    pub fn statistics(&self) -> SurfaceStatistics {
        self.resolver.statistics()
    }

    pub fn final_settings(&self) -> &FinalSettings {
        &self.final_settings
    }

    pub fn features(&self) -> RenderFeatures {
        self.final_settings.features()
    }

    /// Seed the spectra were generated with
    pub fn seed(&self) -> u64 {
        self.resolver.cache().settings().seed
    }

    pub fn maps(&self) -> Option<&WaveMapRenderer> {
        self.maps.as_ref()
    }

    pub fn gerstners(&self) -> &[GerstnerWave] {
        &self.gerstners
    }

    pub fn gerstner_uniforms(&self) -> GerstnerUniforms {
        gerstner::pack_uniforms(
            &self.gerstners,
            self.statistics().horizontal_displacement_scale,
        )
    }

    /// Stop FFT work for this ocean. Samples must be stopped by their owners.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.resolver.deregister_levels();
        self.shut_down = true;
        info!("Ocean shut down");
    }
}

impl Drop for OceanSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
