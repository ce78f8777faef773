//! Point queries over the blended spectra.
//!
//! Each scale is answered either by summing its discrete waves directly or by
//! interpolating the FFT snapshots of its [`SpectrumLevel`], whichever is
//! cheaper for the current number of waves and active samples.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use glam::{Vec2, Vec3, Vec4};
use log::debug;

use super::level::{select_resolve_mode, ResolveMode, SpectrumLevel};
use crate::spectrum::{RawSample, SpectrumCache, SpectrumData, WaveSpectrum, NUM_SCALES};
use crate::sync::{read, write};
use crate::tasks::TaskRunner;

/// Spectra lighter than this are skipped by queries starting at 0
const MIN_QUERY_WEIGHT: f32 = 0.001;

/// Vertical force channel attenuation
const FORCE_Y_SCALE: f32 = 0.25;

/// Fraction of the total amplitude assumed reachable by vertical displacement
const MAX_VERTICAL_FRACTION: f32 = 0.12;

/// One flag per scale, set where the FFT level answers instead of the waves
pub type ScaleMask = [bool; NUM_SCALES];

/// Aggregate properties of the blended profiles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceStatistics {
    /// Σ tile size · quality scale · weight (meters)
    pub tile_size: f32,
    pub wind_speed: f32,
    pub directionality: f32,
    pub horizontal_displacement_scale: f32,
    /// Σ total amplitude · weight (meters)
    pub total_amplitude: f32,
    pub max_vertical_displacement: f32,
    pub max_horizontal_displacement: f32,
}

impl Default for SurfaceStatistics {
    fn default() -> Self {
        Self {
            tile_size: 0.0,
            wind_speed: 0.0,
            directionality: 0.0,
            horizontal_displacement_scale: 1.0,
            total_amplitude: 0.0,
            max_vertical_displacement: 0.0,
            max_horizontal_displacement: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct SurfaceState {
    time: f32,
    wind_direction: Vec2,
    gravity: f32,
    /// Weight-normalized base tile size used by the FFT levels
    mean_tile_size: f32,
    surface_offset: Vec2,
    statistics: SurfaceStatistics,
}

/// Blends the cached spectra and answers height, displacement and force queries.
pub struct SpectrumResolver {
    cache: SpectrumCache,
    runner: Arc<TaskRunner>,
    allow_cpu_fft: bool,
    fft_time_step: f32,
    levels: [Arc<SpectrumLevel>; NUM_SCALES],
    surface: RwLock<SurfaceState>,
    /// Bumped whenever the directional spectrum must be rebuilt
    revision: AtomicU64,
    active_samples: AtomicUsize,
}

impl SpectrumResolver {
    pub fn new(
        cache: SpectrumCache,
        runner: Arc<TaskRunner>,
        allow_cpu_fft: bool,
        fft_time_step: f32,
    ) -> Arc<Self> {
        let wind_direction = cache.settings().wind_direction.normalize_or(Vec2::X);

        Arc::new_cyclic(|weak| Self {
            cache,
            runner,
            allow_cpu_fft,
            fft_time_step,
            levels: std::array::from_fn(|scale| Arc::new(SpectrumLevel::new(weak.clone(), scale))),
            surface: RwLock::new(SurfaceState {
                time: 0.0,
                wind_direction,
                gravity: 9.81,
                mean_tile_size: 0.0,
                surface_offset: Vec2::ZERO,
                statistics: SurfaceStatistics::default(),
            }),
            revision: AtomicU64::new(0),
            active_samples: AtomicUsize::new(0),
        })
    }

    pub fn cache(&self) -> &SpectrumCache {
        &self.cache
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    pub fn level(&self, scale_index: usize) -> &Arc<SpectrumLevel> {
        &self.levels[scale_index]
    }

    pub fn time(&self) -> f32 {
        read(&self.surface).time
    }

    pub fn fft_time_step(&self) -> f32 {
        self.fft_time_step
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn gravity(&self) -> f32 {
        read(&self.surface).gravity
    }

    pub fn wind_direction(&self) -> Vec2 {
        read(&self.surface).wind_direction
    }

    /// Wind direction and directionality used for spreading
    pub fn spreading(&self) -> (Vec2, f32) {
        let surface = read(&self.surface);
        (surface.wind_direction, surface.statistics.directionality)
    }

    pub fn statistics(&self) -> SurfaceStatistics {
        read(&self.surface).statistics
    }

    pub fn surface_offset(&self) -> Vec2 {
        read(&self.surface).surface_offset
    }

    pub fn set_surface_offset(&self, offset: Vec2) {
        write(&self.surface).surface_offset = offset;
    }

    /// Tile size of a scale's FFT level (meters)
    pub fn level_tile_size(&self, scale_index: usize) -> f32 {
        read(&self.surface).mean_tile_size
            * self.cache.settings().quality_tile_scale
            * self.cache.settings().tile_size_scales[scale_index]
    }

    /// Spectra with a nonzero weight
    pub fn spectra(&self) -> Vec<Arc<SpectrumData>> {
        self.cache
            .spectra()
            .into_iter()
            .filter(|data| data.weight() > 0.0)
            .collect()
    }

    pub fn active_samples(&self) -> usize {
        self.active_samples.load(Ordering::Acquire)
    }

    pub(crate) fn register_sample(&self) {
        self.active_samples.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unregister_sample(&self) {
        let _ = self
            .active_samples
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Replace the blended profile set.
    ///
    /// Cached spectra missing from `profiles` keep their grids but drop to
    /// weight 0. New spectra are generated on this thread.
    pub fn set_profiles(&self, profiles: &[(Arc<WaveSpectrum>, f32)]) {
        let incoming: HashSet<_> = profiles.iter().map(|(spectrum, _)| spectrum.id()).collect();
        for data in self.cache.spectra() {
            if !incoming.contains(&data.spectrum().id()) {
                data.set_weight(0.0);
            }
        }

        for (spectrum, weight) in profiles {
            let data = self.cache.get_or_create(spectrum);
            data.validate();
            data.set_weight(weight.max(0.0));
        }

        self.recompute_statistics();
        self.revision.fetch_add(1, Ordering::AcqRel);

        let (wind, directionality) = self.spreading();
        for data in self.spectra() {
            data.update_spectral_values(wind, directionality);
        }
        self.update_resolve_modes();
    }

    fn recompute_statistics(&self) {
        let quality_scale = self.cache.settings().quality_tile_scale;
        let mut stats = SurfaceStatistics {
            horizontal_displacement_scale: 0.0,
            ..Default::default()
        };
        let mut total_weight = 0.0;
        let mut gravity = 0.0;
        let mut mean_tile_size = 0.0;

        for data in self.spectra() {
            let weight = data.weight();
            let profile = data.spectrum().profile();

            stats.tile_size += profile.tile_size_m * quality_scale * weight;
            stats.wind_speed += profile.wind_speed_ms * weight;
            stats.directionality += profile.directionality * weight;
            stats.horizontal_displacement_scale += profile.horizontal_displacement_scale * weight;
            stats.total_amplitude += data.total_amplitude() * weight;

            total_weight += weight;
            gravity += profile.gravity_ms2 * weight;
            mean_tile_size += profile.tile_size_m * weight;
        }

        stats.max_vertical_displacement = stats.total_amplitude * MAX_VERTICAL_FRACTION;
        let horizontal = stats.max_vertical_displacement * stats.horizontal_displacement_scale;
        stats.max_horizontal_displacement = (stats.max_vertical_displacement.powi(2) + horizontal.powi(2)).sqrt();

        let mut surface = write(&self.surface);
        if total_weight > 0.0 {
            surface.gravity = gravity / total_weight;
            surface.mean_tile_size = mean_tile_size / total_weight;
        }
        surface.statistics = stats;

        debug!(
            "Profiles blended: tile {:.1} m, wind {:.1} m/s, total amplitude {:.3} m",
            stats.tile_size, stats.wind_speed, stats.total_amplitude
        );
    }

    /// Advance to `time` and apply a new wind direction.
    pub fn update(&self, time: f32, wind_direction: Vec2) {
        let wind_direction = wind_direction.normalize_or(Vec2::X);
        let wind_changed = {
            let mut surface = write(&self.surface);
            surface.time = time;
            let changed = surface.wind_direction != wind_direction;
            surface.wind_direction = wind_direction;
            changed
        };

        if wind_changed {
            self.revision.fetch_add(1, Ordering::AcqRel);
            let directionality = self.statistics().directionality;
            for data in self.spectra() {
                data.update_spectral_values(wind_direction, directionality);
            }
        }

        self.update_resolve_modes();
    }

    /// Re-run the direct/FFT crossover for every scale and (de)register levels.
    pub fn update_resolve_modes(&self) {
        let samples = self.active_samples();
        let spectra = self.spectra();

        for (scale, level) in self.levels.iter().enumerate() {
            let mode = if self.allow_cpu_fft {
                let num_waves: f32 = spectra
                    .iter()
                    .map(|data| data.wave_count(scale) as f32 * data.weight())
                    .sum();
                select_resolve_mode(num_waves, samples)
            } else {
                ResolveMode::Direct
            };

            if level.set_mode(mode) {
                match mode {
                    ResolveMode::Direct => self.runner.remove_level(level),
                    ResolveMode::Fft { .. } => self.runner.add_level(Arc::clone(level)),
                }
            }
        }
    }

    /// Remove every level from the task runner
    pub fn deregister_levels(&self) {
        for level in &self.levels {
            level.set_mode(ResolveMode::Direct);
            self.runner.remove_level(level);
        }
    }

    /// Scales whose FFT level can answer queries right now
    pub fn fft_scales(&self) -> ScaleMask {
        std::array::from_fn(|scale| self.levels[scale].is_ready())
    }

    /// Unscaled sum of every scale over the wave range `[start, end)`.
    ///
    /// FFT-resolved scales contribute in full when `start == 0` and are skipped
    /// otherwise. `completed` is cleared when waves remain past `end`; callers
    /// set it before the first call.
    pub fn raw_sample_at(
        &self,
        x: f32,
        z: f32,
        start: f32,
        end: f32,
        time: f32,
        completed: &mut bool,
    ) -> RawSample {
        let mut fft_scales = self.fft_scales();
        self.raw_sample_masked(x, z, start, end, time, &mut fft_scales, completed)
    }

    /// [`Self::raw_sample_at`] with the FFT-owned scales chosen by the caller.
    ///
    /// Queries split over several ranges pass the mask taken before the first
    /// one, so every range agrees on which scales are summed directly. A
    /// flagged scale without a snapshot at `start == 0` is cleared and summed
    /// directly instead.
    #[allow(clippy::too_many_arguments)]
    pub fn raw_sample_masked(
        &self,
        x: f32,
        z: f32,
        start: f32,
        end: f32,
        time: f32,
        fft_scales: &mut ScaleMask,
        completed: &mut bool,
    ) -> RawSample {
        let p = Vec2::new(x, z) + self.surface_offset();
        let mut result = RawSample::default();

        if start == 0.0 {
            for (owned, level) in fft_scales.iter_mut().zip(&self.levels) {
                if !*owned {
                    continue;
                }
                match level.sample(p, time) {
                    Some(sample) => result.add_scaled(&sample, 1.0),
                    None => *owned = false,
                }
            }
        }

        let min_weight = MIN_QUERY_WEIGHT + start * start;
        for data in self.spectra() {
            let weight = data.weight();
            if weight < min_weight {
                continue;
            }

            let guard = data.waves();
            let Some(lists) = guard.as_ref() else { continue };

            for (scale, waves) in lists.scales.iter().enumerate() {
                if fft_scales[scale] {
                    continue;
                }

                let len = waves.len();
                let first = (start * len as f32).floor() as usize;
                let last = ((end * len as f32).floor() as usize).min(len);
                if last < len {
                    *completed = false;
                }

                for wave in &waves[first.min(last)..last] {
                    wave.accumulate(p, time, weight, &mut result);
                }
            }
        }

        result
    }

    pub fn height_at(
        &self,
        x: f32,
        z: f32,
        start: f32,
        end: f32,
        time: f32,
        completed: &mut bool,
    ) -> f32 {
        self.raw_sample_at(x, z, start, end, time, completed).height
    }

    /// Horizontal displacement on the XZ plane (meters)
    pub fn horizontal_displacement_at(
        &self,
        x: f32,
        z: f32,
        start: f32,
        end: f32,
        time: f32,
        completed: &mut bool,
    ) -> Vec2 {
        let raw = self.raw_sample_at(x, z, start, end, time, completed);
        self.horizontal_displacement_from(&raw)
    }

    /// `(dx, height, dz)` (meters)
    pub fn displacement_at(
        &self,
        x: f32,
        z: f32,
        start: f32,
        end: f32,
        time: f32,
        completed: &mut bool,
    ) -> Vec3 {
        let raw = self.raw_sample_at(x, z, start, end, time, completed);
        self.displacement_from(&raw)
    }

    /// `(force x, force y, force z, height)`
    pub fn force_and_height_at(
        &self,
        x: f32,
        z: f32,
        start: f32,
        end: f32,
        time: f32,
        completed: &mut bool,
    ) -> Vec4 {
        let raw = self.raw_sample_at(x, z, start, end, time, completed);
        self.force_and_height_from(&raw)
    }

    pub fn horizontal_displacement_from(&self, raw: &RawSample) -> Vec2 {
        -raw.displacement * self.statistics().horizontal_displacement_scale
    }

    pub fn displacement_from(&self, raw: &RawSample) -> Vec3 {
        let horizontal = self.horizontal_displacement_from(raw);
        Vec3::new(horizontal.x, raw.height, horizontal.y)
    }

    pub fn force_and_height_from(&self, raw: &RawSample) -> Vec4 {
        let hds = self.statistics().horizontal_displacement_scale;
        Vec4::new(
            raw.force.x * hds,
            raw.force.y * FORCE_Y_SCALE,
            raw.force.z * hds,
            raw.height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::CpuSpectrumTransform;
    use crate::params::{TaskSettings, WaveProfile};
    use crate::spectrum::{GridSettings, KMapCache};

    fn resolver(allow_cpu_fft: bool) -> Arc<SpectrumResolver> {
        let runner = TaskRunner::start(TaskSettings::default()).unwrap();
        let cache = SpectrumCache::new(GridSettings {
            resolution: 32,
            max_resolution: 32,
            seed: 3,
            ..GridSettings::default()
        });
        SpectrumResolver::new(cache, runner, allow_cpu_fft, 0.2)
    }

    #[test]
    fn test_statistics_follow_weights() {
        let resolver = resolver(false);
        let spectrum = WaveSpectrum::new(WaveProfile::default());
        resolver.set_profiles(&[(Arc::clone(&spectrum), 0.5)]);

        let stats = resolver.statistics();
        assert!((stats.wind_speed - 5.0).abs() < 1e-5);
        assert!((stats.tile_size - 90.0).abs() < 1e-3);
        assert!(stats.total_amplitude > 0.0);
        assert!(
            (stats.max_vertical_displacement - stats.total_amplitude * MAX_VERTICAL_FRACTION).abs() < 1e-5
        );
        // Level tiles use the weight-normalized size
        let expected = 180.0 * crate::params::TILE_SIZE_SCALES[0];
        assert!((resolver.level_tile_size(0) - expected).abs() < 1e-2);

        resolver.runner().shutdown();
    }

    #[test]
    fn test_profiles_not_listed_drop_to_zero() {
        let resolver = resolver(false);
        let calm = WaveSpectrum::new(WaveProfile::calm());
        let storm = WaveSpectrum::new(WaveProfile::storm());

        resolver.set_profiles(&[(Arc::clone(&calm), 1.0)]);
        let revision = resolver.revision();
        resolver.set_profiles(&[(Arc::clone(&storm), 1.0)]);

        assert!(resolver.revision() > revision);
        assert_eq!(resolver.cache().get(calm.id()).unwrap().weight(), 0.0);
        assert_eq!(resolver.spectra().len(), 1);

        resolver.runner().shutdown();
    }

    #[test]
    fn test_partial_range_reports_incomplete() {
        let resolver = resolver(false);
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);

        let mut completed = true;
        resolver.height_at(1.0, 2.0, 0.0, 0.5, 0.0, &mut completed);
        assert!(!completed);

        let mut completed = true;
        resolver.height_at(1.0, 2.0, 0.5, 1.0, 0.0, &mut completed);
        assert!(completed);

        resolver.runner().shutdown();
    }

    #[test]
    fn test_ranges_sum_to_full_query() {
        let resolver = resolver(false);
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);

        let mut completed = true;
        let full = resolver.height_at(3.0, -4.0, 0.0, 1.0, 1.5, &mut completed);
        let first = resolver.height_at(3.0, -4.0, 0.0, 0.5, 1.5, &mut completed);
        let second = resolver.height_at(3.0, -4.0, 0.5, 1.0, 1.5, &mut completed);
        assert!((full - (first + second)).abs() < 1e-4);

        resolver.runner().shutdown();
    }

    #[test]
    fn test_surface_offset_shifts_queries() {
        let resolver = resolver(false);
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);

        let mut completed = true;
        let shifted_origin = resolver.height_at(7.0, 3.0, 0.0, 1.0, 0.0, &mut completed);
        resolver.set_surface_offset(Vec2::new(7.0, 3.0));
        let at_origin = resolver.height_at(0.0, 0.0, 0.0, 1.0, 0.0, &mut completed);
        assert!((shifted_origin - at_origin).abs() < 1e-5);

        resolver.runner().shutdown();
    }

    #[test]
    fn test_fft_disallowed_stays_direct() {
        let resolver = resolver(false);
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);
        for _ in 0..100 {
            resolver.register_sample();
        }
        resolver.update_resolve_modes();

        for scale in 0..NUM_SCALES {
            assert_eq!(resolver.level(scale).mode(), ResolveMode::Direct);
        }
        assert_eq!(resolver.runner().level_count(), 0);

        resolver.runner().shutdown();
    }

    /// Every scale on 16² snapshots, each refreshed once at time 0
    fn ready_fft_levels(resolver: &SpectrumResolver) {
        let mut transform = CpuSpectrumTransform::new();
        let mut kmaps = KMapCache::default();
        for scale in 0..NUM_SCALES {
            let level = resolver.level(scale);
            level.set_mode(ResolveMode::Fft { resolution: 16 });
            assert!(level.refresh(&mut transform, &mut kmaps).unwrap());
        }
    }

    #[test]
    fn test_ready_levels_replace_direct_waves() {
        let resolver = resolver(false);
        // Levels are refreshed by hand
        resolver.runner().shutdown();
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);
        ready_fft_levels(&resolver);
        assert_eq!(resolver.fft_scales(), [true; NUM_SCALES]);

        for p in [Vec2::new(0.0, 0.0), Vec2::new(12.5, -3.0), Vec2::new(-40.0, 71.0)] {
            let mut completed = true;
            let full = resolver.raw_sample_at(p.x, p.y, 0.0, 1.0, 0.0, &mut completed);
            let snapshots: f32 = (0..NUM_SCALES)
                .map(|scale| resolver.level(scale).sample(p, 0.0).unwrap().height)
                .sum();
            assert!((full.height - snapshots).abs() < 1e-5);
            assert!(completed);

            // Later ranges add nothing for scales the snapshots own
            let mut completed = true;
            let tail = resolver.raw_sample_at(p.x, p.y, 0.5, 1.0, 0.0, &mut completed);
            assert_eq!(tail, RawSample::default());
            assert!(completed);
        }
    }

    #[test]
    fn test_mask_keeps_ranges_consistent() {
        let resolver = resolver(false);
        resolver.runner().shutdown();
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);

        let mut completed = true;
        let direct_tail = resolver.height_at(5.0, 9.0, 0.5, 1.0, 0.0, &mut completed);

        // Levels become ready after the first range was summed directly
        ready_fft_levels(&resolver);
        let mut mask = [false; NUM_SCALES];
        let mut completed = true;
        let tail = resolver.raw_sample_masked(5.0, 9.0, 0.5, 1.0, 0.0, &mut mask, &mut completed);
        assert!((tail.height - direct_tail).abs() < 1e-6);
        assert_eq!(mask, [false; NUM_SCALES]);
    }

    #[test]
    fn test_flagged_scale_without_snapshot_falls_back() {
        let resolver = resolver(false);
        resolver.runner().shutdown();
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);

        let mut completed = true;
        let direct = resolver.height_at(-6.0, 2.0, 0.0, 1.0, 0.0, &mut completed);

        let mut mask = [true; NUM_SCALES];
        let mut completed = true;
        let masked = resolver.raw_sample_masked(-6.0, 2.0, 0.0, 1.0, 0.0, &mut mask, &mut completed);
        assert_eq!(mask, [false; NUM_SCALES]);
        assert!((masked.height - direct).abs() < 1e-6);
    }
}
