//! Ring of timed FFT snapshots for one scale.

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use glam::Vec2;
use log::debug;
use rustfft::num_complex::Complex32;

use super::SpectrumResolver;
use crate::error::Result;
use crate::fft::{evolve, SpectrumTransform, SurfaceFields, TimedSpectrum};
use crate::spectrum::{DirectionalSpectrumBuilder, KMapCache, RawSample};
use crate::sync::lock;

/// Snapshots kept per level
pub const RING_SIZE: usize = 4;

/// How a scale answers point queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Sum discrete waves per query
    Direct,
    /// Interpolate precomputed FFT snapshots
    Fft { resolution: usize },
}

/// FFT resolution a scale with `num_waves` weighted waves would prefer
pub fn fft_resolution_for(num_waves: f32) -> usize {
    if num_waves > 900.0 {
        64
    } else if num_waves > 160.0 {
        32
    } else {
        16
    }
}

/// Pick direct summation or FFT for one scale.
///
/// FFT wins when `waves × samples > 4·res² + samples`. The largest FFT tier up
/// to the preferred one that passes the test is used, which keeps the choice
/// monotonic in `num_waves` across tier boundaries.
pub fn select_resolve_mode(num_waves: f32, num_samples: usize) -> ResolveMode {
    let preferred = fft_resolution_for(num_waves);
    let samples = num_samples as f32;

    [64, 32, 16]
        .into_iter()
        .filter(|&resolution| resolution <= preferred)
        .find(|&resolution| num_waves * samples > (4 * resolution * resolution) as f32 + samples)
        .map_or(ResolveMode::Direct, |resolution| ResolveMode::Fft { resolution })
}

struct LevelState {
    resolution: usize,
    slots: [Option<Arc<SurfaceFields>>; RING_SIZE],
    timing: [f32; RING_SIZE],
    recent: usize,
    computed: usize,
    directional: Vec<Complex32>,
    directional_key: Option<(u64, usize)>,
    timed: Option<TimedSpectrum>,
}

impl LevelState {
    fn reset(&mut self, resolution: usize) {
        self.resolution = resolution;
        self.slots = Default::default();
        self.timing = [0.0; RING_SIZE];
        self.recent = 0;
        self.computed = 0;
        self.directional_key = None;
        self.timed = None;
    }

    fn earliest(&self) -> Option<f32> {
        self.slots
            .iter()
            .zip(self.timing.iter())
            .filter(|(slot, _)| slot.is_some())
            .map(|(_, &time)| time)
            .reduce(f32::min)
    }
}

/// One scale's FFT snapshots, filled by the task runner's FFT thread.
pub struct SpectrumLevel {
    resolver: Weak<SpectrumResolver>,
    scale_index: usize,
    /// 0 while resolved directly
    fft_resolution: AtomicUsize,
    state: Mutex<LevelState>,
}

impl SpectrumLevel {
    pub(crate) fn new(resolver: Weak<SpectrumResolver>, scale_index: usize) -> Self {
        Self {
            resolver,
            scale_index,
            fft_resolution: AtomicUsize::new(0),
            state: Mutex::new(LevelState {
                resolution: 0,
                slots: Default::default(),
                timing: [0.0; RING_SIZE],
                recent: 0,
                computed: 0,
                directional: Vec::new(),
                directional_key: None,
                timed: None,
            }),
        }
    }

    pub fn scale_index(&self) -> usize {
        self.scale_index
    }

    pub fn mode(&self) -> ResolveMode {
        match self.fft_resolution.load(Ordering::Acquire) {
            0 => ResolveMode::Direct,
            resolution => ResolveMode::Fft { resolution },
        }
    }

    /// Returns true when the mode changed
    pub(crate) fn set_mode(&self, mode: ResolveMode) -> bool {
        let resolution = match mode {
            ResolveMode::Direct => 0,
            ResolveMode::Fft { resolution } => resolution,
        };
        let previous = self.fft_resolution.swap(resolution, Ordering::AcqRel);
        if previous != resolution {
            debug!("Scale {} resolve mode: {:?}", self.scale_index, mode);
            true
        } else {
            false
        }
    }

    /// Number of snapshots computed since the last reset
    pub fn computed(&self) -> usize {
        lock(&self.state).computed
    }

    /// Whether point queries can use this level
    pub fn is_ready(&self) -> bool {
        self.mode() != ResolveMode::Direct && self.computed() > 0
    }

    /// Compute the next snapshot if the ring is running low.
    ///
    /// Returns true when a snapshot was produced.
    pub fn refresh(
        &self,
        transform: &mut dyn SpectrumTransform,
        kmaps: &mut KMapCache,
    ) -> Result<bool> {
        let ResolveMode::Fft { resolution } = self.mode() else {
            return Ok(false);
        };
        let Some(resolver) = self.resolver.upgrade() else {
            return Ok(false);
        };

        let now = resolver.time();
        let step = resolver.fft_time_step();
        let revision = resolver.revision();

        let (slot, time, mut directional, rebuild, timed) = {
            let mut state = lock(&self.state);
            if state.resolution != resolution {
                state.reset(resolution);
            }
            // Time went backwards (replay); everything cached is in the future
            if state.earliest().is_some_and(|earliest| now < earliest) {
                state.reset(resolution);
            }

            let (slot, time) = if state.computed == 0 {
                (state.recent, now)
            } else {
                let waiting = (state.recent + 2) % RING_SIZE;
                if state.slots[waiting].is_some() && state.timing[waiting] > now {
                    return Ok(false);
                }
                (
                    (state.recent + 1) % RING_SIZE,
                    state.timing[state.recent].max(now) + step,
                )
            };

            let rebuild = state.directional_key != Some((revision, resolution));
            (
                slot,
                time,
                mem::take(&mut state.directional),
                rebuild,
                state.timed.take(),
            )
        };

        let tile_size = resolver.level_tile_size(self.scale_index);
        let kmap = kmaps.get(resolution, tile_size);

        if rebuild {
            let (wind, directionality) = resolver.spreading();
            DirectionalSpectrumBuilder::new(wind, directionality).build(
                &resolver.spectra(),
                self.scale_index,
                &kmap,
                &mut directional,
            );
        }

        let mut timed = match timed {
            Some(timed) if timed.resolution == resolution => timed,
            _ => TimedSpectrum::new(resolution, tile_size),
        };
        timed.tile_size = tile_size;
        evolve(&directional, &kmap, resolver.gravity(), time, &mut timed);
        let fields = Arc::new(transform.transform(&timed)?);

        let mut state = lock(&self.state);
        state.directional = directional;
        state.timed = Some(timed);
        if state.resolution != resolution {
            // Mode changed while computing; drop the stale snapshot
            return Ok(false);
        }
        if rebuild {
            state.directional_key = Some((revision, resolution));
        }
        state.slots[slot] = Some(fields);
        state.timing[slot] = time;
        state.recent = slot;
        state.computed += 1;

        Ok(true)
    }

    /// Unscaled fields at local position `p` and time `t`.
    ///
    /// Snapshots straddling `t` are interpolated linearly; outside the ring the
    /// nearest snapshot is used. `None` before the first snapshot.
    pub fn sample(&self, p: Vec2, t: f32) -> Option<RawSample> {
        let (before, after) = {
            let state = lock(&self.state);
            if state.computed == 0 {
                return None;
            }

            let mut before: Option<(f32, Arc<SurfaceFields>)> = None;
            let mut after: Option<(f32, Arc<SurfaceFields>)> = None;
            for (slot, &time) in state.slots.iter().zip(state.timing.iter()) {
                let Some(fields) = slot else { continue };
                if time <= t {
                    if before.as_ref().map_or(true, |(b, _)| time > *b) {
                        before = Some((time, Arc::clone(fields)));
                    }
                } else if after.as_ref().map_or(true, |(a, _)| time < *a) {
                    after = Some((time, Arc::clone(fields)));
                }
            }
            (before, after)
        };

        match (before, after) {
            (Some((t0, f0)), Some((t1, f1))) => {
                let blend = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
                Some(f0.sample(p).lerp(&f1.sample(p), blend))
            }
            (Some((_, fields)), None) | (None, Some((_, fields))) => Some(fields.sample(p)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::CpuSpectrumTransform;
    use crate::params::{TaskSettings, WaveProfile};
    use crate::spectrum::{GridSettings, SpectrumCache, WaveSpectrum, NUM_SCALES};
    use crate::tasks::TaskRunner;

    const STEP: f32 = 0.2;

    fn resolver() -> Arc<SpectrumResolver> {
        let runner = TaskRunner::start(TaskSettings::default()).unwrap();
        // Levels are refreshed by hand
        runner.shutdown();
        let cache = SpectrumCache::new(GridSettings {
            resolution: 32,
            max_resolution: 32,
            seed: 21,
            ..GridSettings::default()
        });
        let resolver = SpectrumResolver::new(cache, runner, false, STEP);
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);
        force_fft(&resolver);
        resolver
    }

    fn force_fft(resolver: &SpectrumResolver) {
        for scale in 0..NUM_SCALES {
            resolver.level(scale).set_mode(ResolveMode::Fft { resolution: 16 });
        }
    }

    /// Move simulation time; the resolver drops levels to direct without samples
    fn set_time(resolver: &SpectrumResolver, time: f32) {
        resolver.update(time, resolver.wind_direction());
        force_fft(resolver);
    }

    #[test]
    fn test_fft_resolution_tiers() {
        assert_eq!(fft_resolution_for(10.0), 16);
        assert_eq!(fft_resolution_for(161.0), 32);
        assert_eq!(fft_resolution_for(901.0), 64);
    }

    #[test]
    fn test_resolve_mode_needs_samples() {
        assert_eq!(select_resolve_mode(5000.0, 0), ResolveMode::Direct);
        // 64² is too expensive for one sample, 32² is not
        assert_eq!(select_resolve_mode(5000.0, 1), ResolveMode::Fft { resolution: 32 });
        assert_eq!(select_resolve_mode(5000.0, 10), ResolveMode::Fft { resolution: 64 });
    }

    #[test]
    fn test_resolve_mode_monotonic_in_waves() {
        for samples in [1, 2, 5, 10, 50, 200] {
            let mut seen_fft = false;
            for waves in 0..3000 {
                let mode = select_resolve_mode(waves as f32, samples);
                if seen_fft {
                    assert_ne!(mode, ResolveMode::Direct, "{} waves, {} samples", waves, samples);
                }
                seen_fft |= mode != ResolveMode::Direct;
            }
        }
    }

    #[test]
    fn test_level_without_resolver_does_nothing() {
        let level = SpectrumLevel::new(Weak::new(), 0);
        assert!(level.set_mode(ResolveMode::Fft { resolution: 16 }));
        assert!(!level.set_mode(ResolveMode::Fft { resolution: 16 }));

        let mut transform = crate::fft::CpuSpectrumTransform::new();
        let mut kmaps = KMapCache::default();
        assert!(!level.refresh(&mut transform, &mut kmaps).unwrap());
        assert!(level.sample(Vec2::ZERO, 0.0).is_none());
        assert!(!level.is_ready());
    }

    #[test]
    fn test_ring_waits_for_time_to_catch_up() {
        let resolver = resolver();
        let level = resolver.level(0);
        let mut transform = CpuSpectrumTransform::new();
        let mut kmaps = KMapCache::default();

        // Snapshots at 0, 0.2, 0.4 and 0.6
        for expected in 1..=RING_SIZE {
            assert!(level.refresh(&mut transform, &mut kmaps).unwrap());
            assert_eq!(level.computed(), expected);
        }
        assert!(level.is_ready());

        // The slot two past the newest (0.2) still lies ahead of time 0
        assert!(!level.refresh(&mut transform, &mut kmaps).unwrap());
        assert_eq!(level.computed(), RING_SIZE);

        set_time(&resolver, STEP + 0.01);
        assert!(level.refresh(&mut transform, &mut kmaps).unwrap());
        assert_eq!(level.computed(), RING_SIZE + 1);
    }

    #[test]
    fn test_time_going_backwards_resets_ring() {
        let resolver = resolver();
        let level = resolver.level(1);
        let mut transform = CpuSpectrumTransform::new();
        let mut kmaps = KMapCache::default();

        set_time(&resolver, 5.0);
        assert!(level.refresh(&mut transform, &mut kmaps).unwrap());
        assert!(level.refresh(&mut transform, &mut kmaps).unwrap());
        assert_eq!(level.computed(), 2);

        set_time(&resolver, 1.0);
        assert!(level.refresh(&mut transform, &mut kmaps).unwrap());
        assert_eq!(level.computed(), 1);

        // Only the replayed snapshot remains
        let p = Vec2::new(4.0, 4.0);
        let at_replay = level.sample(p, 1.0).unwrap();
        assert_eq!(level.sample(p, 5.0).unwrap(), at_replay);
    }

    #[test]
    fn test_sample_interpolates_straddling_snapshots() {
        let resolver = resolver();
        let level = resolver.level(0);
        let mut transform = CpuSpectrumTransform::new();
        let mut kmaps = KMapCache::default();
        assert!(level.refresh(&mut transform, &mut kmaps).unwrap());
        assert!(level.refresh(&mut transform, &mut kmaps).unwrap());

        let p = Vec2::new(3.0, -7.0);
        let first = level.sample(p, 0.0).unwrap();
        let second = level.sample(p, STEP).unwrap();
        assert_ne!(first, second);

        let expected = first.lerp(&second, 0.25);
        let between = level.sample(p, 0.25 * STEP).unwrap();
        assert!((between.height - expected.height).abs() < 1e-5);
        assert!((between.displacement - expected.displacement).length() < 1e-5);
        assert!((between.force - expected.force).length() < 1e-5);

        // Past the newest snapshot the newest is held
        assert_eq!(level.sample(p, 10.0).unwrap(), second);
    }
}
