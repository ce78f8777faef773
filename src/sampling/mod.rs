//! Incremental, worker-driven water queries at a single point.
//!
//! A [`WaterSample`] splits one query into `N` wave groups. Worker threads
//! compute one group per step; the owner collects the result with
//! [`WaterSample::get_and_reset`], which also retargets the sample.
//!
//! State machine:
//! ```text
//! Idle --start--> Enqueued --step--> ... --step--> Finished
//!                    ^                                 |
//!                    +---------- get_and_reset --------+
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use glam::{Vec2, Vec3};

use crate::error::{Result, WaterError};
use crate::ocean::{ScaleMask, SpectrumResolver};
use crate::spectrum::NUM_SCALES;
use crate::sync::{lock, try_lock};
use crate::tasks::TaskRunner;

/// Wave groups at full precision
const MAX_WAVE_GROUPS: f32 = 4.0;

/// Newton-style iterations after the initial displacement guess
const COMPENSATION_ITERATIONS: usize = 2;

/// Blend factor toward a partial result in stabilized mode
const STABILIZATION: f32 = 0.43;

/// What a sample computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplacementMode {
    /// Height of the surface point displaced onto the query position
    Height,
    /// Full displacement of the surface point resting at the query position
    Displacement,
    /// Height plus buoyancy forces
    HeightAndForces,
}

/// How [`WaterSample::get_and_reset`] treats unfinished work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationsMode {
    /// Return whatever is ready
    Normal,
    /// Blend partial results with the previous one
    Stabilized,
    /// Finish on the calling thread before returning
    ForceCompletion,
}

/// Result of one query
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleResult {
    /// World position of the surface point (meters)
    pub position: Vec3,
    pub forces: Vec3,
}

impl SampleResult {
    pub fn lerp(&self, other: &SampleResult, t: f32) -> SampleResult {
        SampleResult {
            position: self.position.lerp(other.position, t),
            forces: self.forces.lerp(other.forces, t),
        }
    }
}

#[derive(Debug, Clone)]
struct SampleState {
    target: Vec2,
    /// Rest position whose displaced point lands on `target`
    position: Vec2,
    /// Displacement (or height in `y`) accumulated so far
    displaced: Vec3,
    forces: Vec3,
    /// Last stabilized result
    previous: Option<SampleResult>,
    /// Scales answered by FFT snapshots, fixed at the first wave group
    fft_scales: ScaleMask,
    segment: usize,
    finished: bool,
    time: f32,
    /// Bumped on every reset; steps computed against an older value are dropped
    generation: u64,
}

impl SampleState {
    fn new(target: Vec2, time: f32) -> Self {
        Self {
            target,
            position: target,
            displaced: Vec3::ZERO,
            forces: Vec3::ZERO,
            previous: None,
            fft_scales: [false; NUM_SCALES],
            segment: 0,
            finished: false,
            time,
            generation: 0,
        }
    }

    fn reset(&mut self, target: Vec2, time: f32) {
        self.target = target;
        self.position = target;
        self.displaced = Vec3::ZERO;
        self.forces = Vec3::ZERO;
        self.fft_scales = [false; NUM_SCALES];
        self.segment = 0;
        self.finished = false;
        self.time = time;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// A point query computed incrementally by the task runner.
pub struct WaterSample {
    resolver: Weak<SpectrumResolver>,
    /// Kept separately so a sample outliving its ocean can still deregister
    runner: Weak<TaskRunner>,
    mode: DisplacementMode,
    wave_groups: usize,
    enqueued: AtomicBool,
    /// Serializes steps between workers and forced completion
    step_lock: Mutex<()>,
    state: Mutex<SampleState>,
}

impl WaterSample {
    /// `precision` in (0, 1] sets the number of wave groups (`round(4·precision)`, at least 1).
    pub fn new(
        resolver: &Arc<SpectrumResolver>,
        mode: DisplacementMode,
        precision: f32,
    ) -> Result<Arc<Self>> {
        if !(precision > 0.0 && precision <= 1.0) {
            return Err(WaterError::InvalidPrecision(precision));
        }

        let wave_groups = ((MAX_WAVE_GROUPS * precision).round() as usize).max(1);
        Ok(Arc::new(Self {
            resolver: Arc::downgrade(resolver),
            runner: Arc::downgrade(resolver.runner()),
            mode,
            wave_groups,
            enqueued: AtomicBool::new(false),
            step_lock: Mutex::new(()),
            state: Mutex::new(SampleState::new(Vec2::ZERO, resolver.time())),
        }))
    }

    pub fn mode(&self) -> DisplacementMode {
        self.mode
    }

    pub fn wave_groups(&self) -> usize {
        self.wave_groups
    }

    pub fn is_enqueued(&self) -> bool {
        self.enqueued.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.state).finished
    }

    /// Fraction of wave groups computed for the current target
    pub fn completion(&self) -> f32 {
        let state = lock(&self.state);
        if state.finished {
            1.0
        } else {
            state.segment as f32 / self.wave_groups as f32
        }
    }

    /// Retarget and register with the task runner. Registering is idempotent.
    pub fn start(self: &Arc<Self>, x: f32, z: f32) {
        let Some(resolver) = self.resolver.upgrade() else {
            return;
        };

        lock(&self.state).reset(Vec2::new(x, z), resolver.time());

        if !self.enqueued.swap(true, Ordering::AcqRel) {
            if let Some(runner) = self.runner.upgrade() {
                runner.add_sample(Arc::clone(self));
            }
            resolver.register_sample();
        }
    }

    /// Deregister from the task runner. Safe to call repeatedly.
    ///
    /// A worker already inside a step finishes that step.
    pub fn stop(self: &Arc<Self>) {
        if !self.enqueued.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(runner) = self.runner.upgrade() {
            runner.remove_sample(self);
        }
        if let Some(resolver) = self.resolver.upgrade() {
            resolver.unregister_sample();
        }
    }

    /// Worker entry point. Returns false when busy, finished or orphaned.
    pub fn computation_step(&self) -> bool {
        let Some(_step) = try_lock(&self.step_lock) else {
            return false;
        };
        self.step()
    }

    /// Return the result for the previous target and restart at `(x, z)`.
    pub fn get_and_reset(self: &Arc<Self>, x: f32, z: f32, mode: ComputationsMode) -> SampleResult {
        if !self.is_enqueued() {
            self.start(x, z);
        }

        if mode == ComputationsMode::ForceCompletion {
            let _step = lock(&self.step_lock);
            while self.step() {}
        }

        let time = self.resolver.upgrade().map(|resolver| resolver.time());
        let mut state = lock(&self.state);

        let mut result = self.result(&state);
        if mode == ComputationsMode::Stabilized {
            if let Some(previous) = state.previous.filter(|_| !state.finished) {
                let completion = state.segment as f32 / self.wave_groups as f32;
                result = previous.lerp(&result, STABILIZATION * completion);
            }
            state.previous = Some(result);
        }

        let time = time.unwrap_or(state.time);
        state.reset(Vec2::new(x, z), time);
        result
    }

    fn result(&self, state: &SampleState) -> SampleResult {
        match self.mode {
            DisplacementMode::Displacement => SampleResult {
                position: Vec3::new(state.target.x, 0.0, state.target.y) + state.displaced,
                forces: Vec3::ZERO,
            },
            DisplacementMode::Height | DisplacementMode::HeightAndForces => SampleResult {
                position: Vec3::new(state.target.x, state.displaced.y, state.target.y),
                forces: state.forces,
            },
        }
    }

    /// One wave group. The caller holds `step_lock`.
    fn step(&self) -> bool {
        let Some(resolver) = self.resolver.upgrade() else {
            return false;
        };

        let (target, mut position, mut fft_scales, segment, time, generation) = {
            let state = lock(&self.state);
            if state.finished {
                return false;
            }
            (
                state.target,
                state.position,
                state.fft_scales,
                state.segment,
                state.time,
                state.generation,
            )
        };
        if segment == 0 {
            fft_scales = resolver.fft_scales();
        }

        let n = self.wave_groups;
        let start = segment as f32 / n as f32;
        let end = if segment + 1 >= n {
            1.0
        } else {
            (segment + 1) as f32 / n as f32
        };

        let mut completed = true;
        let mut displaced = Vec3::ZERO;
        let mut forces = Vec3::ZERO;

        match self.mode {
            DisplacementMode::Displacement => {
                let raw = resolver.raw_sample_masked(
                    target.x,
                    target.y,
                    start,
                    end,
                    time,
                    &mut fft_scales,
                    &mut completed,
                );
                displaced = resolver.displacement_from(&raw);
            }
            DisplacementMode::Height | DisplacementMode::HeightAndForces => {
                if segment == 0 {
                    // First group only; the rest of the range refines the height
                    position =
                        compensate_horizontal_displacement(&resolver, target, time, end, fft_scales);
                }

                let raw = resolver.raw_sample_masked(
                    position.x,
                    position.y,
                    start,
                    end,
                    time,
                    &mut fft_scales,
                    &mut completed,
                );
                if self.mode == DisplacementMode::HeightAndForces {
                    let fh = resolver.force_and_height_from(&raw);
                    forces = fh.truncate();
                    displaced.y = fh.w;
                } else {
                    displaced.y = raw.height;
                }
            }
        }

        self.commit(
            generation,
            StepOutput {
                position,
                fft_scales,
                displaced,
                forces,
                completed,
            },
        )
    }

    /// Apply a step computed against `generation`; stale steps are dropped.
    fn commit(&self, generation: u64, output: StepOutput) -> bool {
        let mut state = lock(&self.state);
        if state.generation != generation {
            // Retargeted mid-step
            return false;
        }

        state.position = output.position;
        state.fft_scales = output.fft_scales;
        state.displaced += output.displaced;
        state.forces += output.forces;
        state.segment += 1;
        if output.completed || state.segment >= self.wave_groups {
            state.finished = true;
        }
        true
    }
}

struct StepOutput {
    position: Vec2,
    fft_scales: ScaleMask,
    displaced: Vec3,
    forces: Vec3,
    completed: bool,
}

/// Rest position whose horizontally displaced point lands on `target`, using
/// the waves in `[0, end)`.
fn compensate_horizontal_displacement(
    resolver: &SpectrumResolver,
    target: Vec2,
    time: f32,
    end: f32,
    fft_scales: ScaleMask,
) -> Vec2 {
    let offset_at = |p: Vec2| {
        let mut fft_scales = fft_scales;
        // Only used for the fixed point, never reported
        let mut scratch = true;
        let raw = resolver.raw_sample_masked(p.x, p.y, 0.0, end, time, &mut fft_scales, &mut scratch);
        resolver.horizontal_displacement_from(&raw)
    };

    let mut position = target - offset_at(target);
    for _ in 0..COMPENSATION_ITERATIONS {
        position += target - (position + offset_at(position));
    }

    position
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{TaskSettings, WaveProfile};
    use crate::spectrum::{GridSettings, SpectrumCache, WaveSpectrum};
    use crate::tasks::TaskRunner;

    fn resolver() -> Arc<SpectrumResolver> {
        let runner = TaskRunner::start(TaskSettings::default()).unwrap();
        let cache = SpectrumCache::new(GridSettings {
            resolution: 32,
            max_resolution: 32,
            seed: 11,
            ..GridSettings::default()
        });
        let resolver = SpectrumResolver::new(cache, runner, false, 0.2);
        resolver.set_profiles(&[(WaveSpectrum::new(WaveProfile::default()), 1.0)]);
        resolver
    }

    #[test]
    fn test_invalid_precision_rejected() {
        let resolver = resolver();
        assert!(matches!(
            WaterSample::new(&resolver, DisplacementMode::Height, 0.0),
            Err(WaterError::InvalidPrecision(_))
        ));
        assert!(WaterSample::new(&resolver, DisplacementMode::Height, 1.5).is_err());
        assert!(WaterSample::new(&resolver, DisplacementMode::Height, f32::NAN).is_err());
        resolver.runner().shutdown();
    }

    #[test]
    fn test_wave_groups_from_precision() {
        let resolver = resolver();
        let groups = |precision| {
            WaterSample::new(&resolver, DisplacementMode::Height, precision)
                .unwrap()
                .wave_groups()
        };
        assert_eq!(groups(1.0), 4);
        assert_eq!(groups(0.5), 2);
        assert_eq!(groups(0.01), 1);
        resolver.runner().shutdown();
    }

    #[test]
    fn test_step_after_retarget_is_discarded() {
        let resolver = resolver();
        let sample = WaterSample::new(&resolver, DisplacementMode::Height, 1.0).unwrap();
        lock(&sample.state).reset(Vec2::new(1.0, 1.0), 0.0);

        // Retarget lands between a worker's snapshot and its commit
        let generation = lock(&sample.state).generation;
        lock(&sample.state).reset(Vec2::new(5.0, 5.0), 0.0);

        let stale = StepOutput {
            position: Vec2::new(1.0, 1.0),
            fft_scales: [true; NUM_SCALES],
            displaced: Vec3::new(0.0, 3.0, 0.0),
            forces: Vec3::ZERO,
            completed: true,
        };
        assert!(!sample.commit(generation, stale));

        let state = lock(&sample.state);
        assert_eq!(state.segment, 0);
        assert!(!state.finished);
        assert_eq!(state.displaced, Vec3::ZERO);
        assert_eq!(state.position, Vec2::new(5.0, 5.0));
        drop(state);
        resolver.runner().shutdown();
    }

    #[test]
    fn test_converges_in_wave_group_steps() {
        let resolver = resolver();
        let sample = WaterSample::new(&resolver, DisplacementMode::HeightAndForces, 1.0).unwrap();
        // Workers are stopped so only this thread steps the sample
        resolver.runner().shutdown();
        lock(&sample.state).reset(Vec2::new(2.0, 8.0), 0.0);

        let mut steps = 0;
        while sample.computation_step() {
            steps += 1;
            assert!(steps <= 4);
        }
        assert_eq!(steps, 4);
        assert!(sample.is_finished());
        assert_eq!(sample.completion(), 1.0);
    }

    #[test]
    fn test_force_completion_matches_full_query() {
        let resolver = resolver();
        let sample = WaterSample::new(&resolver, DisplacementMode::Displacement, 1.0).unwrap();
        sample.start(4.0, -2.0);

        let result = sample.get_and_reset(4.0, -2.0, ComputationsMode::ForceCompletion);
        let mut completed = true;
        let expected = resolver.displacement_at(4.0, -2.0, 0.0, 1.0, 0.0, &mut completed);
        let expected = Vec3::new(4.0, 0.0, -2.0) + expected;
        assert!((result.position - expected).length() < 1e-3);

        sample.stop();
        sample.stop();
        assert!(!sample.is_enqueued());
        assert_eq!(resolver.active_samples(), 0);
        resolver.runner().shutdown();
    }

    #[test]
    fn test_stabilized_blends_with_previous() {
        let resolver = resolver();
        let sample = WaterSample::new(&resolver, DisplacementMode::Height, 1.0).unwrap();
        resolver.runner().shutdown();

        {
            let mut state = lock(&sample.state);
            state.previous = Some(SampleResult {
                position: Vec3::new(0.0, 2.0, 0.0),
                forces: Vec3::ZERO,
            });
            state.displaced = Vec3::new(0.0, 1.0, 0.0);
            state.segment = 2;
        }
        // Enqueued so get_and_reset does not restart the sample first
        sample.enqueued.store(true, Ordering::Release);

        let result = sample.get_and_reset(0.0, 0.0, ComputationsMode::Stabilized);
        let blend = STABILIZATION * 0.5;
        assert!((result.position.y - (2.0 + (1.0 - 2.0) * blend)).abs() < 1e-6);
    }

    #[test]
    fn test_normal_results_do_not_feed_stabilization() {
        let resolver = resolver();
        let sample = WaterSample::new(&resolver, DisplacementMode::Height, 1.0).unwrap();
        resolver.runner().shutdown();

        let stabilized = SampleResult {
            position: Vec3::new(0.0, 2.0, 0.0),
            forces: Vec3::ZERO,
        };
        lock(&sample.state).previous = Some(stabilized);
        sample.enqueued.store(true, Ordering::Release);

        sample.get_and_reset(0.0, 0.0, ComputationsMode::Normal);
        sample.get_and_reset(1.0, 1.0, ComputationsMode::ForceCompletion);
        assert_eq!(lock(&sample.state).previous, Some(stabilized));

        while sample.computation_step() {}
        sample.get_and_reset(2.0, 2.0, ComputationsMode::Stabilized);
        assert_ne!(lock(&sample.state).previous, Some(stabilized));
    }

    #[test]
    fn test_first_group_compensation_close_to_full_range() {
        let resolver = resolver();
        resolver.runner().shutdown();
        let fft_scales = resolver.fft_scales();

        let mut first_group_error = 0.0;
        let mut uncompensated_error = 0.0;
        for i in 0..8 {
            let target = Vec2::new(i as f32 * 7.3 - 20.0, 5.0 - i as f32 * 3.1);
            let full = compensate_horizontal_displacement(&resolver, target, 0.5, 1.0, fft_scales);
            let first_group = compensate_horizontal_displacement(&resolver, target, 0.5, 0.25, fft_scales);

            first_group_error += (first_group - full).length();
            uncompensated_error += (target - full).length();
        }

        assert!(uncompensated_error > 0.0);
        assert!(
            first_group_error < uncompensated_error,
            "{} vs {}",
            first_group_error,
            uncompensated_error
        );
    }

    #[test]
    fn test_levels_ready_mid_query_do_not_drop_waves() {
        use crate::fft::CpuSpectrumTransform;
        use crate::ocean::ResolveMode;
        use crate::spectrum::KMapCache;

        let resolver = resolver();
        resolver.runner().shutdown();
        let target = Vec2::new(6.0, -11.0);

        let mut completed = true;
        let expected = Vec3::new(target.x, 0.0, target.y)
            + resolver.displacement_at(target.x, target.y, 0.0, 1.0, 0.0, &mut completed);

        let sample = WaterSample::new(&resolver, DisplacementMode::Displacement, 1.0).unwrap();
        for scale in 0..NUM_SCALES {
            resolver.level(scale).set_mode(ResolveMode::Fft { resolution: 16 });
        }
        lock(&sample.state).reset(target, 0.0);
        assert!(sample.computation_step());

        // Snapshots arrive after the first group was summed directly
        let mut transform = CpuSpectrumTransform::new();
        let mut kmaps = KMapCache::default();
        for scale in 0..NUM_SCALES {
            assert!(resolver.level(scale).refresh(&mut transform, &mut kmaps).unwrap());
        }
        assert_eq!(resolver.fft_scales(), [true; NUM_SCALES]);

        while sample.computation_step() {}
        let state = lock(&sample.state);
        assert!(state.finished);
        let result = sample.result(&state);
        assert!((result.position - expected).length() < 1e-4);
    }
}
