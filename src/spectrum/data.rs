//! Per-spectrum cached grids and discrete wave lists.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Instant;

use glam::Vec2;
use log::debug;

use super::{
    mip_index, scale_bands, signed_index, DiscreteWave, GridSettings, WaveSpectrum,
    WaveSpectrumGrid, NUM_SCALES,
};
use crate::sync::{lock, read, write, AtomicF32};

/// One grid per tile scale, all at the same resolution
pub type ScaleGrids = [WaveSpectrumGrid; NUM_SCALES];

/// Below this wind agreement the wave lists are fully re-sorted
const MOSTLY_SORTED_DOT: f32 = 0.97;

/// Sorted discrete waves of every scale
#[derive(Debug, Default)]
pub struct WaveLists {
    pub scales: [Vec<DiscreteWave>; NUM_SCALES],
    spread_wind: Option<Vec2>,
    spread_directionality: f32,
}

impl WaveLists {
    pub fn scale(&self, scale_index: usize) -> &[DiscreteWave] {
        &self.scales[scale_index]
    }
}

/// A spectrum's cached state inside one ocean
pub struct SpectrumData {
    spectrum: Arc<WaveSpectrum>,
    settings: GridSettings,
    weight: AtomicF32,
    total_amplitude: AtomicF32,
    /// Indexed by [`mip_index`]
    grids: Mutex<Vec<Option<Arc<ScaleGrids>>>>,
    /// `None` until validated
    waves: RwLock<Option<WaveLists>>,
    validation: Mutex<()>,
}

impl SpectrumData {
    pub fn new(spectrum: Arc<WaveSpectrum>, settings: GridSettings) -> Self {
        Self {
            spectrum,
            settings,
            weight: AtomicF32::new(0.0),
            total_amplitude: AtomicF32::new(0.0),
            grids: Mutex::new(Vec::new()),
            waves: RwLock::new(None),
            validation: Mutex::new(()),
        }
    }

    pub fn spectrum(&self) -> &Arc<WaveSpectrum> {
        &self.spectrum
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn weight(&self) -> f32 {
        self.weight.load()
    }

    /// Returns true when the weight actually changed
    pub fn set_weight(&self, weight: f32) -> bool {
        self.weight.swap(weight) != weight
    }

    /// Sum of all bin amplitudes over every scale (meters, unweighted)
    pub fn total_amplitude(&self) -> f32 {
        self.total_amplitude.load()
    }

    pub fn is_valid(&self) -> bool {
        read(&self.waves).is_some()
    }

    /// Physical tile size of a scale (meters)
    pub fn tile_size(&self, scale_index: usize) -> f32 {
        self.spectrum.model().tile_size()
            * self.settings.quality_tile_scale
            * self.settings.tile_size_scales[scale_index]
    }

    /// Generate grids and discrete waves once.
    ///
    /// Safe to call from any thread; concurrent callers block until the
    /// first one finishes and never recompute.
    pub fn validate(&self) {
        if self.is_valid() {
            return;
        }

        let _guard = lock(&self.validation);
        if self.is_valid() {
            return;
        }

        let started = Instant::now();
        let resolution = self.settings.resolution;
        let grids = Arc::new(self.compute_grids(resolution));
        let (lists, total_amplitude) = self.extract_waves(&grids);

        {
            let mut mips = lock(&self.grids);
            let mip = mip_index(resolution);
            if mips.len() <= mip {
                mips.resize(mip + 1, None);
            }
            mips[mip] = Some(grids);
        }

        self.total_amplitude.swap(total_amplitude);
        *write(&self.waves) = Some(lists);

        debug!(
            "spectrum '{}' validated at {}x{} in {:.1} ms",
            self.spectrum.profile().name,
            resolution,
            resolution,
            started.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Drop grids and waves so the next [`Self::validate`] regenerates them
    pub fn invalidate(&self) {
        let _guard = lock(&self.validation);
        lock(&self.grids).clear();
        *write(&self.waves) = None;
    }

    fn compute_grids(&self, resolution: usize) -> ScaleGrids {
        let model = self.spectrum.model();
        let tile_sizes: [f32; NUM_SCALES] = std::array::from_fn(|scale| self.tile_size(scale));
        let bands = scale_bands(&tile_sizes, resolution);

        std::array::from_fn(|scale| {
            let mut grid = WaveSpectrumGrid::new(resolution);
            model.compute_spectrum(
                &mut grid,
                self.settings.quality_tile_scale * self.settings.tile_size_scales[scale],
                self.settings.max_resolution,
                self.settings.seed.wrapping_add(scale as u64),
            );
            grid.retain_band(tile_sizes[scale], bands[scale].0, bands[scale].1);
            grid
        })
    }

    fn extract_waves(&self, grids: &ScaleGrids) -> (WaveLists, f32) {
        let gravity = self.spectrum.model().gravity();
        let wind = self.settings.wind_direction;
        let mut lists = WaveLists::default();
        let mut total_amplitude = 0.0;

        for (scale, grid) in grids.iter().enumerate() {
            let resolution = grid.resolution();
            let frequency_scale = 2.0 * PI / self.tile_size(scale);
            let waves = &mut lists.scales[scale];

            for y in 0..resolution {
                let ky = frequency_scale * signed_index(y, resolution) as f32;
                for x in 0..resolution {
                    let cell = grid.get(x, y);
                    let amplitude = cell.amplitude();
                    total_amplitude += amplitude;

                    if amplitude >= self.settings.cpu_wave_threshold && amplitude > 0.0 {
                        let kx = frequency_scale * signed_index(x, resolution) as f32;
                        waves.push(DiscreteWave::new(
                            scale,
                            (x, y),
                            Vec2::new(kx, ky),
                            cell,
                            gravity,
                            wind,
                        ));
                    }
                }
            }

            sort_descending(waves);
            waves.truncate(self.settings.cpu_max_waves);
        }

        (lists, total_amplitude)
    }

    /// Omnidirectional grids at `resolution`, cropped from a higher cached
    /// resolution when one exists.
    pub fn spectrum_values(&self, resolution: usize) -> Arc<ScaleGrids> {
        let mip = mip_index(resolution);
        let mut mips = lock(&self.grids);

        if let Some(Some(grids)) = mips.get(mip) {
            return Arc::clone(grids);
        }

        let higher = mips.iter().skip(mip + 1).flatten().next().cloned();
        let grids = match higher {
            Some(source) => Arc::new(std::array::from_fn(|scale| source[scale].crop(resolution))),
            None => Arc::new(self.compute_grids(resolution)),
        };

        if mips.len() <= mip {
            mips.resize(mip + 1, None);
        }
        mips[mip] = Some(Arc::clone(&grids));
        grids
    }

    /// Read access to the sorted wave lists (`None` before validation)
    pub fn waves(&self) -> RwLockReadGuard<'_, Option<WaveLists>> {
        read(&self.waves)
    }

    pub fn wave_count(&self, scale_index: usize) -> usize {
        read(&self.waves)
            .as_ref()
            .map_or(0, |lists| lists.scales[scale_index].len())
    }

    /// Re-apply directional spreading and restore descending priority order.
    ///
    /// Small wind changes keep the lists nearly sorted, so an adaptive
    /// insertion pass is used; larger changes fall back to a full sort.
    pub fn update_spectral_values(&self, wind: Vec2, directionality: f32) {
        let mut guard = write(&self.waves);
        let Some(lists) = guard.as_mut() else {
            return;
        };

        if lists.spread_wind == Some(wind) && lists.spread_directionality == directionality {
            return;
        }

        let mostly_sorted = lists
            .spread_wind
            .is_some_and(|previous| previous.dot(wind) >= MOSTLY_SORTED_DOT);

        for waves in lists.scales.iter_mut() {
            for wave in waves.iter_mut() {
                wave.update_spectral_values(wind, directionality);
            }

            if mostly_sorted {
                gnome_sort_descending(waves);
            } else {
                sort_descending(waves);
            }
        }

        lists.spread_wind = Some(wind);
        lists.spread_directionality = directionality;
    }
}

fn sort_descending(waves: &mut [DiscreteWave]) {
    waves.sort_by(|a, b| b.priority.total_cmp(&a.priority));
}

/// Swap-and-step-back sort; linear on nearly sorted input
fn gnome_sort_descending(waves: &mut [DiscreteWave]) {
    let mut i = 1;
    while i < waves.len() {
        if waves[i - 1].priority < waves[i].priority {
            waves.swap(i - 1, i);
            if i > 1 {
                i -= 1;
                continue;
            }
        }
        i += 1;
    }
}

impl std::fmt::Debug for SpectrumData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumData")
            .field("spectrum", &self.spectrum)
            .field("weight", &self.weight())
            .field("valid", &self.is_valid())
            .finish()
    }
}
