//! Per-ocean cache of spectrum data.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use glam::Vec2;

use super::{SpectrumData, SpectrumId, WaveSpectrum, NUM_SCALES};
use crate::params::TILE_SIZE_SCALES;
use crate::sync::{read, write};

/// Everything a spectrum needs to generate its grids inside one ocean
#[derive(Debug, Clone)]
pub struct GridSettings {
    /// Grid resolution used for wave extraction (cells per side)
    pub resolution: usize,

    /// Resolution of the random walk; keeps grids consistent across resolutions
    pub max_resolution: usize,

    /// Resolved seed (never 0)
    pub seed: u64,

    pub tile_size_scales: [f32; NUM_SCALES],

    /// Quality multiplier on tile sizes
    pub quality_tile_scale: f32,

    /// Minimum wave amplitude kept for CPU summation (meters)
    pub cpu_wave_threshold: f32,

    pub cpu_max_waves: usize,

    /// Direction used for k = 0 and the first priority pass
    pub wind_direction: Vec2,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            resolution: 256,
            max_resolution: 256,
            seed: 1,
            tile_size_scales: TILE_SIZE_SCALES,
            quality_tile_scale: 1.0,
            cpu_wave_threshold: 0.008,
            cpu_max_waves: 2500,
            wind_direction: Vec2::X,
        }
    }
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<SpectrumId, Arc<SpectrumData>>,
    /// Insertion order, for deterministic iteration
    ordered: Vec<Arc<SpectrumData>>,
}

/// Spectrum data keyed by spectrum identity.
///
/// Lookups take the read lock only; creation re-checks under the write lock.
pub struct SpectrumCache {
    settings: GridSettings,
    entries: RwLock<Entries>,
}

impl SpectrumCache {
    pub fn new(settings: GridSettings) -> Self {
        Self {
            settings,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn get_or_create(&self, spectrum: &Arc<WaveSpectrum>) -> Arc<SpectrumData> {
        if let Some(data) = read(&self.entries).by_id.get(&spectrum.id()) {
            return Arc::clone(data);
        }

        let mut entries = write(&self.entries);
        if let Some(data) = entries.by_id.get(&spectrum.id()) {
            return Arc::clone(data);
        }

        let data = Arc::new(SpectrumData::new(Arc::clone(spectrum), self.settings.clone()));
        entries.by_id.insert(spectrum.id(), Arc::clone(&data));
        entries.ordered.push(Arc::clone(&data));
        data
    }

    pub fn get(&self, id: SpectrumId) -> Option<Arc<SpectrumData>> {
        read(&self.entries).by_id.get(&id).cloned()
    }

    /// Snapshot of all cached spectra in insertion order
    pub fn spectra(&self) -> Vec<Arc<SpectrumData>> {
        read(&self.entries).ordered.clone()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
