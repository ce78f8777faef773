//! Precomputed wavenumber lookup per (resolution, tile size).

use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::Arc;

use glam::Vec2;

use super::signed_index;

/// Normalized direction and magnitude of a cell's wavenumber
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KVector {
    /// Zero at k = 0
    pub direction: Vec2,
    pub k: f32,
}

impl KVector {
    pub fn wavenumber(&self) -> Vec2 {
        self.direction * self.k
    }
}

/// Cache key with the tile size quantized to millimeters.
///
/// Tile sizes come out of weighted sums; float equality would miss on the
/// last bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KMapKey {
    resolution: u32,
    tile_size_mm: u64,
}

impl KMapKey {
    pub fn new(resolution: usize, tile_size: f32) -> Self {
        Self {
            resolution: resolution as u32,
            tile_size_mm: (f64::from(tile_size) * 1000.0).round() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMap {
    resolution: usize,
    tile_size: f32,
    values: Vec<KVector>,
}

impl KMap {
    pub fn new(resolution: usize, tile_size: f32) -> Self {
        let frequency_scale = 2.0 * PI / tile_size;
        let mut values = Vec::with_capacity(resolution * resolution);

        for y in 0..resolution {
            let ky = frequency_scale * signed_index(y, resolution) as f32;
            for x in 0..resolution {
                let kx = frequency_scale * signed_index(x, resolution) as f32;
                let k = (kx * kx + ky * ky).sqrt();
                let direction = if k > 0.0 {
                    Vec2::new(kx / k, ky / k)
                } else {
                    Vec2::ZERO
                };
                values.push(KVector { direction, k });
            }
        }

        Self {
            resolution,
            tile_size,
            values,
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn values(&self) -> &[KVector] {
        &self.values
    }
}

/// Owned by each transform worker; not shared between threads
#[derive(Debug, Default)]
pub struct KMapCache {
    maps: HashMap<KMapKey, Arc<KMap>>,
}

impl KMapCache {
    pub fn get(&mut self, resolution: usize, tile_size: f32) -> Arc<KMap> {
        let key = KMapKey::new(resolution, tile_size);
        Arc::clone(
            self.maps
                .entry(key)
                .or_insert_with(|| Arc::new(KMap::new(resolution, tile_size))),
        )
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
