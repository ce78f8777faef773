//! Packed displacement and slope maps for the rendering collaborator.

use std::path::Path;

use half::f16;
use image::{GrayImage, Luma};
use log::debug;
use rustfft::num_complex::Complex32;

use super::SpectrumResolver;
use crate::error::Result;
use crate::fft::{evolve, SpectrumTransform, TimedSpectrum};
use crate::spectrum::{DirectionalSpectrumBuilder, KMapCache, NUM_SCALES};

/// Ring slots; the collaborator reads one while the other is written
pub const MAP_SLOTS: usize = 2;

/// One RGBA float map, row-major, texel `(x, y)` at `y * resolution + x`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedMap {
    pub resolution: usize,
    pub texels: Vec<[f32; 4]>,
}

impl PackedMap {
    pub fn texel(&self, x: usize, y: usize) -> [f32; 4] {
        self.texels[y * self.resolution + x]
    }
}

/// Maps of every scale at one point in time
#[derive(Debug, Clone, Default)]
pub struct MapSet {
    pub time: f32,
    /// `[-hds·dx, h, -hds·dz, 0]`
    pub displacement: [PackedMap; NUM_SCALES],
    /// `[∂h/∂x, ∂h/∂z, 0, 0]`
    pub slope: [PackedMap; NUM_SCALES],
}

struct DirectionalCache {
    key: Option<(u64, usize)>,
    values: Vec<Complex32>,
}

/// Renders the blended spectra into double-buffered packed maps.
pub struct WaveMapRenderer {
    transform: Box<dyn SpectrumTransform>,
    kmaps: KMapCache,
    directional: [DirectionalCache; NUM_SCALES],
    slots: [MapSet; MAP_SLOTS],
    current: Option<usize>,
    high_precision: bool,
}

impl WaveMapRenderer {
    /// `high_precision = false` rounds texels through 16-bit floats.
    pub fn new(transform: Box<dyn SpectrumTransform>, high_precision: bool) -> Self {
        debug!("Wave maps rendered with the {} transform", transform.name());
        Self {
            transform,
            kmaps: KMapCache::default(),
            directional: std::array::from_fn(|_| DirectionalCache {
                key: None,
                values: Vec::new(),
            }),
            slots: Default::default(),
            current: None,
            high_precision,
        }
    }

    pub fn transform_name(&self) -> &'static str {
        self.transform.name()
    }

    /// Slot holding the most recent maps
    pub fn current_slot(&self) -> Option<usize> {
        self.current
    }

    pub fn maps(&self, slot: usize) -> &MapSet {
        &self.slots[slot]
    }

    /// Most recent maps, if any were rendered
    pub fn current(&self) -> Option<&MapSet> {
        self.current.map(|slot| &self.slots[slot])
    }

    /// Render every scale at `time` into the next slot and return it.
    pub fn render(&mut self, resolver: &SpectrumResolver, resolution: usize, time: f32) -> Result<usize> {
        let slot = self.current.map_or(0, |current| (current + 1) % MAP_SLOTS);
        let revision = resolver.revision();
        let (wind, directionality) = resolver.spreading();
        let hds = resolver.statistics().horizontal_displacement_scale;
        let spectra = resolver.spectra();
        let gravity = resolver.gravity();

        for scale in 0..NUM_SCALES {
            let tile_size = resolver.level_tile_size(scale);
            let kmap = self.kmaps.get(resolution, tile_size);

            let cache = &mut self.directional[scale];
            if cache.key != Some((revision, resolution)) {
                DirectionalSpectrumBuilder::new(wind, directionality).build(
                    &spectra,
                    scale,
                    &kmap,
                    &mut cache.values,
                );
                cache.key = Some((revision, resolution));
            }

            let mut timed = TimedSpectrum::new(resolution, tile_size);
            evolve(&cache.values, &kmap, gravity, time, &mut timed);
            let fields = self.transform.transform(&timed)?;

            let round = |value: f32| {
                if self.high_precision {
                    value
                } else {
                    to_half(value)
                }
            };

            let maps = &mut self.slots[slot];
            maps.displacement[scale] = PackedMap {
                resolution,
                texels: fields
                    .displacement
                    .iter()
                    .zip(&fields.force_and_height)
                    .map(|(d, fh)| [round(-hds * d.x), round(fh.w), round(-hds * d.y), 0.0])
                    .collect(),
            };
            maps.slope[scale] = PackedMap {
                resolution,
                texels: fields
                    .slope
                    .iter()
                    .map(|s| [round(s.x), round(s.y), 0.0, 0.0])
                    .collect(),
            };
        }

        self.slots[slot].time = time;
        self.current = Some(slot);
        Ok(slot)
    }

    /// Write one scale's height channel as a grayscale PNG, normalized to its
    /// own min/max.
    pub fn export_height_png(&self, scale: usize, path: &Path) -> Result<()> {
        let Some(maps) = self.current() else {
            return Ok(());
        };
        let map = &maps.displacement[scale];
        let (min, max) = map
            .texels
            .iter()
            .map(|texel| texel[1])
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| (lo.min(h), hi.max(h)));
        let range = (max - min).max(1e-6);

        let image = GrayImage::from_fn(map.resolution as u32, map.resolution as u32, |x, y| {
            let height = map.texel(x as usize, y as usize)[1];
            Luma([((height - min) / range * 255.0).round() as u8])
        });
        image.save(path)?;

        debug!("Exported scale {} heights to {}", scale, path.display());
        Ok(())
    }
}

/// Round through an IEEE half float, saturating at the largest finite half
fn to_half(value: f32) -> f32 {
    f16::from_f32(value).to_f32().clamp(f16::MIN.to_f32(), f16::MAX.to_f32())
}
