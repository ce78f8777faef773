//! Statistical ocean spectra.

use std::f32::consts::{LN_2, PI};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{SpectrumCell, WaveSpectrumGrid};
use crate::params::{SpectrumKind, WaveProfile};

/// Pierson-Moskowitz/Phillips energy constant
const PHILLIPS_ALPHA: f32 = 0.0081;

/// Capillary wavenumber of the unified spectrum (rad/m)
const KM: f32 = 370.0;

/// Phase speed at the capillary peak (m/s)
const CM: f32 = 0.23;

/// A wave energy spectrum that can fill a grid of random complex amplitudes.
pub trait SpectrumModel: Send + Sync {
    /// Isotropic energy density per unit wavenumber area (m⁴)
    fn density(&self, k: f32) -> f32;

    /// Directional spread coefficient at wavenumber `k` (0 = isotropic)
    fn spread(&self, k: f32) -> f32;

    /// Base tile size (meters)
    fn tile_size(&self) -> f32;

    fn gravity(&self) -> f32;

    /// Fill `grid` with Gaussian random amplitudes shaped by [`Self::density`].
    ///
    /// The random walk always covers `max_resolution²` centred cells so a grid
    /// generated at a lower resolution matches the crop of a higher one.
    fn compute_spectrum(
        &self,
        grid: &mut WaveSpectrumGrid,
        tile_size_multiplier: f32,
        max_resolution: usize,
        seed: u64,
    ) {
        let resolution = grid.resolution();
        let max_resolution = max_resolution.max(resolution);
        let half = (resolution / 2) as i64;
        let max_half = (max_resolution / 2) as i64;

        let tile_size = self.tile_size() * tile_size_multiplier;
        let frequency_scale = 2.0 * PI / tile_size;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        for cy in 0..max_resolution as i64 {
            let fy = cy - max_half;
            for cx in 0..max_resolution as i64 {
                let fx = cx - max_half;
                let (g1, g2) = gaussian_pair(&mut rng);

                // Nyquist cells stay empty
                if fx <= -half || fx >= half || fy <= -half || fy >= half {
                    continue;
                }

                let kx = frequency_scale * fx as f32;
                let ky = frequency_scale * fy as f32;
                let k = (kx * kx + ky * ky).sqrt();

                // No energy at k = 0
                let cell = if k > 0.0 {
                    let scale = self.density(k).max(0.0).sqrt() * frequency_scale * 0.5;
                    SpectrumCell {
                        re: g1 * scale,
                        im: g2 * scale,
                        spread: self.spread(k),
                    }
                } else {
                    SpectrumCell::default()
                };

                let x = ((fx + resolution as i64) % resolution as i64) as usize;
                let y = ((fy + resolution as i64) % resolution as i64) as usize;
                grid.set(x, y, cell);
            }
        }
    }
}

/// Two independent standard normal samples (Box-Muller)
fn gaussian_pair(rng: &mut ChaCha8Rng) -> (f32, f32) {
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = rng.gen::<f32>();
    let r = (-2.0 * u1.ln()).sqrt();
    let (s, c) = (2.0 * PI * u2).sin_cos();
    (r * c, r * s)
}

/// Classic Phillips spectrum for a fully developed sea
#[derive(Debug, Clone)]
pub struct PhillipsSpectrum {
    pub wind_speed: f32,
    pub amplitude: f32,
    pub tile_size: f32,
    pub gravity: f32,
}

impl SpectrumModel for PhillipsSpectrum {
    fn density(&self, k: f32) -> f32 {
        if k <= 0.0 {
            return 0.0;
        }

        // Largest wave arising from a continuous wind
        let l = self.wind_speed * self.wind_speed / self.gravity;
        let small_wave_cutoff = l * 0.001;
        let kl = k * l;

        self.amplitude * PHILLIPS_ALPHA / (4.0 * PI) * (-1.0 / (kl * kl)).exp() / k.powi(4)
            * (-(k * small_wave_cutoff).powi(2)).exp()
    }

    fn spread(&self, _k: f32) -> f32 {
        // sqrt(1 + cos 2φ) = sqrt(2)|cos φ|: the cos² directional term of Phillips
        1.0
    }

    fn tile_size(&self) -> f32 {
        self.tile_size
    }

    fn gravity(&self) -> f32 {
        self.gravity
    }
}

/// Unified directional spectrum (Elfouhaily et al. 1997).
///
/// Combines a JONSWAP-like long-wave curvature spectrum with a capillary
/// short-wave term, both limited by fetch.
#[derive(Debug, Clone)]
pub struct UnifiedSpectrum {
    pub wind_speed: f32,
    pub fetch: f32,
    pub amplitude: f32,
    pub tile_size: f32,
    pub gravity: f32,

    // Derived from wind speed and fetch
    omega_c: f32,
    kp: f32,
    cp: f32,
    alpha_p: f32,
    alpha_m: f32,
    sigma: f32,
    gamma: f32,
    u_star: f32,
}

impl UnifiedSpectrum {
    pub fn new(wind_speed: f32, fetch: f32, amplitude: f32, tile_size: f32, gravity: f32) -> Self {
        let g = gravity;
        let u = wind_speed;

        // Inverse wave age from dimensionless fetch
        let x = g * fetch / (u * u);
        let omega_c = 0.84 * (x / 22_000.0).powf(0.4).tanh().powf(-0.75);
        let kp = g * (omega_c / u).powi(2);
        let cp = (g / kp).sqrt();

        let alpha_p = 0.006 * omega_c.sqrt();
        let sigma = 0.08 * (1.0 + 4.0 / omega_c.powi(3));
        let gamma = if omega_c < 1.0 {
            1.7
        } else {
            1.7 + 6.0 * omega_c.ln()
        };

        // Friction velocity from the Charnock-type roughness length
        let z0 = 3.7e-5 * u * u / g * (u / cp).powf(0.9);
        let u_star = 0.41 * u / (10.0 / z0).ln();
        let alpha_m = if u_star < CM {
            0.01 * (1.0 + (u_star / CM).ln())
        } else {
            0.01 * (1.0 + 3.0 * (u_star / CM).ln())
        };

        Self {
            wind_speed,
            fetch,
            amplitude,
            tile_size,
            gravity,
            omega_c,
            kp,
            cp,
            alpha_p,
            alpha_m,
            sigma,
            gamma,
            u_star,
        }
    }

    /// Phase speed including capillary correction (m/s)
    fn phase_speed(&self, k: f32) -> f32 {
        (self.gravity / k * (1.0 + (k / KM).powi(2))).sqrt()
    }

    /// Spectral peak wavenumber (rad/m)
    pub fn peak_wavenumber(&self) -> f32 {
        self.kp
    }
}

impl SpectrumModel for UnifiedSpectrum {
    fn density(&self, k: f32) -> f32 {
        if k <= 0.0 {
            return 0.0;
        }

        let c = self.phase_speed(k);
        let ratio = (k / self.kp).sqrt();

        let l_pm = (-1.25 * (self.kp / k).powi(2)).exp();
        let gamma_exponent = (-(ratio - 1.0).powi(2) / (2.0 * self.sigma * self.sigma)).exp();
        let jp = self.gamma.powf(gamma_exponent);
        let fp = l_pm * jp * (-self.omega_c / 10f32.sqrt() * (ratio - 1.0)).exp();
        let long_waves = 0.5 * self.alpha_p * (self.cp / c) * fp;

        let fm = (-0.25 * (k / KM - 1.0).powi(2)).exp();
        let short_waves = 0.5 * self.alpha_m * (CM / c) * fm * l_pm;

        // Curvature spectrum → omnidirectional S(k) → per unit area
        let omnidirectional = (long_waves + short_waves) / k.powi(3);
        self.amplitude * omnidirectional / (2.0 * PI * k)
    }

    fn spread(&self, k: f32) -> f32 {
        let c = self.phase_speed(k);
        let a0 = LN_2 / 4.0;
        let ap = 4.0;
        let am = 0.13 * self.u_star / CM;
        (a0 + ap * (c / self.cp).powf(2.5) + am * (CM / c).powf(2.5)).tanh()
    }

    fn tile_size(&self) -> f32 {
        self.tile_size
    }

    fn gravity(&self) -> f32 {
        self.gravity
    }
}

/// Identity of a spectrum asset in caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpectrumId(u64);

static NEXT_SPECTRUM_ID: AtomicU64 = AtomicU64::new(1);

/// A profile bound to its spectrum model
pub struct WaveSpectrum {
    id: SpectrumId,
    profile: WaveProfile,
    model: Box<dyn SpectrumModel>,
}

impl WaveSpectrum {
    pub fn new(profile: WaveProfile) -> Arc<Self> {
        let model: Box<dyn SpectrumModel> = match profile.spectrum {
            SpectrumKind::Phillips => Box::new(PhillipsSpectrum {
                wind_speed: profile.wind_speed_ms,
                amplitude: profile.amplitude,
                tile_size: profile.tile_size_m,
                gravity: profile.gravity_ms2,
            }),
            SpectrumKind::Unified => Box::new(UnifiedSpectrum::new(
                profile.wind_speed_ms,
                profile.fetch_m,
                profile.amplitude,
                profile.tile_size_m,
                profile.gravity_ms2,
            )),
        };

        Arc::new(Self {
            id: SpectrumId(NEXT_SPECTRUM_ID.fetch_add(1, Ordering::Relaxed)),
            profile,
            model,
        })
    }

    pub fn id(&self) -> SpectrumId {
        self.id
    }

    pub fn profile(&self) -> &WaveProfile {
        &self.profile
    }

    pub fn model(&self) -> &dyn SpectrumModel {
        self.model.as_ref()
    }
}

impl std::fmt::Debug for WaveSpectrum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveSpectrum")
            .field("id", &self.id)
            .field("profile", &self.profile.name)
            .finish()
    }
}
